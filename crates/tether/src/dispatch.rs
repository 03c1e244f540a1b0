//! Member access, calls and subscripts on foreign values.
//!
//! Each operation converts its host arguments right before crossing, performs exactly one
//! foreign operation and wraps the outcome in a new handle. Foreign failures go through the
//! translator with the operation's [`Site`].

use pyo3::{
    prelude::*,
    types::{PyDict, PyTuple},
};

use crate::{
    context::Context,
    convert::ToForeign,
    error::Result,
    handle::Handle,
    translate::{self, OrTranslate, Site},
};

impl Handle {
    /// Foreign attribute lookup, `value.name`.
    pub fn member(&self, cx: &Context<'_>, name: &str) -> Result<Handle> {
        let value = self.bind(cx).getattr(name).or_translate(cx, Site::Member)?;
        Ok(cx.acquire(value))
    }

    /// Whether `value.name` resolves. Errors other than a missing attribute propagate.
    pub fn has_member(&self, cx: &Context<'_>, name: &str) -> Result<bool> {
        self.bind(cx).hasattr(name).or_translate(cx, Site::Member)
    }

    /// Foreign attribute assignment, `value.name = new`.
    pub fn set_member<V>(&self, cx: &Context<'_>, name: &str, new: &V) -> Result<()>
    where
        V: ToForeign + ?Sized,
    {
        let new = new.to_object(cx).or_translate(cx, Site::Convert)?;
        self.bind(cx).setattr(name, new).or_translate(cx, Site::Member)
    }

    /// Calls the value with positional and keyword arguments.
    ///
    /// Arguments are converted in order, positional first. Keywords reach the callee in the
    /// order given, repeats included, so the callee reports its own argument errors. A value
    /// that is not callable fails with [`crate::Error::InvalidCall`] without being invoked.
    pub fn call(&self, cx: &Context<'_>, args: &[&dyn ToForeign], kwargs: &[(&str, &dyn ToForeign)]) -> Result<Handle> {
        let callee = self.bind(cx);
        if !callee.is_callable() {
            return Err(translate::not_callable(cx, callee));
        }
        invoke(cx, callee, args, kwargs)
    }

    /// Looks up `name` on the value and calls it, `value.name(*args, **kwargs)`.
    pub fn call_method(
        &self,
        cx: &Context<'_>,
        name: &str,
        args: &[&dyn ToForeign],
        kwargs: &[(&str, &dyn ToForeign)],
    ) -> Result<Handle> {
        let method = self.bind(cx).getattr(name).or_translate(cx, Site::Member)?;
        if !method.is_callable() {
            return Err(translate::not_callable(cx, &method));
        }
        invoke(cx, &method, args, kwargs)
    }

    /// Foreign subscript, `value[key]`.
    ///
    /// An absent key or an index out of range fails with [`crate::Error::IndexError`].
    pub fn subscript<K>(&self, cx: &Context<'_>, key: &K) -> Result<Handle>
    where
        K: ToForeign + ?Sized,
    {
        let container = self.bind(cx);
        let key = key.to_object(cx).or_translate(cx, Site::Convert)?;
        let value = container.get_item(&key).or_translate(
            cx,
            Site::Subscript {
                container,
                key: &key,
            },
        )?;
        Ok(cx.acquire(value))
    }

    /// Foreign subscript assignment, `value[key] = new`.
    pub fn set_subscript<K, V>(&self, cx: &Context<'_>, key: &K, new: &V) -> Result<()>
    where
        K: ToForeign + ?Sized,
        V: ToForeign + ?Sized,
    {
        let container = self.bind(cx);
        let key = key.to_object(cx).or_translate(cx, Site::Convert)?;
        let new = new.to_object(cx).or_translate(cx, Site::Convert)?;
        container.set_item(&key, new).or_translate(
            cx,
            Site::Subscript {
                container,
                key: &key,
            },
        )
    }

    /// Foreign subscript deletion, `del value[key]`.
    pub fn del_subscript<K>(&self, cx: &Context<'_>, key: &K) -> Result<()>
    where
        K: ToForeign + ?Sized,
    {
        let container = self.bind(cx);
        let key = key.to_object(cx).or_translate(cx, Site::Convert)?;
        container.del_item(&key).or_translate(
            cx,
            Site::Subscript {
                container,
                key: &key,
            },
        )
    }
}

fn invoke<'py>(
    cx: &Context<'py>,
    callee: &Bound<'py, PyAny>,
    args: &[&dyn ToForeign],
    kwargs: &[(&str, &dyn ToForeign)],
) -> Result<Handle> {
    let py = cx.py();
    let positional = args
        .iter()
        .map(|arg| arg.to_object(cx))
        .collect::<PyResult<Vec<_>>>()
        .and_then(|items| PyTuple::new(py, items))
        .or_translate(cx, Site::Convert)?;
    let (keywords, repeated) = keyword_dicts(cx, kwargs).or_translate(cx, Site::Convert)?;

    let outcome = match repeated {
        // a dict cannot hold a name twice; unpacking both dicts makes the callee see the repeat
        Some(repeated) => cx
            .runtime()
            .keyword_call(py)
            .call1((callee, positional, keywords, repeated)),
        None if keywords.is_empty() => callee.call1(&positional),
        None => callee.call(&positional, Some(&keywords)),
    };
    Ok(cx.acquire(outcome.or_translate(cx, Site::Call)?))
}

/// Splits keywords into first occurrences and repeats, each in call order.
fn keyword_dicts<'py>(
    cx: &Context<'py>,
    kwargs: &[(&str, &dyn ToForeign)],
) -> PyResult<(Bound<'py, PyDict>, Option<Bound<'py, PyDict>>)> {
    let keywords = PyDict::new(cx.py());
    let mut repeated: Option<Bound<'py, PyDict>> = None;
    for (name, value) in kwargs {
        let value = value.to_object(cx)?;
        if keywords.contains(*name)? {
            repeated.get_or_insert_with(|| PyDict::new(cx.py())).set_item(*name, value)?;
        } else {
            keywords.set_item(*name, value)?;
        }
    }
    Ok((keywords, repeated))
}
