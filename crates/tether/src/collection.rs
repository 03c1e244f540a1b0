//! Host-side views over foreign iterables, mappings and sequences.

use pyo3::{
    exceptions::PyStopIteration,
    prelude::*,
    types::PyDict,
};

use crate::{
    context::Context,
    convert::ToForeign,
    error::Result,
    handle::Handle,
    translate::{self, OrTranslate, Site},
};

/// Whether a [`CollectionView`] can still produce elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// More elements may follow.
    Active,
    /// The foreign iterator signalled its end. Never goes back to `Active`.
    Exhausted,
}

/// Cursor over a foreign iterable.
///
/// Holds the foreign iterator until it is exhausted, then lets go of it.
#[derive(Debug)]
pub struct CollectionView {
    iterator: Option<Handle>,
}

impl CollectionView {
    /// Pulls the next element.
    ///
    /// Returns `Ok(None)` once the iterator is exhausted, and on every call after that. An
    /// exception raised by the iterator propagates and leaves the view active.
    pub fn advance(&mut self, cx: &Context<'_>) -> Result<Option<Handle>> {
        let Some(iterator) = &self.iterator else {
            return Ok(None);
        };
        match iterator.bind(cx).call_method0("__next__") {
            Ok(element) => Ok(Some(cx.acquire(element))),
            Err(err) if err.is_instance_of::<PyStopIteration>(cx.py()) => {
                self.iterator = None;
                Ok(None)
            }
            Err(err) => Err(translate::failure(cx, err, Site::Advance)),
        }
    }

    /// Where the view is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> ViewState {
        if self.iterator.is_some() { ViewState::Active } else { ViewState::Exhausted }
    }

    /// Whether the view has reached the end of the iterator.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state() == ViewState::Exhausted
    }

    /// Adapts the view into a host iterator that yields until exhaustion or the first error.
    pub fn iter<'v, 'c, 'py>(&'v mut self, cx: &'c Context<'py>) -> Cursor<'v, 'c, 'py> {
        Cursor {
            view: self,
            cx,
            failed: false,
        }
    }
}

/// Host iterator over a [`CollectionView`], see [`CollectionView::iter`].
pub struct Cursor<'v, 'c, 'py> {
    view: &'v mut CollectionView,
    cx: &'c Context<'py>,
    failed: bool,
}

impl Iterator for Cursor<'_, '_, '_> {
    type Item = Result<Handle>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.view.advance(self.cx) {
            Ok(element) => element.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl Handle {
    /// Starts iterating the value, like the foreign `iter(value)`.
    ///
    /// A value that is not iterable fails with [`crate::Error::InvalidCall`].
    pub fn iterate(&self, cx: &Context<'_>) -> Result<CollectionView> {
        let target = self.bind(cx);
        let iterator = target.try_iter().or_translate(cx, Site::Iterate { target })?;
        Ok(CollectionView {
            iterator: Some(cx.acquire(iterator.into_any())),
        })
    }

    /// Element count, or `None` when the value's type has no length.
    pub fn length(&self, cx: &Context<'_>) -> Result<Option<usize>> {
        let value = self.bind(cx);
        if !value.get_type().hasattr("__len__").or_translate(cx, Site::Length)? {
            return Ok(None);
        }
        value.len().map(Some).or_translate(cx, Site::Length)
    }
}

/// A foreign mapping seen from the host, with absent keys reported as
/// [`crate::Error::IndexError`].
#[derive(Debug)]
pub struct ForeignMapping {
    handle: Handle,
}

impl ForeignMapping {
    /// Wraps any value supporting `in` and subscripts.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates an empty foreign `dict`.
    #[must_use]
    pub fn empty(cx: &Context<'_>) -> Self {
        Self::new(cx.acquire(PyDict::new(cx.py()).into_any()))
    }

    /// The wrapped foreign value.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Unwraps the foreign value.
    #[must_use]
    pub fn into_handle(self) -> Handle {
        self.handle
    }

    /// Whether `key` is present, like the foreign `key in mapping`.
    pub fn contains_key<K: ToForeign + ?Sized>(&self, cx: &Context<'_>, key: &K) -> Result<bool> {
        let key = key.to_object(cx).or_translate(cx, Site::Convert)?;
        self.handle.bind(cx).contains(key).or_translate(cx, Site::Member)
    }

    /// The value stored under `key`.
    pub fn get<K: ToForeign + ?Sized>(&self, cx: &Context<'_>, key: &K) -> Result<Handle> {
        let container = self.handle.bind(cx);
        let key = key.to_object(cx).or_translate(cx, Site::Convert)?;
        if !container.contains(&key).or_translate(cx, Site::Member)? {
            return Err(translate::missing_key(cx, container, &key));
        }
        let value = container.get_item(&key).or_translate(
            cx,
            Site::Subscript {
                container,
                key: &key,
            },
        )?;
        Ok(cx.acquire(value))
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<K, V>(&self, cx: &Context<'_>, key: &K, value: &V) -> Result<()>
    where
        K: ToForeign + ?Sized,
        V: ToForeign + ?Sized,
    {
        self.handle.set_subscript(cx, key, value)
    }

    /// Removes `key`, failing with [`crate::Error::IndexError`] when it is absent.
    pub fn remove<K: ToForeign + ?Sized>(&self, cx: &Context<'_>, key: &K) -> Result<()> {
        self.handle.del_subscript(cx, key)
    }

    /// The mapping's keys, in the mapping's own order.
    pub fn keys(&self, cx: &Context<'_>) -> Result<Vec<Handle>> {
        let keys = self.handle.call_method(cx, "keys", &[], &[])?;
        keys.iterate(cx)?.iter(cx).collect()
    }

    /// Number of entries.
    pub fn len(&self, cx: &Context<'_>) -> Result<usize> {
        self.handle.bind(cx).len().or_translate(cx, Site::Length)
    }

    pub fn is_empty(&self, cx: &Context<'_>) -> Result<bool> {
        Ok(self.len(cx)? == 0)
    }
}

/// A foreign sequence seen from the host, with out-of-range indices reported as
/// [`crate::Error::IndexError`]. Negative indices count from the end.
#[derive(Debug)]
pub struct ForeignSequence {
    handle: Handle,
}

impl ForeignSequence {
    /// Wraps any value supporting `len` and integer subscripts.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// The wrapped foreign value.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Unwraps the foreign value.
    #[must_use]
    pub fn into_handle(self) -> Handle {
        self.handle
    }

    /// The element at `index`.
    pub fn get(&self, cx: &Context<'_>, index: isize) -> Result<Handle> {
        self.check_index(cx, index)?;
        self.handle.subscript(cx, &index)
    }

    /// Replaces the element at `index`.
    pub fn set<V: ToForeign + ?Sized>(&self, cx: &Context<'_>, index: isize, value: &V) -> Result<()> {
        self.check_index(cx, index)?;
        self.handle.set_subscript(cx, &index, value)
    }

    /// Appends to the end, like the foreign `list.append`.
    pub fn push<V: ToForeign + ?Sized>(&self, cx: &Context<'_>, value: &V) -> Result<()> {
        self.handle.call_method(cx, "append", &[&value], &[])?;
        Ok(())
    }

    /// Number of elements.
    pub fn len(&self, cx: &Context<'_>) -> Result<usize> {
        self.handle.bind(cx).len().or_translate(cx, Site::Length)
    }

    pub fn is_empty(&self, cx: &Context<'_>) -> Result<bool> {
        Ok(self.len(cx)? == 0)
    }

    fn check_index(&self, cx: &Context<'_>, index: isize) -> Result<()> {
        let len = self.len(cx)?;
        let resolved = if index < 0 { index.checked_add_unsigned(len) } else { Some(index) };
        match resolved {
            Some(position) if position >= 0 && position.unsigned_abs() < len => Ok(()),
            _ => Err(translate::index_out_of_range(cx, self.handle.bind(cx), index, len)),
        }
    }
}
