//! The single place foreign failures become [`Error`] values.
//!
//! Boundary code hands every `PyErr` here together with the [`Site`] it came from. The site
//! decides which variant the failure maps to; anything without a more specific meaning
//! becomes [`Error::ForeignException`]. Checks the bridge performs before crossing the
//! boundary (non-callable callee, absent key) also get their errors from here.

use pyo3::{
    exceptions::{PyImportError, PyLookupError, PyTypeError},
    prelude::*,
};
use tracing::debug;

use crate::{
    context::Context,
    error::{Diagnostic, Error, Result},
};

/// The kind of boundary operation a failure was raised from.
pub(crate) enum Site<'a, 'py> {
    /// Attribute lookup or assignment.
    Member,
    /// Invoking a callable.
    Call,
    /// Building or inspecting foreign values for the host.
    Convert,
    /// Compiling source text.
    Compile,
    /// Running compiled code.
    Execute,
    /// Pulling the next element from an iterator.
    Advance,
    /// Asking a value for its length.
    Length,
    Import {
        module: &'a str,
    },
    Subscript {
        container: &'a Bound<'py, PyAny>,
        key: &'a Bound<'py, PyAny>,
    },
    Iterate {
        target: &'a Bound<'py, PyAny>,
    },
}

/// Routes a `PyResult` through [`failure`].
pub(crate) trait OrTranslate<T> {
    fn or_translate<'py>(self, cx: &Context<'py>, site: Site<'_, 'py>) -> Result<T>;
}

impl<T> OrTranslate<T> for PyResult<T> {
    fn or_translate<'py>(self, cx: &Context<'py>, site: Site<'_, 'py>) -> Result<T> {
        self.map_err(|err| failure(cx, err, site))
    }
}

/// Translates a foreign failure raised at `site`.
pub(crate) fn failure<'py>(cx: &Context<'py>, err: PyErr, site: Site<'_, 'py>) -> Error {
    let py = cx.py();
    let diagnostic = diagnose(py, &err);
    let error = match site {
        Site::Compile => Error::RunError {
            failure: cx.acquire(err.value(py).clone().into_any()),
            diagnostic,
        },
        Site::Import { module } if err.is_instance_of::<PyImportError>(py) => Error::InvalidModule {
            name: module.to_owned(),
            diagnostic,
        },
        Site::Subscript { container, key } if err.is_instance_of::<PyLookupError>(py) => Error::IndexError {
            container: cx.acquire(container.clone()),
            key: describe(key),
            diagnostic,
        },
        Site::Iterate { target } if err.is_instance_of::<PyTypeError>(py) => Error::InvalidCall {
            callee: cx.acquire(target.clone()),
            reason: diagnostic.message,
        },
        _ => Error::ForeignException {
            exception: cx.acquire(err.value(py).clone().into_any()),
            traceback: err.traceback(py).map(|traceback| cx.acquire(traceback.into_any())),
            diagnostic,
        },
    };
    debug!(kind = error.kind_name(), "translated foreign failure");
    error
}

/// The callee does not implement the call protocol.
pub(crate) fn not_callable<'py>(cx: &Context<'py>, callee: &Bound<'py, PyAny>) -> Error {
    let callee = cx.acquire(callee.clone());
    let reason = format!("'{}' object is not callable", callee.type_name(cx));
    debug!(kind = "invalid_call", "rejected call before crossing");
    Error::InvalidCall { callee, reason }
}

/// A mapping lookup found no entry for `key`.
pub(crate) fn missing_key<'py>(cx: &Context<'py>, container: &Bound<'py, PyAny>, key: &Bound<'py, PyAny>) -> Error {
    let key = describe(key);
    debug!(kind = "index_error", key = %key, "mapping key absent");
    Error::IndexError {
        container: cx.acquire(container.clone()),
        diagnostic: Diagnostic {
            type_name: "KeyError".to_owned(),
            message: key.clone(),
            traceback: None,
        },
        key,
    }
}

/// A sequence index fell outside `0..len` after negative-index normalization.
pub(crate) fn index_out_of_range<'py>(
    cx: &Context<'py>,
    container: &Bound<'py, PyAny>,
    index: isize,
    len: usize,
) -> Error {
    debug!(kind = "index_error", index, len, "sequence index out of range");
    Error::IndexError {
        container: cx.acquire(container.clone()),
        key: index.to_string(),
        diagnostic: Diagnostic {
            type_name: "IndexError".to_owned(),
            message: format!("index {index} out of range for length {len}"),
            traceback: None,
        },
    }
}

/// Captures type name, message and rendered traceback of `err`.
fn diagnose(py: Python<'_>, err: &PyErr) -> Diagnostic {
    let value = err.value(py);
    let type_name = value
        .get_type()
        .qualname()
        .map_or_else(|_| "BaseException".to_owned(), |name| name.to_string());
    let message = value
        .str()
        .map(|text| text.to_string_lossy().into_owned())
        .unwrap_or_default();
    let traceback = err.traceback(py).and_then(|traceback| traceback.format().ok());
    Diagnostic {
        type_name,
        message,
        traceback,
    }
}

/// `repr()` of a key for diagnostics; never fails.
fn describe(key: &Bound<'_, PyAny>) -> String {
    key.repr()
        .map_or_else(|_| "<unrepresentable>".to_owned(), |repr| repr.to_string_lossy().into_owned())
}
