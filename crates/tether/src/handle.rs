//! Owning references to values that live inside the embedded interpreter.
//!
//! A [`Handle`] holds exactly one strong reference (one unit of foreign retention) on a
//! foreign object for as long as the handle exists. Cloning goes through
//! [`Handle::clone_ref`], which takes one more unit; dropping or [`Handle::release`]-ing
//! gives exactly one back. There is no way to touch the object after release because
//! release consumes the handle.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use pyo3::prelude::*;

use crate::{
    context::Context,
    error::Result,
    session::Shared,
    translate::{OrTranslate, Site},
};

/// Opaque identity of a foreign value.
///
/// Two handles referring to the same foreign object report the same id. Ids are only
/// meaningful while at least one of those handles is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Returns the raw identifier.
    #[must_use]
    pub fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Shared, reference-counted pointer to a foreign value.
///
/// Handles are `Send` and may be carried across host threads, but every operation needs a
/// [`Context`], which only exists on the session's owning execution context. A handle is
/// bound to the session that produced it.
pub struct Handle {
    /// `None` only while `Drop` runs.
    object: Option<Py<PyAny>>,
    /// Qualified name of the foreign type, computed on first request.
    type_tag: OnceLock<Box<str>>,
    session: Arc<Shared>,
}

impl Handle {
    /// Wraps `object`, taking over the strong reference it represents.
    pub(crate) fn new(object: Py<PyAny>, session: Arc<Shared>) -> Self {
        session.retain();
        Self {
            object: Some(object),
            type_tag: OnceLock::new(),
            session,
        }
    }

    fn object(&self) -> &Py<PyAny> {
        match &self.object {
            Some(object) => object,
            None => unreachable!("handle accessed after release"),
        }
    }

    /// Borrows the foreign object for direct use with pyo3.
    ///
    /// # Panics
    /// Panics if `cx` belongs to a different session than the one that produced this handle.
    #[must_use]
    pub fn bind<'a, 'py>(&'a self, cx: &Context<'py>) -> &'a Bound<'py, PyAny> {
        cx.check_session(&self.session);
        self.object().bind(cx.py())
    }

    /// Returns a second handle to the same foreign value, taking one more unit of retention.
    #[must_use]
    pub fn clone_ref(&self, cx: &Context<'_>) -> Self {
        cx.check_session(&self.session);
        let handle = Self::new(self.object().clone_ref(cx.py()), Arc::clone(&self.session));
        if let Some(tag) = self.type_tag.get() {
            let _ = handle.type_tag.set(tag.clone());
        }
        handle
    }

    /// Gives this handle's retention back to the interpreter.
    ///
    /// Equivalent to dropping the handle; spelled out for call sites where the release is
    /// the point.
    pub fn release(self) {
        drop(self);
    }

    /// Identity of the referenced foreign object.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        ObjectId(self.object().as_ptr().addr())
    }

    /// Whether both handles reference the same foreign object.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Qualified name of the foreign value's type, cached after the first call.
    pub fn type_name(&self, cx: &Context<'_>) -> &str {
        self.type_tag.get_or_init(|| {
            self.bind(cx)
                .get_type()
                .qualname()
                .map_or_else(|_| "<unknown>".into(), |name| name.to_string().into_boxed_str())
        })
    }

    /// The foreign reference count of the object.
    ///
    /// Includes references held by the interpreter itself, so only differences between two
    /// readings are meaningful.
    #[must_use]
    pub fn retention_count(&self, cx: &Context<'_>) -> isize {
        self.bind(cx).get_refcnt()
    }

    /// Whether the value is the foreign `None` singleton.
    #[must_use]
    pub fn is_none(&self, cx: &Context<'_>) -> bool {
        self.bind(cx).is_none()
    }

    /// Foreign truth-value test.
    pub fn is_truthy(&self, cx: &Context<'_>) -> Result<bool> {
        self.bind(cx).is_truthy().or_translate(cx, Site::Convert)
    }

    /// Foreign `repr()` of the value.
    pub fn repr(&self, cx: &Context<'_>) -> Result<String> {
        let repr = self.bind(cx).repr().or_translate(cx, Site::Convert)?;
        Ok(repr.to_string_lossy().into_owned())
    }

    /// Foreign `str()` of the value.
    pub fn str(&self, cx: &Context<'_>) -> Result<String> {
        let text = self.bind(cx).str().or_translate(cx, Site::Convert)?;
        Ok(text.to_string_lossy().into_owned())
    }

    /// Foreign `isinstance(value, class)`.
    pub fn is_instance(&self, cx: &Context<'_>, class: &Self) -> Result<bool> {
        self.bind(cx).is_instance(class.bind(cx)).or_translate(cx, Site::Convert)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.session.release(object);
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Handle");
        debug.field("id", &self.id());
        if let Some(tag) = self.type_tag.get() {
            debug.field("type", tag);
        }
        debug.finish_non_exhaustive()
    }
}
