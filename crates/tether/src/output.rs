//! Capture of text the foreign code writes to `sys.stdout`.
//!
//! While a session captures output, its `sys.stdout` is an [`OutputSink`] that appends to
//! the session's [`OutputBuffer`]. The buffer is shared with the host, which reads it from
//! any thread without entering the interpreter.

use std::sync::{Arc, Mutex, PoisonError};

use pyo3::prelude::*;

/// Text written by the foreign code, shared between the owner thread and the host.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputBuffer(Arc<Mutex<String>>);

impl OutputBuffer {
    pub(crate) fn push(&self, text: &str) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push_str(text);
    }

    pub(crate) fn snapshot(&self) -> String {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn take(&self) -> String {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// File-like object installed as the foreign `sys.stdout`.
#[pyclass(name = "OutputSink", module = "tether", frozen)]
pub(crate) struct OutputSink {
    buffer: OutputBuffer,
}

#[pymethods]
impl OutputSink {
    fn write(&self, text: &str) -> usize {
        self.buffer.push(text);
        text.chars().count()
    }

    fn flush(&self) {}

    fn isatty(&self) -> bool {
        false
    }

    fn writable(&self) -> bool {
        true
    }
}

/// Replaces `sys.stdout` with a sink writing into `buffer`; returns the stream it replaced.
pub(crate) fn install(sys: &Bound<'_, PyModule>, buffer: OutputBuffer) -> PyResult<Py<PyAny>> {
    let previous = sys.getattr("stdout")?;
    let sink = Bound::new(sys.py(), OutputSink { buffer })?;
    sys.setattr("stdout", sink)?;
    Ok(previous.unbind())
}

/// Puts `previous` back as `sys.stdout`.
pub(crate) fn restore(sys: &Bound<'_, PyModule>, previous: &Bound<'_, PyAny>) -> PyResult<()> {
    sys.setattr("stdout", previous)
}
