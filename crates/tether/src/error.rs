//! Host-side error values for failed boundary operations.
//!
//! [`Error`] is a closed set. Every failure the interpreter signals while a boundary
//! operation runs becomes exactly one of its variants, built in `translate.rs`; the rest of
//! the crate only propagates them. Each variant keeps the foreign diagnostic text alongside
//! any handles, so callers can report a failure without re-entering the interpreter.

use std::fmt;

use crate::handle::Handle;

/// Result alias for boundary operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Foreign diagnostic payload captured at the moment a failure was translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Qualified name of the foreign exception type, e.g. `ZeroDivisionError`.
    pub type_name: String,
    /// `str()` of the foreign exception, possibly empty.
    pub message: String,
    /// Rendered foreign traceback (`Traceback (most recent call last): ...`), when the
    /// failure carried one.
    pub traceback: Option<String>,
}

impl Diagnostic {
    /// `Type: message`, or just `Type` when the message is empty.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.message.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}: {}", self.type_name, self.message)
        }
    }

    /// Traceback followed by the summary line, in the interpreter's own layout.
    #[must_use]
    pub fn render(&self) -> String {
        match &self.traceback {
            Some(traceback) => format!("{traceback}{}", self.summary()),
            None => self.summary(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// A failed boundary operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The foreign code raised.
    #[error("{diagnostic}")]
    ForeignException {
        /// The raised exception object.
        exception: Handle,
        /// The foreign traceback object, when the exception had one.
        traceback: Option<Handle>,
        diagnostic: Diagnostic,
    },
    /// The target cannot be called or iterated.
    #[error("invalid call: {reason}")]
    InvalidCall { callee: Handle, reason: String },
    /// A module could not be resolved or loaded.
    #[error("cannot resolve module '{name}': {diagnostic}")]
    InvalidModule { name: String, diagnostic: Diagnostic },
    /// A key or index was absent from a container.
    #[error("no entry {key} in container: {diagnostic}")]
    IndexError {
        container: Handle,
        /// `repr()` of the key that was looked up.
        key: String,
        diagnostic: Diagnostic,
    },
    /// Source text could not be turned into runnable code.
    #[error("run failed: {diagnostic}")]
    RunError { failure: Handle, diagnostic: Diagnostic },
}

impl Error {
    /// Short stable name of the variant, used in logs.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ForeignException { .. } => "foreign_exception",
            Self::InvalidCall { .. } => "invalid_call",
            Self::InvalidModule { .. } => "invalid_module",
            Self::IndexError { .. } => "index_error",
            Self::RunError { .. } => "run_error",
        }
    }

    /// The foreign diagnostic, for every variant that carries one.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::ForeignException { diagnostic, .. }
            | Self::InvalidModule { diagnostic, .. }
            | Self::IndexError { diagnostic, .. }
            | Self::RunError { diagnostic, .. } => Some(diagnostic),
            Self::InvalidCall { .. } => None,
        }
    }

    /// The foreign traceback object of a raised exception.
    #[must_use]
    pub fn traceback(&self) -> Option<&Handle> {
        match self {
            Self::ForeignException { traceback, .. } => traceback.as_ref(),
            _ => None,
        }
    }

    /// Full human-readable report, including the foreign traceback when there is one.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::ForeignException { diagnostic, .. } | Self::RunError { diagnostic, .. } => diagnostic.render(),
            other => other.to_string(),
        }
    }
}
