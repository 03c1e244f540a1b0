#![doc = include_str!("../../../README.md")]

mod collection;
mod config;
mod context;
mod convert;
mod dispatch;
mod error;
mod handle;
mod output;
mod session;
mod translate;

pub use pyo3;

pub use crate::{
    collection::{CollectionView, Cursor, ForeignMapping, ForeignSequence, ViewState},
    config::{ConfigError, DEFAULT_SCRIPT_NAME, DEFAULT_THREAD_NAME, SessionConfig},
    context::Context,
    convert::{Bytes, FromForeign, ToForeign},
    error::{Diagnostic, Error, Result},
    handle::{Handle, ObjectId},
    session::{Pending, Session, SessionError},
};
