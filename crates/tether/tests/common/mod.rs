//! Shared session for integration tests.
//!
//! Only one session can be live per process, so every test in a binary shares this one.

use std::sync::LazyLock;

use tether::{Context, Session, SessionConfig};

static SESSION: LazyLock<Session> =
    LazyLock::new(|| Session::start(SessionConfig::default().script_name("test.py")).expect("session should start"));

pub fn session() -> &'static Session {
    &SESSION
}

/// Runs `job` on the shared session and returns its result.
pub fn run<R, F>(job: F) -> R
where
    F: FnOnce(&Context<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    session().run(job).expect("job should complete")
}
