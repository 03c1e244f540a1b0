//! The interpreter session: one owner thread that runs every foreign operation.
//!
//! The embedded interpreter is only ever entered from the session's owner thread. Host
//! threads marshal work onto it as jobs over a FIFO channel; the owner runs them one at a
//! time, each with the interpreter attached and a fresh [`Context`]. Handles may be dropped
//! on any thread; drops off the owner thread are parked on a pending list that the owner
//! drains before its next job.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, OnceLock, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender},
    },
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use pyo3::prelude::*;
use tracing::{error, info, trace, warn};

use crate::{
    config::SessionConfig,
    context::{Context, Runtime},
    output::OutputBuffer,
};

/// Set while a session owns the interpreter; at most one is live per process.
static ACTIVE: AtomicBool = AtomicBool::new(false);

type Job = Box<dyn FnOnce(&Context<'_>) + Send>;

/// Failure of the session machinery itself, as opposed to a failed boundary operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Another session is already live in this process.
    AlreadyRunning,
    /// The session has been stopped and accepts no more jobs.
    Finalized,
    /// The interpreter could not be brought up.
    Startup(String),
    /// The job did not finish within the allotted time. It keeps running; its result is
    /// discarded.
    TimedOut,
    /// The job panicked on the owner thread. The session keeps serving other jobs.
    JobPanicked,
    /// Called from inside a job, where waiting on the owner thread would never return.
    Reentrant,
    /// The owner thread died.
    OwnerPanicked,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => f.write_str("an interpreter session is already running"),
            Self::Finalized => f.write_str("session has been stopped"),
            Self::Startup(msg) => write!(f, "interpreter startup failed: {msg}"),
            Self::TimedOut => f.write_str("timed out waiting for job"),
            Self::JobPanicked => f.write_str("job panicked on the owner thread"),
            Self::Reentrant => f.write_str("cannot wait on the session from its own owner thread"),
            Self::OwnerPanicked => f.write_str("session owner thread panicked"),
        }
    }
}

impl std::error::Error for SessionError {}

/// State shared between the session, its owner thread and every handle it produced.
pub(crate) struct Shared {
    owner: OnceLock<ThreadId>,
    /// Number of handles not yet released.
    live: AtomicUsize,
    /// References released off the owner thread, waiting to be dropped there. `None` once
    /// the owner has drained it for the last time.
    pending: Mutex<Option<Vec<Py<PyAny>>>>,
    output: OutputBuffer,
}

impl Shared {
    fn new() -> Self {
        Self {
            owner: OnceLock::new(),
            live: AtomicUsize::new(0),
            pending: Mutex::new(Some(Vec::new())),
            output: OutputBuffer::default(),
        }
    }

    pub(crate) fn retain(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    /// Gives one reference back to the interpreter.
    pub(crate) fn release(&self, object: Py<PyAny>) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if self.is_owner_thread() {
            Python::attach(|_| drop(object));
            return;
        }
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parked) = pending.as_mut() {
            parked.push(object);
            return;
        }
        drop(pending);
        // owner has exited
        Python::attach(|_| drop(object));
    }

    /// Drops every parked reference. Returns how many there were.
    fn drain_pending(&self, _py: Python<'_>) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.as_mut().map_or(0, |parked| std::mem::take(parked).len())
    }

    /// Drops every parked reference and makes later releases drop their reference directly.
    fn close_pending(&self, _py: Python<'_>) -> usize {
        let parked = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        parked.map_or(0, |parked| parked.len())
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn output(&self) -> &OutputBuffer {
        &self.output
    }

    fn is_owner_thread(&self) -> bool {
        self.owner.get() == Some(&thread::current().id())
    }
}

/// A running embedded interpreter and the thread that owns it.
///
/// Dropping the session stops it.
pub struct Session {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Job>>>,
    owner: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Starts the owner thread and brings up the interpreter on it.
    ///
    /// Returns once the session's namespace is ready.
    pub fn start(config: SessionConfig) -> Result<Self, SessionError> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::AlreadyRunning);
        }

        let shared = Arc::new(Shared::new());
        let (sender, jobs) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let thread_name = config.thread_name.clone();
        let owner_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || owner_loop(&owner_shared, &config, &jobs, ready_tx));
        let owner = match spawned {
            Ok(owner) => owner,
            Err(err) => {
                ACTIVE.store(false, Ordering::SeqCst);
                return Err(SessionError::Startup(err.to_string()));
            }
        };

        let failure = match ready_rx.recv() {
            Ok(Ok(())) => None,
            Ok(Err(message)) => Some(SessionError::Startup(message)),
            Err(_) => Some(SessionError::OwnerPanicked),
        };
        if let Some(failure) = failure {
            let _ = owner.join();
            error!(error = %failure, "session failed to start");
            return Err(failure);
        }

        info!(thread = %thread_name, "session started");
        Ok(Self {
            shared,
            sender: Mutex::new(Some(sender)),
            owner: Mutex::new(Some(owner)),
        })
    }

    /// Runs `job` on the owner thread and waits for its result.
    ///
    /// Jobs run one at a time in the order they were submitted.
    pub fn run<R, F>(&self, job: F) -> Result<R, SessionError>
    where
        F: FnOnce(&Context<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(job).wait()
    }

    /// Queues `job` on the owner thread without waiting for it.
    pub fn submit<R, F>(&self, job: F) -> Pending<R>
    where
        F: FnOnce(&Context<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        Pending {
            inner: self.enqueue(job),
        }
    }

    fn enqueue<R, F>(&self, job: F) -> Result<Receiver<R>, SessionError>
    where
        F: FnOnce(&Context<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shared.is_owner_thread() {
            return Err(SessionError::Reentrant);
        }
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(SessionError::Finalized);
        };
        let (result_tx, result_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |cx| {
            // the waiter may have given up; the late result is dropped here on the owner
            let _ = result_tx.send(job(cx));
        });
        sender.send(job).map_err(|_| SessionError::OwnerPanicked)?;
        Ok(result_rx)
    }

    /// Stops the session: queued jobs finish, then the owner undoes the session's changes
    /// to the interpreter and exits.
    ///
    /// The interpreter itself stays initialized, so a new session can be started afterwards.
    /// Stopping an already stopped session does nothing; jobs submitted afterwards fail with
    /// [`SessionError::Finalized`].
    pub fn stop(&self) -> Result<(), SessionError> {
        if self.shared.is_owner_thread() {
            return Err(SessionError::Reentrant);
        }
        let Some(sender) = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return Ok(());
        };
        drop(sender);

        let owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner).take();
        let joined = owner.map_or(Ok(()), JoinHandle::join);
        info!(live_handles = self.shared.live_handles(), "session stopped");
        joined.map_err(|_| SessionError::OwnerPanicked)
    }

    /// Whether the session still accepts jobs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Number of handles produced by this session that have not been released.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.shared.live_handles()
    }

    /// Everything the foreign code has written to `sys.stdout` since the last reset.
    #[must_use]
    pub fn output(&self) -> String {
        self.shared.output.snapshot()
    }

    /// Returns the captured output and resets the buffer.
    pub fn take_output(&self) -> String {
        self.shared.output.take()
    }

    /// Discards the captured output.
    pub fn clear_output(&self) {
        self.shared.output.clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.shared.is_owner_thread() {
            // dropped inside one of its own jobs; the owner exits once that job returns
            let sender = self.sender.get_mut().unwrap_or_else(PoisonError::into_inner).take();
            if sender.is_some() {
                warn!("session dropped on its owner thread, stopping after the current job");
            }
            return;
        }
        if let Err(err) = self.stop() {
            warn!(error = %err, "session not stopped cleanly");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("running", &self.is_running())
            .field("live_handles", &self.live_handles())
            .finish_non_exhaustive()
    }
}

/// The eventual result of a submitted job.
#[must_use = "a pending job's result is lost unless waited on"]
pub struct Pending<R> {
    inner: Result<Receiver<R>, SessionError>,
}

impl<R> Pending<R> {
    /// Blocks until the job has run.
    pub fn wait(self) -> Result<R, SessionError> {
        self.inner?.recv().map_err(|_| SessionError::JobPanicked)
    }

    /// Blocks until the job has run or `timeout` elapses.
    pub fn wait_timeout(self, timeout: Duration) -> Result<R, SessionError> {
        match self.inner?.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(SessionError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::JobPanicked),
        }
    }
}

impl<R> fmt::Debug for Pending<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("queued", &self.inner.is_ok()).finish()
    }
}

fn owner_loop(shared: &Arc<Shared>, config: &SessionConfig, jobs: &Receiver<Job>, ready: SyncSender<Result<(), String>>) {
    let _claim = ActiveClaim;
    let _ = shared.owner.set(thread::current().id());
    Python::initialize();

    let started = Python::attach(|py| Runtime::start(py, Arc::clone(shared), config).map_err(|err| err.to_string()));
    let runtime = match started {
        Ok(runtime) => runtime,
        Err(message) => {
            let _ = ready.send(Err(message));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    drop(ready);

    while let Ok(job) = jobs.recv() {
        Python::attach(|py| {
            let drained = shared.drain_pending(py);
            if drained > 0 {
                trace!(drained, "dropped references released off the owner thread");
            }
            let cx = Context::new(py, &runtime);
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job(&cx))) {
                error!(message = panic_message(payload.as_ref()), "job panicked");
            }
        });
    }

    Python::attach(|py| {
        if let Err(err) = runtime.shutdown(py) {
            warn!(error = %err, "could not restore interpreter state");
        }
        let drained = shared.close_pending(py);
        trace!(drained, "owner thread exiting");
    });
}

/// Held by the owner thread; gives the interpreter back when the thread exits, panicking
/// or not.
struct ActiveClaim;

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
