//! The execution-context token and the per-session interpreter state behind it.
//!
//! A [`Context`] exists only inside a job running on the session's owner thread with the
//! interpreter attached. Every boundary operation takes one, so holding a `&Context` is the
//! proof that the caller is on the owning execution context.

use std::{cell::RefCell, collections::HashMap, sync::Arc};

use pyo3::{
    exceptions::{PyAttributeError, PyModuleNotFoundError},
    prelude::*,
    types::{PyDict, PyList, PyString},
};
use tracing::{debug, trace};

use crate::{
    config::SessionConfig,
    convert::ToForeign,
    error::Result,
    handle::Handle,
    output,
    session::Shared,
    translate::{self, OrTranslate, Site},
};

/// Proof of running on the owning execution context with the interpreter attached.
///
/// Obtained only through [`crate::Session::run`] and friends; it cannot outlive the job it
/// was handed to.
pub struct Context<'py> {
    py: Python<'py>,
    runtime: &'py Runtime,
}

impl<'py> Context<'py> {
    pub(crate) fn new(py: Python<'py>, runtime: &'py Runtime) -> Self {
        Self { py, runtime }
    }

    /// The pyo3 token, for direct use of the pyo3 API alongside the bridge.
    #[must_use]
    pub fn py(&self) -> Python<'py> {
        self.py
    }

    /// Takes a handle on `object`.
    pub(crate) fn acquire(&self, object: Bound<'py, PyAny>) -> Handle {
        Handle::new(object.unbind(), Arc::clone(&self.runtime.shared))
    }

    /// Wraps a strong reference obtained through pyo3 into a session handle.
    #[must_use]
    pub fn adopt(&self, object: Py<PyAny>) -> Handle {
        Handle::new(object, Arc::clone(&self.runtime.shared))
    }

    /// Asserts that a handle's session is the one this context runs in.
    pub(crate) fn check_session(&self, session: &Arc<Shared>) {
        assert!(
            Arc::ptr_eq(session, &self.runtime.shared),
            "handle used with a context of a different session"
        );
    }

    pub(crate) fn runtime(&self) -> &'py Runtime {
        self.runtime
    }

    /// Number of handles of this session that have not been released yet.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.runtime.shared.live_handles()
    }

    /// The session's global namespace (a foreign `dict`).
    #[must_use]
    pub fn globals(&self) -> Handle {
        self.acquire(self.runtime.globals.bind(self.py).clone().into_any())
    }

    /// The foreign `builtins` module.
    #[must_use]
    pub fn builtins(&self) -> Handle {
        self.acquire(self.runtime.builtins.bind(self.py).clone().into_any())
    }

    /// A handle on the foreign `None` singleton.
    #[must_use]
    pub fn none(&self) -> Handle {
        self.adopt(self.py.None())
    }

    /// Converts a host value into a new foreign value.
    pub fn to_foreign<T: ToForeign + ?Sized>(&self, value: &T) -> Result<Handle> {
        value.to_foreign(self)
    }

    /// Runs `source` as a script in the session's global namespace.
    ///
    /// Returns the value bound to `result` afterwards, or `None` when no name was requested
    /// or the script did not bind it. A syntax error is reported as [`crate::Error::RunError`];
    /// an exception raised while running as [`crate::Error::ForeignException`].
    pub fn execute(&self, source: &str, result: Option<&str>) -> Result<Option<Handle>> {
        let code = self.compile(source, "exec")?;
        let builtins = self.runtime.builtins.bind(self.py);
        let globals = self.runtime.globals.bind(self.py);
        builtins
            .getattr("exec")
            .and_then(|exec| exec.call1((code, globals)))
            .or_translate(self, Site::Execute)?;

        let Some(name) = result else {
            return Ok(None);
        };
        let value = globals.get_item(name).or_translate(self, Site::Member)?;
        Ok(value.map(|value| self.acquire(value)))
    }

    /// Evaluates a single expression in the session's global namespace.
    pub fn eval(&self, expression: &str) -> Result<Handle> {
        let code = self.compile(expression, "eval")?;
        let builtins = self.runtime.builtins.bind(self.py);
        let value = builtins
            .getattr("eval")
            .and_then(|eval| eval.call1((code, self.runtime.globals.bind(self.py))))
            .or_translate(self, Site::Execute)?;
        Ok(self.acquire(value))
    }

    fn compile(&self, source: &str, mode: &str) -> Result<Bound<'py, PyAny>> {
        self.runtime
            .builtins
            .bind(self.py)
            .getattr("compile")
            .and_then(|compile| compile.call1((source, self.runtime.script_name.as_str(), mode)))
            .or_translate(self, Site::Compile)
    }

    /// Loads a module by dotted name, reusing the session's cached module on later calls.
    pub fn import_module(&self, name: &str) -> Result<Handle> {
        let module = self.load_module(name)?;
        Ok(self.acquire(module.into_any()))
    }

    fn load_module(&self, name: &str) -> Result<Bound<'py, PyModule>> {
        if let Some(module) = self.runtime.modules.borrow().get(name) {
            trace!(module = name, "module cache hit");
            return Ok(module.bind(self.py).clone());
        }
        let module = PyModule::import(self.py, name).or_translate(self, Site::Import { module: name })?;
        debug!(module = name, "imported module");
        self.runtime
            .modules
            .borrow_mut()
            .insert(name.to_owned(), module.clone().unbind());
        Ok(module)
    }

    /// Resolves `symbol` from `module`, like the foreign `from module import symbol`.
    ///
    /// Looks the symbol up as an attribute first and falls back to importing the submodule
    /// `module.symbol`. When neither exists the attribute failure is reported.
    pub fn import_from(&self, module: &str, symbol: &str) -> Result<Handle> {
        let parent = self.load_module(module)?;
        let lookup = match parent.getattr(symbol) {
            Ok(value) => return Ok(self.acquire(value)),
            Err(err) => err,
        };
        if !lookup.is_instance_of::<PyAttributeError>(self.py) {
            return Err(translate::failure(self, lookup, Site::Member));
        }

        let qualified = format!("{module}.{symbol}");
        match PyModule::import(self.py, qualified.as_str()) {
            Ok(submodule) => {
                debug!(module = %qualified, "imported submodule");
                self.runtime
                    .modules
                    .borrow_mut()
                    .insert(qualified, submodule.clone().unbind());
                Ok(self.acquire(submodule.into_any()))
            }
            Err(err) if err.is_instance_of::<PyModuleNotFoundError>(self.py) => {
                Err(translate::failure(self, lookup, Site::Member))
            }
            Err(err) => Err(translate::failure(self, err, Site::Import { module: &qualified })),
        }
    }
}

/// Interpreter state owned by one session, living on its owner thread.
pub(crate) struct Runtime {
    shared: Arc<Shared>,
    script_name: String,
    builtins: Py<PyModule>,
    globals: Py<PyDict>,
    modules: RefCell<HashMap<String, Py<PyModule>>>,
    /// `lambda f, a, k, extra: f(*a, **k, **extra)`, used to pass repeated keyword names
    /// through to the callee unchanged.
    keyword_call: Py<PyAny>,
    /// The `sys.stdout` that was replaced by output capture.
    previous_stdout: Option<Py<PyAny>>,
}

impl Runtime {
    pub(crate) fn start(py: Python<'_>, shared: Arc<Shared>, config: &SessionConfig) -> PyResult<Self> {
        let builtins = PyModule::import(py, "builtins")?;
        let globals = PyDict::new(py);
        globals.set_item("__builtins__", &builtins)?;
        globals.set_item("__name__", "__main__")?;

        let sys = PyModule::import(py, "sys")?;
        if !config.search_paths.is_empty() {
            let path = sys.getattr("path")?.cast_into::<PyList>()?;
            for (position, dir) in config.search_paths.iter().enumerate() {
                path.insert(position, PyString::new(py, &dir.to_string_lossy()))?;
            }
        }

        let keyword_call = py.eval(c"lambda f, a, k, extra: f(*a, **k, **extra)", None, None)?;
        let previous_stdout = if config.capture_output {
            Some(output::install(&sys, shared.output().clone())?)
        } else {
            None
        };

        Ok(Self {
            shared,
            script_name: config.script_name.clone(),
            builtins: builtins.unbind(),
            globals: globals.unbind(),
            modules: RefCell::new(HashMap::new()),
            keyword_call: keyword_call.unbind(),
            previous_stdout,
        })
    }

    pub(crate) fn keyword_call<'py>(&self, py: Python<'py>) -> &Bound<'py, PyAny> {
        self.keyword_call.bind(py)
    }

    /// Undoes the session's changes to interpreter-wide state and drops its namespace.
    pub(crate) fn shutdown(self, py: Python<'_>) -> PyResult<()> {
        let restored = match &self.previous_stdout {
            Some(previous) => PyModule::import(py, "sys").and_then(|sys| output::restore(&sys, previous.bind(py))),
            None => Ok(()),
        };
        self.globals.bind(py).clear();
        self.modules.borrow_mut().clear();
        restored
    }
}
