//! Session configuration.

use std::{
    fs,
    path::{Path, PathBuf},
};

/// Filename the session's scripts are compiled under, shown in foreign tracebacks.
pub const DEFAULT_SCRIPT_NAME: &str = "<tether>";

/// Name of the thread that owns the interpreter.
pub const DEFAULT_THREAD_NAME: &str = "tether-owner";

/// Configuration for an interpreter session.
///
/// Use `SessionConfig::default()` for the defaults, or build a custom configuration with
/// the builder methods. Can also be loaded from JSON, where every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Filename scripts are compiled under.
    pub script_name: String,
    /// Replace the foreign `sys.stdout` with a buffer the host can read.
    pub capture_output: bool,
    /// Directories put in front of the foreign module search path, in order.
    pub search_paths: Vec<PathBuf>,
    /// Name of the owner thread.
    pub thread_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            script_name: DEFAULT_SCRIPT_NAME.to_owned(),
            capture_output: true,
            search_paths: Vec::new(),
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filename scripts are compiled under.
    #[must_use]
    pub fn script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    /// Enables or disables output capture.
    #[must_use]
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Adds a directory to the foreign module search path, after those added before.
    #[must_use]
    pub fn search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Sets the name of the owner thread.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Parses a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

/// Failure to load a [`SessionConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
