use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures from the JSON document stores and the managed resume files.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no usable data directory on this platform")]
    NoDataDir,

    #[error("resume '{0}' is not in the catalog")]
    UnknownResume(String),

    #[error("a resume named '{0}' already exists")]
    DuplicateResume(String),

    #[error("invalid resume name '{0}'")]
    InvalidName(String),

    /// The catalog file and the managed resume directory disagree.
    #[error("resume catalog inconsistency: {0}")]
    CatalogInconsistent(String),
}

/// Failures raised by the browser driver seam.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {timeout:?} waiting for '{selector}'")]
    Timeout { selector: String, timeout: Duration },

    #[error("no element matched '{0}'")]
    NotFound(String),

    #[error("element handle {0} is no longer registered")]
    UnknownHandle(u64),

    #[error("webdriver: {0}")]
    WebDriver(String),
}

/// Top-level failures a session run can return. Capacity stops and
/// per-job submission failures are not errors: they end or continue the
/// run and show up in the transcript instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid session input: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("browser driver error: {0}")]
    Driver(#[from] DriverError),
}
