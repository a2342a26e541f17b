//! Error types for hivesync-process.

use std::path::PathBuf;

use thiserror::Error;

use hivesync_core::StoreError;

/// Everything a process step can fail with.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// A store primitive failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Local I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Application-level failure raised by a step.
    #[error("{0}")]
    Failed(String),

    /// A chain stopped at `step`; completed steps have been rolled back.
    #[error("process '{process}' failed at step '{step}': {source}")]
    Step {
        process: String,
        step: String,
        #[source]
        source: Box<ProcessError>,
    },
}

impl ProcessError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Convenience constructor for [`ProcessError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProcessError {
    ProcessError::Io {
        path: path.into(),
        source,
    }
}
