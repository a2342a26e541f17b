//! Error types for hivesync-sync.

use std::path::PathBuf;

use thiserror::Error;

use hivesync_core::StoreError;
use hivesync_process::ProcessError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A workflow failed; completed steps have been rolled back.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A store primitive failed outside of a workflow.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored JSON document (profile, queue, task) could not be (de)serialized.
    #[error("document JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A profile path that cannot be mapped below the sync root.
    #[error("invalid profile path '{0}'")]
    InvalidPath(String),

    /// The user already has a public key in the store.
    #[error("user '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Steps report sync failures through the process error type.
impl From<SyncError> for ProcessError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Process(err) => err,
            SyncError::Store(err) => ProcessError::Store(err),
            SyncError::Io { path, source } => ProcessError::Io { path, source },
            other => ProcessError::Failed(other.to_string()),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
