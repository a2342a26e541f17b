//! Error types for hivesync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::StoreKey;

/// Failures reported by an [`AsyncStore`](crate::store::AsyncStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store answered but refused the operation.
    #[error("store rejected {op} of {key}")]
    Rejected { op: &'static str, key: StoreKey },

    /// No replica could be reached.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// Local I/O failure of a directory-backed store, with annotated path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// All errors that can arise while loading or saving the client config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file does not exist yet.
    #[error("config not found at {path}; run `hivesync init` first")]
    NotFound { path: PathBuf },
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
