//! Client configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.hivesync/
//!   config.yaml   (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::UserId;

/// Default bound on remove-verification retries.
pub const DEFAULT_REMOVE_RETRIES: u32 = 3;

/// Default replica count of a directory-backed store.
pub const DEFAULT_REPLICAS: usize = 3;

/// Persisted client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub user_id: UserId,
    /// Root directory of the directory-backed store.
    pub store_dir: PathBuf,
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    /// Retries after the first remove before verification gives up.
    #[serde(default = "default_remove_retries")]
    pub max_remove_retries: u32,
    /// Whether this client drains the shared task queue after a sync.
    #[serde(default)]
    pub master: bool,
    /// Optional upper bound on the wait for all transfers to settle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn new(user_id: UserId, store_dir: PathBuf) -> Self {
        Self {
            user_id,
            store_dir,
            replicas: DEFAULT_REPLICAS,
            max_remove_retries: DEFAULT_REMOVE_RETRIES,
            master: false,
            settle_timeout_secs: None,
        }
    }

    pub fn settle_timeout(&self) -> Option<Duration> {
        self.settle_timeout_secs.map(Duration::from_secs)
    }
}

fn default_replicas() -> usize {
    DEFAULT_REPLICAS
}

fn default_remove_retries() -> u32 {
    DEFAULT_REMOVE_RETRIES
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.hivesync/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".hivesync").join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load the config from `<home>/.hivesync/config.yaml`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` if the
/// YAML is malformed.
pub fn load_at(home: &Path) -> Result<ClientConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<ClientConfig, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config: serialize → `config.yaml.tmp` → `chmod 0600`
/// → `rename`.
pub fn save_at(home: &Path, config: &ClientConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(home);
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml)?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path)?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(config: &ClientConfig) -> Result<PathBuf, ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
