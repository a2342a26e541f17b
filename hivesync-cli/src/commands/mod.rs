//! Subcommand implementations and the plumbing they share.

pub mod init;
pub mod register;
pub mod remove;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use hivesync_core::{config, AsyncStore, ClientConfig, DirStore};

/// Home directory, as the config layer resolves it.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Load `~/.hivesync/config.yaml`.
pub fn load_config() -> Result<ClientConfig> {
    let home = home_dir()?;
    config::load_at(&home).context("failed to load client config")
}

/// The configured directory-backed store.
pub fn open_store(config: &ClientConfig) -> Arc<dyn AsyncStore> {
    Arc::new(DirStore::new(&config.store_dir, config.replicas))
}

/// Multi-thread runtime for the async workflows.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")
}
