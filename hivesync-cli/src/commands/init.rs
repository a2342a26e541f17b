//! `hivesync init --user <id> --store <dir> [--replicas N] [--master] [--max-remove-retries N]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use hivesync_core::{config, ClientConfig, UserId};

/// Write the client configuration.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// User id owning every store entry this client touches.
    #[arg(long, short = 'u')]
    pub user: String,

    /// Root directory of the directory-backed store.
    #[arg(long, short = 's')]
    pub store: PathBuf,

    /// Number of replicas the store keeps.
    #[arg(long, default_value_t = config::DEFAULT_REPLICAS)]
    pub replicas: usize,

    /// Drain the shared task queue after every sync.
    #[arg(long)]
    pub master: bool,

    /// Retries after the first remove before verification gives up.
    #[arg(long, default_value_t = config::DEFAULT_REMOVE_RETRIES)]
    pub max_remove_retries: u32,

    /// Upper bound, in seconds, on the wait for transfers to settle.
    #[arg(long, value_name = "SECS")]
    pub settle_timeout: Option<u64>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        if self.replicas == 0 {
            anyhow::bail!("--replicas must be at least 1");
        }
        let home = super::home_dir()?;
        let mut client = ClientConfig::new(UserId::from(self.user), self.store);
        client.replicas = self.replicas;
        client.master = self.master;
        client.max_remove_retries = self.max_remove_retries;
        client.settle_timeout_secs = self.settle_timeout;

        let path = config::save_at(&home, &client).context("failed to save client config")?;
        println!("✓ Configured user '{}'", client.user_id);
        println!("  Store:  {} ({} replicas)", client.store_dir.display(), client.replicas);
        println!("  Saved to: {}", path.display());
        Ok(())
    }
}
