//! `hivesync register --key-file <path>`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use hivesync_sync::{register, SyncEnv};

/// Publish the configured user's public key and an empty profile.
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// File holding the public key to publish.
    #[arg(long, value_name = "PATH")]
    pub key_file: PathBuf,
}

impl RegisterArgs {
    pub fn run(self) -> Result<()> {
        let config = super::load_config()?;
        let public_key = std::fs::read(&self.key_file)
            .with_context(|| format!("cannot read key file '{}'", self.key_file.display()))?;

        // Registration does not touch local files; the root is never used.
        let env = SyncEnv::from_config(&config, super::open_store(&config), super::home_dir()?);
        super::runtime()?
            .block_on(register(env, public_key))
            .with_context(|| format!("failed to register '{}'", config.user_id))?;

        println!("✓ Registered '{}'", config.user_id);
        Ok(())
    }
}
