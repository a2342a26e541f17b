//! `hivesync remove <content-key>`

use anyhow::Result;
use clap::Args;

use hivesync_core::StoreKey;
use hivesync_process::{RemovalOutcome, RemovalVerifier};

/// Remove one entry of the configured user and verify every replica dropped it.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Content key of the entry, e.g. `FILE:/docs/a.txt`.
    pub content_key: String,

    /// Override the configured retry bound.
    #[arg(long)]
    pub max_remove_retries: Option<u32>,
}

impl RemoveArgs {
    pub fn run(self) -> Result<()> {
        let config = super::load_config()?;
        let retries = self.max_remove_retries.unwrap_or(config.max_remove_retries);
        let verifier = RemovalVerifier::new(super::open_store(&config), retries);
        let key = StoreKey::new(&config.user_id, self.content_key);

        match super::runtime()?.block_on(verifier.remove_and_verify(&key)) {
            RemovalOutcome::Success { attempts } => {
                println!("✓ Removed {key} ({attempts} attempt(s))");
                Ok(())
            }
            RemovalOutcome::Failed { attempts } => {
                anyhow::bail!("{key} still present on some replica after {attempts} attempts")
            }
        }
    }
}
