//! `hivesync sync <root> [--master] [--timeout SECS] [--json]`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use hivesync_sync::{post_login, SyncEnv, SyncReport};

/// Synchronize a local root with the user profile.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Local directory mirrored by the profile.
    pub root: PathBuf,

    /// Act as master for this run: drain the pending task queue afterwards.
    #[arg(long)]
    pub master: bool,

    /// Give up waiting for transfers after SECS seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let config = super::load_config()?;
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("cannot create sync root '{}'", self.root.display()))?;

        let mut env = SyncEnv::from_config(&config, super::open_store(&config), self.root.clone());
        if let Some(secs) = self.timeout {
            env.settle_timeout = Some(Duration::from_secs(secs));
        }
        let is_master = self.master || config.master;
        tracing::debug!(root = %self.root.display(), user = %config.user_id, is_master, "starting sync");

        let report = super::runtime()?
            .block_on(post_login(env, is_master))
            .with_context(|| format!("sync failed for '{}'", self.root.display()))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize sync report")?
            );
        } else {
            print_report(&self.root, &report);
        }
        Ok(())
    }
}

fn print_report(root: &std::path::Path, report: &SyncReport) {
    let mark = if report.is_clean() {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    println!(
        "{mark} '{}' synchronized ({} downloaded, {} uploaded, {} updated)",
        root.display(),
        report.downloads,
        report.uploads,
        report.updates,
    );
    if report.tasks_applied > 0 || report.tasks_pending > 0 {
        println!(
            "  tasks: {} applied, {} still queued",
            report.tasks_applied, report.tasks_pending
        );
    }
    if report.profile_written {
        println!("  profile updated");
    }
    for problem in &report.problems {
        println!("  {} {problem}", "✗".red());
    }
}
