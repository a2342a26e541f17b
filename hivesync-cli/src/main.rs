//! hivesync: peer-to-peer file synchronization client.
//!
//! # Usage
//!
//! ```text
//! hivesync init --user <id> --store <dir> [--replicas N] [--master] [--max-remove-retries N]
//! hivesync sync <root> [--master] [--timeout SECS] [--json]
//! hivesync register --key-file <path>
//! hivesync remove <content-key> [--max-remove-retries N]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, register::RegisterArgs, remove::RemoveArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "hivesync",
    version,
    about = "Synchronize a local folder through a replicated key/value store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.hivesync/config.yaml.
    Init(InitArgs),

    /// Download, upload and update files, then drain the task queue on the master.
    Sync(SyncArgs),

    /// Publish the user's public key and an empty profile.
    Register(RegisterArgs),

    /// Remove one store entry and verify the removal converged.
    Remove(RemoveArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Register(args) => args.run(),
        Commands::Remove(args) => args.run(),
    }
}

/// Logs go to stderr so stdout stays parseable (`sync --json`).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
