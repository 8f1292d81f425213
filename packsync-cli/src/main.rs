//! packsync — keep a local package set in step with a remote manifest.
//!
//! # Usage
//!
//! ```text
//! packsync sync [--config <file>] [--dir <dir>] [--threads N] [--retries N]
//!               [--no-countdown] [--restart-cmd <cmd>...] [--json]
//! packsync plan [--config <file>] [--dir <dir>] [--json]
//! packsync config init [--force]
//! packsync config show
//! packsync config path
//! ```
//!
//! Global: `-v/--verbose` raises the log level to `debug`. `RUST_LOG`
//! overrides both.

mod commands;
mod console;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigCommand, plan::PlanArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "packsync",
    version,
    about = "Synchronize a local package set with a remote manifest",
    long_about = None,
)]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download missing or stale files, then schedule a restart.
    Sync(SyncArgs),

    /// Show what `sync` would download, without downloading.
    Plan(PlanArgs),

    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Plan(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
