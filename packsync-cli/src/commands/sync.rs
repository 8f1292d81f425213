//! `packsync sync` — run a full synchronization session.

use std::process::Command;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use packsync_sync::{
    CancelToken, Countdown, ProgressSink, RuntimeControl, SyncOrchestrator, SyncReport,
    SyncResult, UreqTransport,
};

use super::SourceArgs;
use crate::console::{ConsoleSink, JsonLinesSink};

/// Arguments for `packsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Number of concurrent downloads (overrides `download.threads`).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Extra attempts per file after the first (overrides `download.retries`).
    #[arg(long)]
    pub retries: Option<u32>,

    /// Schedule the restart immediately after success.
    #[arg(long)]
    pub no_countdown: bool,

    /// Program (and arguments) to launch once every file is in place.
    #[arg(long, num_args = 1.., value_name = "CMD", allow_hyphen_values = true)]
    pub restart_cmd: Vec<String>,

    /// Emit events and the final report as JSON lines.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let mut config = self.source.load()?;
        if let Some(threads) = self.threads {
            config.download.threads = threads;
        }
        if let Some(retries) = self.retries {
            config.download.retries = retries;
        }
        config.validate().context("invalid configuration")?;

        let cancel = CancelToken::new();
        let handler_token = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("cancelling; waiting for in-flight downloads to stop");
            handler_token.cancel();
        })
        .context("failed to install Ctrl-C handler")?;

        let mut orchestrator =
            SyncOrchestrator::new(config, UreqTransport::new()).with_cancel(cancel);
        if self.no_countdown {
            orchestrator = orchestrator.with_countdown(Countdown::none());
        }

        let control = RestartCommand::new(self.restart_cmd);
        let report = if self.json {
            let mut sink = JsonLinesSink;
            run_session(&orchestrator, &mut sink, &control)
        } else {
            let mut sink = ConsoleSink::new();
            run_session(&orchestrator, &mut sink, &control)
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string(&report).context("failed to serialize sync report")?
            );
        } else {
            print_summary(&report);
        }

        match report.result {
            SyncResult::AbortedOnError(abort) => bail!("sync aborted: {abort}"),
            _ => Ok(()),
        }
    }
}

fn run_session(
    orchestrator: &SyncOrchestrator<UreqTransport>,
    sink: &mut (dyn ProgressSink + Send),
    control: &RestartCommand,
) -> SyncReport {
    orchestrator.synchronize_with_report(sink, control)
}

fn print_summary(report: &SyncReport) {
    for skipped in &report.skipped {
        println!(
            "{} {} was not checked: {}",
            "!".yellow(),
            skipped.filename,
            skipped.reason
        );
    }
    let seconds = report.duration_ms as f64 / 1000.0;
    match &report.result {
        SyncResult::UpToDate => {}
        SyncResult::AllSucceeded { downloaded, .. } => {
            println!("{downloaded} file(s) synchronized in {seconds:.1}s");
        }
        SyncResult::AbortedOnError(_) => {
            println!(
                "{} {} of {} file(s) downloaded in {seconds:.1}s",
                "✗".red(),
                report.downloaded,
                report.planned
            );
        }
    }
}

/// Restart capability for the terminal: launches the configured command,
/// or tells the operator a restart is needed.
pub struct RestartCommand {
    argv: Vec<String>,
}

impl RestartCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl RuntimeControl for RestartCommand {
    fn schedule_restart(&self) {
        let Some((program, args)) = self.argv.split_first() else {
            println!("{}", "Restart required to load the updated files.".yellow());
            return;
        };
        match Command::new(program).args(args).spawn() {
            Ok(child) => tracing::info!("launched restart command (pid {})", child.id()),
            Err(err) => {
                tracing::error!("failed to launch restart command '{program}': {err}");
                eprintln!("{} failed to launch '{program}': {err}", "error:".red().bold());
            }
        }
    }
}
