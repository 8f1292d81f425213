//! `packsync plan` — show what a sync would download.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use packsync_core::SyncPlan;
use packsync_sync::{DiffEngine, ManifestClient, UreqTransport};

use super::SourceArgs;
use crate::console::human_size;

/// Arguments for `packsync plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "file")]
    filename: String,
    #[tabled(rename = "reason")]
    reason: String,
    #[tabled(rename = "size")]
    size: String,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let config = self.source.load()?;
        let api = &config.providers.api;

        let client = ManifestClient::new(UreqTransport::new(), config.manifest_timeouts());
        let manifest = client
            .fetch_manifest(&api.base_url, &api.current_version)
            .with_context(|| format!("failed to fetch manifest from {}", api.base_url))?;
        let plan = DiffEngine::new().plan(&config.target_dir, &manifest);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("failed to serialize plan JSON")?
            );
            return Ok(());
        }

        print_plan(&plan, manifest.len(), &config.target_dir.display().to_string());
        Ok(())
    }
}

fn print_plan(plan: &SyncPlan, manifest_len: usize, target: &str) {
    println!(
        "{} | {} file(s) in manifest | {} to download",
        target.bold(),
        manifest_len,
        plan.len()
    );

    if plan.is_empty() {
        println!("{}", "✓ Everything is up to date".green());
    } else {
        let rows: Vec<PlanRow> = plan
            .entries
            .iter()
            .map(|planned| PlanRow {
                filename: planned.entry.filename.clone(),
                reason: planned.reason.to_string(),
                size: human_size(planned.entry.size),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    for skipped in &plan.skipped {
        println!(
            "{} {} was not checked: {}",
            "!".yellow(),
            skipped.filename,
            skipped.reason
        );
    }
}
