pub mod config;
pub mod plan;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use packsync_core::RuntimeConfig;

/// Options shared by every command that talks to the server.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Read configuration from this file instead of ~/.packsync/config.yaml.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Package directory to synchronize (overrides `target_dir`).
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

impl SourceArgs {
    /// Load the configuration once for this invocation. Without `--config`
    /// the default file is created on first use.
    pub fn load(&self) -> Result<RuntimeConfig> {
        let mut cfg = match &self.config {
            Some(path) => packsync_core::config::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => packsync_core::config::load_or_init()
                .context("failed to load ~/.packsync/config.yaml")?,
        };
        if let Some(dir) = &self.dir {
            cfg.target_dir = dir.clone();
        }
        Ok(cfg)
    }
}
