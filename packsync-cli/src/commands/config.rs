//! `packsync config` — create, print or locate the configuration file.

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use packsync_core::RuntimeConfig;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write the default configuration to ~/.packsync/config.yaml.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as YAML.
    Show,

    /// Print the configuration file path.
    Path,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init { force } => init(force),
        ConfigCommand::Show => show(),
        ConfigCommand::Path => {
            let path = packsync_core::config::config_path()
                .context("could not determine config path")?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn init(force: bool) -> Result<()> {
    let path = packsync_core::config::config_path().context("could not determine config path")?;
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    packsync_core::config::save(&RuntimeConfig::default())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("✓ wrote default configuration to {}", path.display());
    Ok(())
}

fn show() -> Result<()> {
    let config = packsync_core::config::load_or_init().context("failed to load configuration")?;
    let yaml = serde_yaml::to_string(&config).context("failed to serialize configuration")?;
    print!("{yaml}");
    Ok(())
}
