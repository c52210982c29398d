// rtvm/src/cli/install.rs
use clap::Args;
use colored::Colorize;
use rtvm_common::config::Config;
use rtvm_common::error::Result;
use tracing::instrument;

use crate::cli::runner;

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Version to install: `go1.21.5`, `1.21.5` or `latest` (newest stable)
    #[arg(id = "VERSION_ID", value_name = "VERSION")]
    pub version: String,
}

impl InstallArgs {
    #[instrument(skip(self, config), fields(version = %self.version))]
    pub fn run(&self, config: &Config) -> Result<()> {
        println!("Installing {}...", self.version.cyan());

        let outcome = runner::run_with_events(config, |manager| manager.install(&self.version))?;

        println!(
            "{} Installed {} to {}",
            "✓".green().bold(),
            outcome.version.green(),
            outcome.path.display()
        );
        if !outcome.verified {
            println!(
                "{}",
                "  The archive was not checksum-verified (no digest published).".yellow()
            );
        }
        println!(
            "Use '{}' to switch to this version",
            format!("rtvm use {}", outcome.version).cyan()
        );
        Ok(())
    }
}
