// rtvm/src/cli/use_version.rs
use clap::Args;
use colored::Colorize;
use rtvm_common::config::Config;
use rtvm_common::error::Result;
use rtvm_core::PathUpdate;
use tracing::{debug, instrument};

use crate::cli::runner;

#[derive(Debug, Args)]
pub struct UseArgs {
    /// Installed version to activate, or `latest` for the newest installed one
    #[arg(id = "VERSION_ID", value_name = "VERSION")]
    pub version: String,
}

impl UseArgs {
    #[instrument(skip(self, config), fields(version = %self.version))]
    pub fn run(&self, config: &Config) -> Result<()> {
        println!("Switching to {}...", self.version.cyan());

        let outcome = runner::run_with_events(config, |manager| manager.use_version(&self.version))?;
        debug!(
            "Shims linked: {:?}, removed: {:?}",
            outcome.shims.linked, outcome.shims.removed
        );

        println!("Now using {}", outcome.version.green().bold());
        match outcome.path_update {
            Some(PathUpdate::Updated(file)) => {
                println!(
                    "Added {} to PATH in {}",
                    config.shim_dir().display(),
                    file.display()
                );
                println!(
                    "{}",
                    "Open a new shell (or source that file) for the change to take effect."
                        .yellow()
                );
            }
            Some(PathUpdate::Unchanged(_)) | Some(PathUpdate::Unsupported) | None => {}
        }
        Ok(())
    }
}
