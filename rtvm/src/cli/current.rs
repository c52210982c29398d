// rtvm/src/cli/current.rs
use clap::Args;
use colored::Colorize;
use rtvm_common::config::Config;
use rtvm_common::error::Result;
use rtvm_core::CurrentVersion;

use crate::cli::runner;

#[derive(Args, Debug)]
pub struct Current {}

impl Current {
    pub fn run(&self, config: &Config) -> Result<()> {
        let manager = runner::manager(config)?;
        match manager.current()? {
            CurrentVersion::Managed(version) => {
                println!("Current version: {}", version.green().bold());
            }
            CurrentVersion::System(path) => {
                let version = manager
                    .detect_system_version()
                    .map(|v| format!(" ({v})"))
                    .unwrap_or_default();
                println!("Using system installation{} at {}", version, path.display());
            }
            CurrentVersion::None => {
                println!(
                    "{}",
                    "No active version. Use 'rtvm use <version>' to activate one.".yellow()
                );
            }
        }
        Ok(())
    }
}
