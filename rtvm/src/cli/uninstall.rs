// rtvm/src/cli/uninstall.rs
use std::path::Path;

use clap::Args;
use colored::Colorize;
use rtvm_common::config::Config;
use rtvm_common::error::{Result, RtvmError};
use tracing::{debug, warn};

use crate::cli::runner;

#[derive(Args, Debug)]
pub struct Uninstall {
    /// Installed version to remove; the active version cannot be removed
    #[arg(id = "VERSION_ID", value_name = "VERSION")]
    pub version: String,
}

impl Uninstall {
    pub fn run(&self, config: &Config) -> Result<()> {
        println!("Uninstalling {}...", self.version.cyan());

        let (version, file_count, size_bytes) = runner::run_with_events(config, |manager| {
            let record = manager
                .installation(&self.version)?
                .ok_or_else(|| RtvmError::NotInstalled(manager.normalize(&self.version)))?;
            let (file_count, size_bytes) = count_files_and_size(&record.install_path);
            debug!(
                "Removing {} ({} files) from {}",
                record.version_id,
                file_count,
                record.install_path.display()
            );
            manager.uninstall(&record.version_id)?;
            Ok((record.version_id, file_count, size_bytes))
        })?;

        println!(
            "✓ Uninstalled {} ({} files, {})",
            version.green(),
            file_count,
            format_size(size_bytes)
        );
        Ok(())
    }
}

fn count_files_and_size(path: &Path) -> (usize, u64) {
    let mut file_count = 0;
    let mut total_size = 0;
    for entry in walkdir::WalkDir::new(path) {
        match entry {
            Ok(entry_data) => {
                let file_type = entry_data.file_type();
                if !(file_type.is_file() || file_type.is_symlink()) {
                    continue;
                }
                file_count += 1;
                if file_type.is_file() {
                    match entry_data.metadata() {
                        Ok(metadata) => total_size += metadata.len(),
                        Err(e) => warn!(
                            "Could not get metadata for {}: {}",
                            entry_data.path().display(),
                            e
                        ),
                    }
                }
            }
            Err(e) => {
                warn!("Error traversing directory {}: {}", path.display(), e);
            }
        }
    }
    (file_count, total_size)
}

fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if size >= GB {
        format!("{:.1}GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.1}MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.1}KB", size as f64 / KB as f64)
    } else {
        format!("{size}B")
    }
}
