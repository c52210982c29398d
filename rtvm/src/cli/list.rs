// rtvm/src/cli/list.rs
use std::cmp::Ordering;

use clap::Args;
use colored::Colorize;
use rtvm_common::config::Config;
use rtvm_common::error::Result;
use rtvm_common::model::InstallationRecord;
use rtvm_common::version::compare_versions;
use rtvm_core::CurrentVersion;

use crate::cli::runner;

#[derive(Args, Debug)]
pub struct List {}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ListRow {
    version: String,
    system: bool,
    current: bool,
}

impl List {
    pub fn run(&self, config: &Config) -> Result<()> {
        let manager = runner::manager(config)?;
        let installed = manager.list_installed()?;
        let current = manager.current()?;
        let system_version = manager.detect_system_version();

        let rows = build_rows(
            &installed,
            &current,
            system_version,
            &config.layout.version_prefix,
        );
        if rows.is_empty() {
            println!(
                "{}",
                "No versions found. Use 'rtvm install <version>' to install one.".yellow()
            );
            return Ok(());
        }

        let arch = &manager.platform().arch;
        for row in rows {
            let label = if row.system {
                format!("{} {}", row.version, "(system)".dimmed())
            } else {
                row.version.clone()
            };
            if row.current {
                println!(
                    "{} {} (Currently using {} executable)",
                    "*".green().bold(),
                    label.green(),
                    arch
                );
            } else {
                println!("  {label}");
            }
        }
        Ok(())
    }
}

/// Managed versions plus the system runtime, current first, then newest.
fn build_rows(
    installed: &[InstallationRecord],
    current: &CurrentVersion,
    system_version: Option<String>,
    prefix: &str,
) -> Vec<ListRow> {
    let mut rows: Vec<ListRow> = installed
        .iter()
        .map(|record| ListRow {
            version: record.version_id.clone(),
            system: false,
            current: matches!(current, CurrentVersion::Managed(v) if *v == record.version_id),
        })
        .collect();
    if let Some(version) = system_version {
        rows.push(ListRow {
            version,
            system: true,
            current: matches!(current, CurrentVersion::System(_)),
        });
    }

    rows.sort_by(|a, b| match (a.current, b.current) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => compare_versions(&b.version, &a.version, prefix),
    });
    rows
}
