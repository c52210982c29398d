// rtvm/src/cli/available.rs
use clap::Args;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use rtvm_common::config::Config;
use rtvm_common::error::Result;
use rtvm_common::model::ReleaseEntry;
use rtvm_common::version::{compare_versions, VersionKey};

use crate::cli::runner;

/// Minor versions below this are shown as old stable.
const OLD_STABLE_BELOW_MINOR: u64 = 20;
const MAX_CURRENT_ROWS: usize = 15;
const MAX_OTHER_ROWS: usize = 20;

#[derive(Args, Debug)]
pub struct Available {
    /// Only show stable releases
    #[arg(long)]
    pub stable: bool,

    /// Show at most N releases, in catalog order
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Print the catalog entries as JSON
    #[arg(long)]
    pub json: bool,
}

/// Releases grouped into the table's columns, each newest first.
#[derive(Debug, Default, PartialEq, Eq)]
struct Columns {
    current: Vec<String>,
    recent_stable: Vec<String>,
    old_stable: Vec<String>,
    unstable: Vec<String>,
}

impl Available {
    pub fn run(&self, config: &Config) -> Result<()> {
        let manager = runner::manager(config)?;
        let releases = manager.list_available(self.stable, self.limit.filter(|n| *n > 0))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&releases)?);
            return Ok(());
        }

        if releases.is_empty() {
            println!("{}", "No releases matched.".yellow());
            return Ok(());
        }

        let columns = categorize(&releases, &config.layout.version_prefix);
        println!("{}", "Available versions".bold());
        print_table(&columns);
        Ok(())
    }
}

fn categorize(releases: &[ReleaseEntry], prefix: &str) -> Columns {
    let keyed: Vec<(&ReleaseEntry, VersionKey)> = releases
        .iter()
        .map(|release| (release, VersionKey::parse(&release.version_id, prefix)))
        .collect();
    let newest_minor = keyed.iter().map(|(_, key)| key.minor()).max().unwrap_or(0);

    let mut columns = Columns::default();
    for (release, key) in keyed {
        let version = release.version_id.clone();
        if key.minor() == newest_minor {
            columns.current.push(version);
        } else if release.is_stable {
            if key.minor() >= OLD_STABLE_BELOW_MINOR {
                columns.recent_stable.push(version);
            } else {
                columns.old_stable.push(version);
            }
        } else if key.is_prerelease() {
            columns.unstable.push(version);
        }
    }

    for column in [
        &mut columns.current,
        &mut columns.recent_stable,
        &mut columns.old_stable,
        &mut columns.unstable,
    ] {
        column.sort_by(|a, b| compare_versions(b, a, prefix));
    }
    columns.current.truncate(MAX_CURRENT_ROWS);
    columns.recent_stable.truncate(MAX_OTHER_ROWS);
    columns.old_stable.truncate(MAX_OTHER_ROWS);
    columns.unstable.truncate(MAX_OTHER_ROWS);
    columns
}

fn print_table(columns: &Columns) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.add_row(Row::new(vec![
        Cell::new("CURRENT").style_spec("bFc"),
        Cell::new("RECENT STABLE").style_spec("bFg"),
        Cell::new("OLD STABLE").style_spec("bFb"),
        Cell::new("UNSTABLE").style_spec("bFy"),
    ]));

    let all = [
        &columns.current,
        &columns.recent_stable,
        &columns.old_stable,
        &columns.unstable,
    ];
    let rows = all.iter().map(|column| column.len()).max().unwrap_or(0);
    for i in 0..rows {
        let cells = all
            .iter()
            .map(|column| Cell::new(column.get(i).map(String::as_str).unwrap_or("")))
            .collect();
        table.add_row(Row::new(cells));
    }
    table.printstd();
}
