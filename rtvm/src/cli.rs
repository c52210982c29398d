// rtvm/src/cli.rs
//! Defines the command-line argument structure using clap.
use clap::{ArgAction, Parser, Subcommand};
use rtvm_common::config::Config;
use rtvm_common::error::Result;

pub mod available;
pub mod current;
pub mod install;
pub mod list;
pub mod runner;
pub mod status;
pub mod uninstall;
pub mod use_version;

use crate::cli::available::Available;
use crate::cli::current::Current;
use crate::cli::install::InstallArgs;
use crate::cli::list::List;
use crate::cli::uninstall::Uninstall;
use crate::cli::use_version::UseArgs;

/// A Go version manager.
///
/// Versions may be given as `go1.21.5`, `1.21.5` or `latest`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "rtvm", bin_name = "rtvm")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Override the primary download base URL (same as RTVM_DL_MIRROR)
    #[arg(long, global = true, value_name = "URL")]
    pub mirror: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download and install a Go version
    Install(InstallArgs),
    /// Switch the active Go version
    Use(UseArgs),
    /// Remove an installed Go version
    Uninstall(Uninstall),
    /// List installed Go versions
    #[command(alias = "ls")]
    List(List),
    /// List Go versions published upstream
    Available(Available),
    /// Show the active Go version
    Current(Current),
}

impl Command {
    pub fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config),
            Self::Use(command) => command.run(config),
            Self::Uninstall(command) => command.run(config),
            Self::List(command) => command.run(config),
            Self::Available(command) => command.run(config),
            Self::Current(command) => command.run(config),
        }
    }
}
