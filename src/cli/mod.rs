//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{ExpandCommand, HistoryCommand, RunCommand, TriggersCommand, ValidateCommand};
use std::ffi::OsString;

/// Pipeline template expansion and staged release runner
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeforge")]
#[command(version)]
#[command(about = "Expands CI job templates into gated multi-stage release plans", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Expand a pipeline definition and print the plan
    Expand(ExpandCommand),

    /// Validate a pipeline definition
    Validate(ValidateCommand),

    /// Expand and run a pipeline with the dry-run executor
    Run(RunCommand),

    /// Report which trigger fires for an event
    Triggers(TriggersCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
