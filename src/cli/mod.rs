//! CLI module for netbird-inventory
//!
//! Argument parsing and subcommand dispatch. The subcommands mirror the
//! `ansible-inventory` actions: `list`, `host` and `graph`.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// netbird-inventory - NetBird peers as an Ansible inventory
///
/// Reads a `*.netbird.yml` inventory config and prints the resulting
/// inventory.
#[derive(Parser, Debug, Clone)]
#[command(name = "netbird-inventory")]
#[command(version)]
#[command(about = "NetBird peers as an Ansible-compatible dynamic inventory", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the inventory config file
    #[arg(short = 'i', long, global = true, env = "NETBIRD_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Inventory document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Dynamic inventory JSON
    #[default]
    Json,
    /// Nested YAML inventory
    Yaml,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the full inventory
    List(commands::inventory::ListArgs),

    /// Print the variables of one host
    Host(commands::inventory::HostArgs),

    /// Print the group tree
    Graph(commands::inventory::GraphArgs),

    /// Check whether a file is a NetBird inventory config
    Verify(commands::inventory::VerifyArgs),

    /// Describe the inventory config options
    Options(commands::inventory::OptionsArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
