//! Subcommands module for the netbird-inventory CLI

pub mod inventory;

use crate::cli::output::OutputFormatter;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Common context shared between commands
pub struct CommandContext {
    /// Output formatter
    pub output: OutputFormatter,
    /// Inventory config path
    pub inventory_path: Option<PathBuf>,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli) -> Self {
        Self {
            output: OutputFormatter::new(!cli.no_color, cli.verbosity()),
            inventory_path: cli.inventory.clone(),
            verbosity: cli.verbosity(),
        }
    }

    /// The inventory config path, required by most commands
    pub fn inventory(&self) -> Result<&Path> {
        self.inventory_path.as_deref().ok_or_else(|| {
            anyhow!("No inventory config given; pass -i <file> or set NETBIRD_INVENTORY")
        })
    }
}

/// Trait for runnable commands
pub trait Runnable {
    /// Execute the command and return the process exit code
    fn run(&self, ctx: &CommandContext) -> Result<i32>;
}
