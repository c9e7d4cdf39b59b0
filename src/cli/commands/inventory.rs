//! Inventory commands
//!
//! This module implements the `list`, `host`, `graph`, `verify` and
//! `options` subcommands.

use super::{CommandContext, Runnable};
use crate::cli::OutputFormat;
use anyhow::{bail, Context, Result};
use clap::Parser;
use netbird_inventory::inventory::plugins::{DynamicInventoryPlugin, NetbirdConfig, NetbirdPlugin};
use netbird_inventory::inventory::{Inventory, InventoryError};

/// Arguments for the list command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Ignore cached peers and refresh the cache
    #[arg(long)]
    pub refresh_cache: bool,

    /// Output as YAML (same as --output yaml)
    #[arg(long)]
    pub yaml: bool,

    /// Output format
    #[arg(long, value_enum)]
    pub output: Option<OutputFormat>,
}

impl ListArgs {
    /// Effective output format
    pub fn format(&self) -> OutputFormat {
        match (self.yaml, self.output) {
            (true, _) => OutputFormat::Yaml,
            (false, format) => format.unwrap_or_default(),
        }
    }
}

/// Arguments for the host command
#[derive(Parser, Debug, Clone)]
pub struct HostArgs {
    /// Host label, the peer's DNS label
    pub label: String,

    /// Ignore cached peers and refresh the cache
    #[arg(long)]
    pub refresh_cache: bool,
}

/// Arguments for the graph command
#[derive(Parser, Debug, Clone)]
pub struct GraphArgs {
    /// Group to start from
    pub group: Option<String>,

    /// Ignore cached peers and refresh the cache
    #[arg(long)]
    pub refresh_cache: bool,
}

/// Arguments for the verify command
#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {}

/// Arguments for the options command
#[derive(Parser, Debug, Clone)]
pub struct OptionsArgs {}

/// Run the plugin against the config from `-i`
fn load_inventory(ctx: &CommandContext, refresh: bool) -> Result<Inventory> {
    let path = ctx.inventory()?;
    let plugin = NetbirdPlugin::new();

    if !plugin.verify_file(path) {
        bail!(
            "{} is not a NetBird inventory config (expected an existing file ending in netbird.yml or netbird.yaml)",
            path.display()
        );
    }

    let mut inventory = Inventory::new();
    let summary = plugin
        .parse(&mut inventory, path, !refresh)
        .with_context(|| format!("Failed to build inventory from {}", path.display()))?;

    ctx.output.info(&format!(
        "{} of {} peers added to the inventory (cache: {})",
        summary.hosts, summary.peers, summary.cache
    ));
    Ok(inventory)
}

impl Runnable for ListArgs {
    fn run(&self, ctx: &CommandContext) -> Result<i32> {
        let inventory = load_inventory(ctx, self.refresh_cache)?;

        let document = match self.format() {
            OutputFormat::Json => serde_json::to_string_pretty(&inventory.to_list_json())?,
            OutputFormat::Yaml => inventory.to_yaml()?,
        };
        ctx.output.document(&document);
        Ok(0)
    }
}

impl Runnable for HostArgs {
    fn run(&self, ctx: &CommandContext) -> Result<i32> {
        let inventory = load_inventory(ctx, self.refresh_cache)?;

        match inventory.host_json(&self.label) {
            Ok(vars) => {
                ctx.output.document(&serde_json::to_string_pretty(&vars)?);
                Ok(0)
            }
            Err(e @ InventoryError::HostNotFound(_)) => {
                ctx.output.error(&e.to_string());
                Ok(1)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Runnable for GraphArgs {
    fn run(&self, ctx: &CommandContext) -> Result<i32> {
        let inventory = load_inventory(ctx, self.refresh_cache)?;

        match inventory.to_graph(self.group.as_deref()) {
            Ok(graph) => {
                ctx.output.document(&graph);
                Ok(0)
            }
            Err(e @ InventoryError::GroupNotFound(_)) => {
                ctx.output.error(&e.to_string());
                Ok(1)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Runnable for VerifyArgs {
    fn run(&self, ctx: &CommandContext) -> Result<i32> {
        let path = ctx.inventory()?;
        let plugin = NetbirdPlugin::new();

        if !plugin.verify_file(path) {
            ctx.output.error(&format!(
                "{} is not a NetBird inventory config",
                path.display()
            ));
            return Ok(1);
        }

        match NetbirdConfig::from_file(path) {
            Ok(config) => {
                ctx.output.success(&format!(
                    "{} is a valid NetBird inventory config (plugin: {})",
                    path.display(),
                    config.plugin
                ));
                if config.netbird_connected.is_some() && config.include_disconnected.is_none() {
                    ctx.output
                        .warning("netbird_connected is deprecated, use include_disconnected");
                }
                Ok(0)
            }
            Err(e) => {
                ctx.output
                    .error(&format!("{}: {}", path.display(), e));
                Ok(1)
            }
        }
    }
}

impl Runnable for OptionsArgs {
    fn run(&self, ctx: &CommandContext) -> Result<i32> {
        let plugin = NetbirdPlugin::new();
        ctx.output.info(&format!(
            "{} {}: {}",
            plugin.name(),
            plugin.version(),
            plugin.description()
        ));

        let rows: Vec<Vec<String>> = plugin
            .options_documentation()
            .into_iter()
            .map(|option| {
                let mut description = option.description;
                if !option.choices.is_empty() {
                    description.push_str(&format!(" (choices: {})", option.choices.join(", ")));
                }
                vec![
                    option.name,
                    option.option_type.to_string(),
                    if option.required { "yes" } else { "no" }.to_string(),
                    option.default.unwrap_or_default(),
                    option.env_var.unwrap_or_default(),
                    description,
                ]
            })
            .collect();

        ctx.output.table(
            &["option", "type", "required", "default", "env", "description"],
            &rows,
        );
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_format() {
        let args = ListArgs {
            refresh_cache: false,
            yaml: false,
            output: None,
        };
        assert_eq!(args.format(), OutputFormat::Json);

        let args = ListArgs {
            yaml: true,
            output: Some(OutputFormat::Json),
            ..args
        };
        assert_eq!(args.format(), OutputFormat::Yaml);
    }
}
