//! Dynamic inventory plugins
//!
//! A plugin reads a config file, gathers hosts from an external source and
//! writes them into an [`InventoryTarget`].
//!
//! # Available Plugins
//!
//! - [`netbird`]: peers of a NetBird mesh network
//!
//! # Configuration
//!
//! ```yaml
//! plugin: dominion_solutions.netbird
//! api_url: https://api.netbird.io/api
//! api_key: "{{ lookup('env', 'NETBIRD_TOKEN') }}"
//! include_disconnected: false
//! netbird_groups:
//!   - Development
//! keyed_groups:
//!   - key: os
//!     prefix: os
//! compose:
//!   ansible_host: ip
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use netbird_inventory::inventory::plugins::{DynamicInventoryPlugin, NetbirdPlugin};
//! use netbird_inventory::inventory::Inventory;
//!
//! let plugin = NetbirdPlugin::new();
//! let mut inventory = Inventory::new();
//! plugin.parse(&mut inventory, Path::new("prod.netbird.yml"), true)?;
//! ```

pub mod config;
pub mod netbird;

pub use config::{
    resolve_credentials, verify_file, ConfigSource, Credentials, IpStyle, NetbirdConfig,
    PluginConfigError, PluginConfigResult, TemplatedConfigSource,
};
pub use netbird::NetbirdPlugin;

use super::{InventoryResult, InventoryTarget};
use std::fmt;
use std::path::Path;

/// Common trait for dynamic inventory plugins
pub trait DynamicInventoryPlugin: fmt::Debug {
    /// Get the plugin name
    fn name(&self) -> &str;

    /// Get the plugin version
    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    /// Get the plugin description
    fn description(&self) -> &str;

    /// Whether `path` is a config file this plugin handles
    fn verify_file(&self, path: &Path) -> bool;

    /// Populate `target` from the config file at `path`.
    /// With `cache` false the cache is bypassed and rewritten.
    fn parse(
        &self,
        target: &mut dyn InventoryTarget,
        path: &Path,
        cache: bool,
    ) -> InventoryResult<RunSummary>;

    /// Get plugin-specific options documentation
    fn options_documentation(&self) -> Vec<PluginOption>;
}

/// How the cache took part in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Caching is off in the config
    Disabled,
    /// Peers came from the cache
    Hit,
    /// Nothing usable was cached; live peers were stored
    Miss,
    /// Cache read was skipped on request; live peers were stored
    Refreshed,
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheOutcome::Disabled => write!(f, "disabled"),
            CacheOutcome::Hit => write!(f, "hit"),
            CacheOutcome::Miss => write!(f, "miss"),
            CacheOutcome::Refreshed => write!(f, "refreshed"),
        }
    }
}

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub cache: CacheOutcome,
    /// Peers before filtering
    pub peers: usize,
    /// Hosts written to the inventory
    pub hosts: usize,
}

/// Documentation for a plugin option
#[derive(Debug, Clone)]
pub struct PluginOption {
    /// Option name
    pub name: String,
    /// Option description
    pub description: String,
    /// Whether the option is required
    pub required: bool,
    /// Default value (if any)
    pub default: Option<String>,
    /// Option type (string, bool, list, dict)
    pub option_type: PluginOptionType,
    /// Environment variable alternative
    pub env_var: Option<String>,
    /// Accepted values, when restricted
    pub choices: Vec<String>,
}

impl PluginOption {
    fn new(name: &str, description: &str, option_type: PluginOptionType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
            default: None,
            option_type,
            env_var: None,
            choices: Vec::new(),
        }
    }

    /// Create a new required string option
    pub fn required_string(name: &str, description: &str) -> Self {
        Self {
            required: true,
            ..Self::new(name, description, PluginOptionType::String)
        }
    }

    /// Create a new optional string option with default
    pub fn optional_string(name: &str, description: &str, default: &str) -> Self {
        Self {
            default: Some(default.to_string()),
            ..Self::new(name, description, PluginOptionType::String)
        }
    }

    /// Create a new optional boolean option
    pub fn optional_bool(name: &str, description: &str, default: bool) -> Self {
        Self {
            default: Some(default.to_string()),
            ..Self::new(name, description, PluginOptionType::Bool)
        }
    }

    /// Create a new optional integer option
    pub fn optional_int(name: &str, description: &str, default: u64) -> Self {
        Self {
            default: Some(default.to_string()),
            ..Self::new(name, description, PluginOptionType::Int)
        }
    }

    /// Create a new optional list option
    pub fn optional_list(name: &str, description: &str) -> Self {
        Self::new(name, description, PluginOptionType::List)
    }

    /// Create a new optional dict option
    pub fn optional_dict(name: &str, description: &str) -> Self {
        Self::new(name, description, PluginOptionType::Dict)
    }

    /// Set environment variable alternative
    pub fn with_env_var(mut self, env_var: &str) -> Self {
        self.env_var = Some(env_var.to_string());
        self
    }

    /// Restrict the accepted values
    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Type of plugin option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOptionType {
    /// String value
    String,
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// List of values
    List,
    /// Dictionary/map of values
    Dict,
}

impl fmt::Display for PluginOptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginOptionType::String => write!(f, "string"),
            PluginOptionType::Bool => write!(f, "bool"),
            PluginOptionType::Int => write!(f, "int"),
            PluginOptionType::List => write!(f, "list"),
            PluginOptionType::Dict => write!(f, "dict"),
        }
    }
}
