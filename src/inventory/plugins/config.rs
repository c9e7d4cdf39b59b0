//! Plugin configuration for the NetBird inventory source
//!
//! Configuration is loaded from a YAML file whose name ends in `netbird.yml`
//! or `netbird.yaml`. String options may be templates; they are rendered by a
//! [`ConfigSource`] before use.

use indexmap::IndexMap;
use minijinja::{Environment, ErrorKind};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::inventory::constructed::{KeyedGroup, KeyedGroups};
use crate::inventory::{InventoryError, InventoryResult};

/// Names the `plugin` option accepts
pub const PLUGIN_NAMES: &[&str] = &["netbird", "dominion_solutions.netbird"];

/// File name endings recognised as NetBird inventory configs
pub const CONFIG_SUFFIXES: &[&str] = &["netbird.yml", "netbird.yaml"];

/// Environment variable holding the API token
pub const API_KEY_ENV: &str = "NETBIRD_API_KEY";

/// Environment variable holding the API base URL
pub const API_URL_ENV: &str = "NETBIRD_API_URL";

/// Errors that can occur when loading plugin configuration
#[derive(Debug, Error)]
pub enum PluginConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<PluginConfigError> for InventoryError {
    fn from(err: PluginConfigError) -> Self {
        InventoryError::Configuration(err.to_string())
    }
}

/// Result type for plugin configuration operations
pub type PluginConfigResult<T> = Result<T, PluginConfigError>;

/// How peer IP addresses are exposed as host variables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpStyle {
    /// Raw `ip`/`ipv6` fields as returned by the API
    #[default]
    Plain,
    /// Addresses grouped into classification lists
    Api,
}

/// Cache store selected by `cache_plugin`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    JsonFile,
    Memory,
}

/// The `groups` option: either a group allowlist or composed group rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupsOption {
    Allowlist(Vec<String>),
    Composed(#[serde(deserialize_with = "expression_map")] IndexMap<String, String>),
}

impl Default for GroupsOption {
    fn default() -> Self {
        GroupsOption::Composed(IndexMap::new())
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_plugin() -> String {
    "jsonfile".to_string()
}

fn default_cache_prefix() -> String {
    "ANSIBLE_".to_string()
}

fn default_cache_timeout() -> u64 {
    3600
}

fn default_timeout() -> u64 {
    30
}

/// Scalar-valued YAML map to expression strings
fn expression_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: IndexMap<String, serde_yaml::Value> = IndexMap::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(name, value)| {
            let expr = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "expression for '{}' must be a scalar, got {:?}",
                        name, other
                    )))
                }
            };
            Ok((name, expr))
        })
        .collect()
}

/// `compose` accepts a boolean (no rules) or a map of expressions
fn compose_rules<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ComposeOption {
        Flag(bool),
        Rules(#[serde(deserialize_with = "expression_map")] IndexMap<String, String>),
    }

    Ok(match ComposeOption::deserialize(deserializer)? {
        ComposeOption::Flag(_) => IndexMap::new(),
        ComposeOption::Rules(rules) => rules,
    })
}

/// NetBird inventory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetbirdConfig {
    /// Plugin name, `netbird` or `dominion_solutions.netbird`
    pub plugin: String,

    /// API token, falls back to `NETBIRD_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL, falls back to `NETBIRD_API_URL`
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default = "default_true")]
    pub cache: bool,

    #[serde(default = "default_cache_plugin")]
    pub cache_plugin: String,

    /// Cache directory for the `jsonfile` backend
    #[serde(default)]
    pub cache_connection: Option<String>,

    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Cache entry lifetime in seconds, 0 = never expire
    #[serde(default = "default_cache_timeout")]
    pub cache_timeout: u64,

    #[serde(default)]
    pub ip_style: IpStyle,

    #[serde(default)]
    pub include_disconnected: Option<bool>,

    /// Legacy inverse of `include_disconnected`
    #[serde(default)]
    pub netbird_connected: Option<bool>,

    /// Only include peers in at least one of these groups
    #[serde(default)]
    pub netbird_groups: Vec<String>,

    #[serde(default)]
    pub strict: bool,

    #[serde(default, deserialize_with = "compose_rules")]
    pub compose: IndexMap<String, String>,

    #[serde(default)]
    pub groups: GroupsOption,

    #[serde(default)]
    pub keyed_groups: Vec<KeyedGroup>,

    #[serde(default = "default_true")]
    pub leading_separator: bool,

    /// API connect and read timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl NetbirdConfig {
    /// Create a configuration with every option at its default
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            api_key: None,
            api_url: None,
            cache: true,
            cache_plugin: default_cache_plugin(),
            cache_connection: None,
            cache_prefix: default_cache_prefix(),
            cache_timeout: default_cache_timeout(),
            ip_style: IpStyle::default(),
            include_disconnected: None,
            netbird_connected: None,
            netbird_groups: Vec::new(),
            strict: false,
            compose: IndexMap::new(),
            groups: GroupsOption::default(),
            keyed_groups: Vec::new(),
            leading_separator: true,
            timeout: default_timeout(),
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> PluginConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> PluginConfigResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> PluginConfigResult<()> {
        if self.plugin.is_empty() {
            return Err(PluginConfigError::MissingField("plugin".to_string()));
        }
        if !PLUGIN_NAMES.contains(&self.plugin.as_str()) {
            return Err(PluginConfigError::Invalid(format!(
                "plugin '{}' is not one of {}",
                self.plugin,
                PLUGIN_NAMES.join(", ")
            )));
        }

        if let (Some(include), Some(connected)) = (self.include_disconnected, self.netbird_connected)
        {
            if include == connected {
                return Err(PluginConfigError::Invalid(format!(
                    "include_disconnected={} contradicts netbird_connected={}",
                    include, connected
                )));
            }
        }

        if let GroupsOption::Allowlist(groups) = &self.groups {
            if !groups.is_empty() && !self.netbird_groups.is_empty() {
                return Err(PluginConfigError::Invalid(
                    "set the group allowlist with either netbird_groups or groups, not both"
                        .to_string(),
                ));
            }
        }

        for rule in &self.keyed_groups {
            rule.validate()
                .map_err(|e| PluginConfigError::Invalid(e.to_string()))?;
        }

        if self.timeout == 0 {
            return Err(PluginConfigError::Invalid(
                "timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether disconnected peers are kept
    pub fn include_disconnected(&self) -> bool {
        if self.include_disconnected.is_none() && self.netbird_connected.is_some() {
            warn!("netbird_connected is deprecated, use include_disconnected");
        }
        self.include_disconnected
            .or(self.netbird_connected.map(|connected| !connected))
            .unwrap_or(false)
    }

    /// Group allowlist from `netbird_groups` or a list-valued `groups`
    pub fn group_allowlist(&self) -> Vec<String> {
        match &self.groups {
            GroupsOption::Allowlist(groups) if self.netbird_groups.is_empty() => groups.clone(),
            _ => self.netbird_groups.clone(),
        }
    }

    /// Composed group rules from a map-valued `groups`
    pub fn composed_groups(&self) -> IndexMap<String, String> {
        match &self.groups {
            GroupsOption::Composed(rules) => rules.clone(),
            GroupsOption::Allowlist(_) => IndexMap::new(),
        }
    }

    /// Keyed group rules with the shared separator option applied
    pub fn keyed_group_rules(&self) -> KeyedGroups {
        KeyedGroups::new(self.keyed_groups.clone()).with_leading_separator(self.leading_separator)
    }

    /// Cache store selected by `cache_plugin`
    pub fn cache_backend(&self) -> InventoryResult<CacheBackend> {
        match self.cache_plugin.as_str() {
            "jsonfile" | "ansible.builtin.jsonfile" => Ok(CacheBackend::JsonFile),
            "memory" | "ansible.builtin.memory" => Ok(CacheBackend::Memory),
            "yaml" | "redis" | "together" | "community.general.yaml"
            | "community.general.redis" => Err(InventoryError::UnsupportedConfiguration(format!(
                "cache_plugin '{}' is not available",
                self.cache_plugin
            ))),
            other => Err(InventoryError::Configuration(format!(
                "unknown cache_plugin '{}'",
                other
            ))),
        }
    }
}

/// Whether `path` names an existing NetBird inventory config file
pub fn verify_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.is_file() && CONFIG_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Whether a string contains template markup
pub fn has_template(value: &str) -> bool {
    value.contains("{{") || value.contains("{%") || value.contains("{#")
}

// ============================================================================
// Config Source
// ============================================================================

/// Reads plugin options and resolves templated values
pub trait ConfigSource {
    /// Load and validate the config file at `path`
    fn read_config(&self, path: &Path) -> InventoryResult<NetbirdConfig>;

    /// Whether a value needs templating
    fn is_template(&self, value: &str) -> bool {
        has_template(value)
    }

    /// Render a templated value
    fn template(&self, value: &str) -> InventoryResult<String>;
}

/// Config source rendering templates with minijinja
///
/// Templates can read the environment with `lookup('env', 'NAME')` or
/// `env('NAME')`; an unset variable renders as an empty string.
pub struct TemplatedConfigSource {
    env: Environment<'static>,
}

impl std::fmt::Debug for TemplatedConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplatedConfigSource").finish_non_exhaustive()
    }
}

impl Default for TemplatedConfigSource {
    fn default() -> Self {
        Self::new()
    }
}

fn env_var(name: String) -> String {
    std::env::var(name).unwrap_or_default()
}

fn lookup(kind: String, name: String) -> Result<String, minijinja::Error> {
    match kind.as_str() {
        "env" => Ok(env_var(name)),
        other => Err(minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("lookup plugin '{}' is not supported", other),
        )),
    }
}

impl TemplatedConfigSource {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_function("lookup", lookup);
        env.add_function("env", env_var);
        Self { env }
    }
}

impl ConfigSource for TemplatedConfigSource {
    fn read_config(&self, path: &Path) -> InventoryResult<NetbirdConfig> {
        NetbirdConfig::from_file(path).map_err(|e| {
            InventoryError::Configuration(format!("{}: {}", path.display(), e))
        })
    }

    fn template(&self, value: &str) -> InventoryResult<String> {
        self.env
            .render_str(value, minijinja::context! {})
            .map_err(|e| InventoryError::Configuration(format!("template error: {}", e)))
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Resolved API credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

fn render(source: &dyn ConfigSource, raw: &str) -> InventoryResult<String> {
    let rendered = if source.is_template(raw) {
        source.template(raw)?
    } else {
        raw.to_string()
    };
    Ok(rendered.trim().to_string())
}

/// The config value after templating, else the environment variable
fn resolve_option(
    source: &dyn ConfigSource,
    value: Option<&str>,
    env_name: &str,
    description: &str,
) -> InventoryResult<String> {
    let mut resolved = match value {
        Some(v) => render(source, v)?,
        None => String::new(),
    };
    if resolved.is_empty() {
        if let Ok(fallback) = std::env::var(env_name) {
            resolved = render(source, &fallback)?;
        }
    }

    if resolved.is_empty() {
        return Err(InventoryError::Configuration(format!(
            "Could not retrieve the Netbird {} from the configuration sources.",
            description
        )));
    }
    Ok(resolved)
}

/// Resolve `api_key` and `api_url` from the config, templates and environment
pub fn resolve_credentials(
    source: &dyn ConfigSource,
    config: &NetbirdConfig,
) -> InventoryResult<Credentials> {
    let api_key = resolve_option(source, config.api_key.as_deref(), API_KEY_ENV, "API Key")?;
    let api_url = resolve_option(source, config.api_url.as_deref(), API_URL_ENV, "API URL")?;

    let api_url = api_url.trim_end_matches('/').to_string();
    url::Url::parse(&api_url).map_err(|e| {
        InventoryError::Configuration(format!("invalid api_url '{}': {}", api_url, e))
    })?;

    Ok(Credentials { api_key, api_url })
}
