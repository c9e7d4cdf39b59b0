//! Inventory management for netbird-inventory.
//!
//! This module provides:
//! - The error taxonomy shared by every stage of an inventory run
//! - The in-memory inventory sink (`Inventory`, `Host`, `Group`)
//! - The capability traits the plugin depends on (`InventoryTarget`, `CacheChannel`)
//! - The constructed-rules engine for composed groups, keyed groups and compose
//! - Rendering in the `--list`, `--host`, `--graph` and YAML shapes

pub mod cache;
pub mod constructed;
pub mod group;
pub mod host;
pub mod plugins;
pub mod target;

pub use cache::{cache_key, CacheChannel, JsonFileCache, MemoryCache};
pub use group::Group;
pub use host::Host;
pub use target::InventoryTarget;

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Errors that can occur during an inventory run.
///
/// Every variant is fatal for the run that raised it; nothing is retried.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },

    #[error("API endpoint not found (HTTP {status}): {body}")]
    NotFound { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed API response at peer #{position}: {message}")]
    MalformedResponse { position: usize, message: String },

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("failed to evaluate {rule} for host {host}: {message}")]
    StrictEvaluation {
        host: String,
        rule: String,
        message: String,
    },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("host not found: {0}")]
    HostNotFound(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Host variables as seen by expression rules
pub type HostVars = IndexMap<String, Value>;

/// The in-memory inventory sink holding all hosts and groups
#[derive(Debug, Clone)]
pub struct Inventory {
    /// All hosts indexed by label
    hosts: IndexMap<String, Host>,

    /// All groups indexed by name
    groups: IndexMap<String, Group>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    /// Create a new empty inventory with the implicit groups
    pub fn new() -> Self {
        let mut groups = IndexMap::new();
        groups.insert("all".to_string(), Group::all());
        groups.insert("ungrouped".to_string(), Group::ungrouped());

        Self {
            hosts: IndexMap::new(),
            groups,
        }
    }

    /// Whether `group` is reachable from `root` through child edges
    fn is_descendant(&self, root: &str, group: &str) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![root];

        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(node) = self.groups.get(current) else {
                continue;
            };
            for child in &node.children {
                if child == group {
                    return true;
                }
                pending.push(child.as_str());
            }
        }
        false
    }

    /// Get a host by label
    pub fn get_host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// Get a group by name
    pub fn get_group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Get all hosts
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Get all groups, implicit ones included
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Get all host labels
    pub fn host_names(&self) -> impl Iterator<Item = &String> {
        self.hosts.keys()
    }

    /// Get all group names
    pub fn group_names(&self) -> impl Iterator<Item = &String> {
        self.groups.keys()
    }

    /// Get the number of hosts
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Get the number of groups, implicit ones included
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Whether no host has been added
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    fn ensure_host(&mut self, label: &str) -> &mut Host {
        if !self.hosts.contains_key(label) {
            if let Some(all) = self.groups.get_mut("all") {
                all.add_host(label);
            }
            if let Some(ungrouped) = self.groups.get_mut("ungrouped") {
                ungrouped.add_host(label);
            }
        }
        self.hosts
            .entry(label.to_string())
            .or_insert_with(|| Host::new(label))
    }

    fn ensure_group(&mut self, name: &str) -> &mut Group {
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| Group::new(name))
    }

    /// Groups directly under `all`: every explicit group without a parent,
    /// with `ungrouped` first when it has members.
    fn top_level_groups(&self) -> Vec<&str> {
        let mut children = Vec::new();
        if self
            .groups
            .get("ungrouped")
            .map(|g| !g.hosts.is_empty())
            .unwrap_or(false)
        {
            children.push("ungrouped");
        }
        children.extend(
            self.groups
                .values()
                .filter(|g| !g.is_implicit() && g.parents.is_empty())
                .map(|g| g.name.as_str()),
        );
        children
    }

    fn children_of(&self, group: &Group) -> Vec<String> {
        if group.name == "all" {
            self.top_level_groups()
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            group.children.iter().cloned().collect()
        }
    }

    /// Render the inventory in the dynamic-inventory `--list` shape
    pub fn to_list_json(&self) -> Value {
        let mut result = Map::new();
        let mut hostvars = Map::new();

        for host in self.hosts.values() {
            hostvars.insert(host.name.clone(), host.vars_json());
        }
        result.insert("_meta".to_string(), json!({ "hostvars": hostvars }));

        result.insert(
            "all".to_string(),
            json!({ "children": self.top_level_groups() }),
        );

        for group in self.groups.values() {
            if group.name == "all" || (group.name == "ungrouped" && group.hosts.is_empty()) {
                continue;
            }

            let mut group_data = Map::new();
            if !group.hosts.is_empty() {
                group_data.insert("hosts".to_string(), json!(group.hosts));
            }
            if !group.children.is_empty() {
                group_data.insert("children".to_string(), json!(group.children));
            }
            if !group.vars.is_empty() {
                group_data.insert("vars".to_string(), json!(group.vars));
            }
            result.insert(group.name.clone(), Value::Object(group_data));
        }

        Value::Object(result)
    }

    /// Render one host's variables in the `--host` shape
    pub fn host_json(&self, label: &str) -> InventoryResult<Value> {
        self.hosts
            .get(label)
            .map(Host::vars_json)
            .ok_or_else(|| InventoryError::HostNotFound(label.to_string()))
    }

    /// Render the group tree in the `--graph` shape, starting at `root`
    pub fn to_graph(&self, root: Option<&str>) -> InventoryResult<String> {
        let root = root.unwrap_or("all");
        let group = self
            .groups
            .get(root)
            .ok_or_else(|| InventoryError::GroupNotFound(root.to_string()))?;

        let mut out = String::new();
        self.write_graph(group, 0, &mut out);
        Ok(out)
    }

    fn write_graph(&self, group: &Group, depth: usize, out: &mut String) {
        let indent = "  |".repeat(depth);
        if depth == 0 {
            out.push_str(&format!("@{}:\n", group.name));
        } else {
            out.push_str(&format!("{}--@{}:\n", indent, group.name));
        }

        for child in self.children_of(group) {
            if let Some(child_group) = self.groups.get(&child) {
                self.write_graph(child_group, depth + 1, out);
            }
        }

        if group.name != "all" {
            for host in &group.hosts {
                out.push_str(&format!("{}  |--{}\n", indent, host));
            }
        }
    }

    /// Render the inventory as a nested YAML document
    pub fn to_yaml(&self) -> InventoryResult<String> {
        let mut root = Map::new();
        if let Some(all) = self.groups.get("all") {
            root.insert("all".to_string(), self.yaml_group(all));
        }
        Ok(serde_yaml::to_string(&Value::Object(root))?)
    }

    fn yaml_group(&self, group: &Group) -> Value {
        let mut data = Map::new();

        if group.name != "all" && !group.hosts.is_empty() {
            let hosts: Map<String, Value> = group
                .hosts
                .iter()
                .map(|label| {
                    let vars = self
                        .hosts
                        .get(label)
                        .map(Host::vars_json)
                        .unwrap_or_else(|| json!({}));
                    (label.clone(), vars)
                })
                .collect();
            data.insert("hosts".to_string(), Value::Object(hosts));
        }

        let children: Map<String, Value> = self
            .children_of(group)
            .into_iter()
            .filter_map(|name| {
                self.groups
                    .get(&name)
                    .map(|child| (name.clone(), self.yaml_group(child)))
            })
            .collect();
        if !children.is_empty() {
            data.insert("children".to_string(), Value::Object(children));
        }

        if !group.vars.is_empty() {
            data.insert("vars".to_string(), json!(group.vars));
        }

        Value::Object(data)
    }
}

impl InventoryTarget for Inventory {
    fn add_group(&mut self, name: &str) -> InventoryResult<()> {
        if name.trim().is_empty() {
            return Err(InventoryError::Configuration(
                "group name must not be empty".to_string(),
            ));
        }
        self.ensure_group(name);
        Ok(())
    }

    fn add_child_group(&mut self, parent: &str, child: &str) -> InventoryResult<()> {
        if parent == child {
            return Err(InventoryError::Configuration(format!(
                "group {} cannot be its own parent",
                parent
            )));
        }
        if self.is_descendant(child, parent) {
            return Err(InventoryError::Configuration(format!(
                "adding group {} to group {} creates a dependency loop",
                child, parent
            )));
        }
        self.ensure_group(child).add_parent(parent);
        self.ensure_group(parent).add_child(child);
        Ok(())
    }

    fn add_host(&mut self, label: &str) -> InventoryResult<()> {
        if label.trim().is_empty() {
            return Err(InventoryError::Configuration(
                "host label must not be empty".to_string(),
            ));
        }
        self.ensure_host(label);
        Ok(())
    }

    fn add_host_to_group(&mut self, label: &str, group: &str) -> InventoryResult<()> {
        if !self.groups.contains_key(group) {
            return Err(InventoryError::GroupNotFound(group.to_string()));
        }
        self.add_host(label)?;

        if group != "all" && group != "ungrouped" {
            if let Some(ungrouped) = self.groups.get_mut("ungrouped") {
                ungrouped.remove_host(label);
            }
            if let Some(host) = self.hosts.get_mut(label) {
                host.add_to_group(group);
            }
        }
        if let Some(g) = self.groups.get_mut(group) {
            g.add_host(label);
        }
        Ok(())
    }

    fn set_variable(&mut self, label: &str, key: &str, value: Value) -> InventoryResult<()> {
        self.add_host(label)?;
        self.ensure_host(label).set_var(key, value);
        Ok(())
    }

    fn host_vars(&self, label: &str) -> Option<HostVars> {
        self.hosts.get(label).map(|host| host.vars.clone())
    }
}
