//! Host definition for the inventory sink.
//!
//! A `Host` is keyed by its peer label and carries the variables set during
//! materialization together with the groups it was added to.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// A host in the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Host label (inventory key)
    pub name: String,

    /// Host-specific variables
    #[serde(default)]
    pub vars: IndexMap<String, serde_json::Value>,

    /// Groups this host belongs to, excluding the implicit `all`
    #[serde(skip)]
    pub groups: IndexSet<String>,
}

impl Host {
    /// Create a new host with the given label
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: IndexMap::new(),
            groups: IndexSet::new(),
        }
    }

    /// Set a host variable, replacing any previous value
    pub fn set_var(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.vars.insert(key.into(), value);
    }

    /// Get a host variable
    pub fn get_var(&self, key: &str) -> Option<&serde_json::Value> {
        self.vars.get(key)
    }

    /// Check if a host variable is set
    pub fn has_var(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Record membership in a group
    pub fn add_to_group(&mut self, group: impl Into<String>) {
        self.groups.insert(group.into());
    }

    /// Check group membership
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Host variables as a JSON object
    pub fn vars_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_vars() {
        let mut host = Host::new("banana.netbird.cloud");
        host.set_var("os", json!("Alpine Linux 3.19.1"));
        host.set_var("connected", json!(true));

        assert!(host.has_var("os"));
        assert_eq!(host.get_var("connected"), Some(&json!(true)));
        assert_eq!(
            host.vars_json(),
            json!({"os": "Alpine Linux 3.19.1", "connected": true})
        );
    }

    #[test]
    fn test_host_groups() {
        let mut host = Host::new("apple");
        host.add_to_group("All");
        host.add_to_group("All");
        assert_eq!(host.groups.len(), 1);
        assert!(host.in_group("All"));
        assert!(!host.in_group("Development"));
    }
}
