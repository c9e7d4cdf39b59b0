//! The inventory sink interface.
//!
//! `InventoryTarget` is the only way the plugin writes to an inventory. The
//! rule-based operations have provided implementations on top of the
//! primitive ones, so a sink only needs to implement the primitives.

use indexmap::IndexMap;
use serde_json::Value;

use super::constructed::{self, KeyedGroups};
use super::{HostVars, InventoryResult};

/// Commands the plugin issues against an inventory
pub trait InventoryTarget {
    /// Create a group; creating an existing group is a no-op
    fn add_group(&mut self, name: &str) -> InventoryResult<()>;

    /// Make `child` a child group of `parent`, creating either if needed
    fn add_child_group(&mut self, parent: &str, child: &str) -> InventoryResult<()>;

    /// Create a host; creating an existing host is a no-op
    fn add_host(&mut self, label: &str) -> InventoryResult<()>;

    /// Add a host to an existing group
    fn add_host_to_group(&mut self, label: &str, group: &str) -> InventoryResult<()>;

    /// Set a host variable
    fn set_variable(&mut self, label: &str, key: &str, value: Value) -> InventoryResult<()>;

    /// Variables currently set on a host
    fn host_vars(&self, label: &str) -> Option<HostVars>;

    /// Add a host to every composed group whose conditional holds
    fn add_host_to_composed_groups(
        &mut self,
        rules: &IndexMap<String, String>,
        vars: &HostVars,
        label: &str,
        strict: bool,
    ) -> InventoryResult<()> {
        constructed::add_host_to_composed_groups(self, rules, vars, label, strict)
    }

    /// Add a host to the groups derived from keyed group rules
    fn add_host_to_keyed_groups(
        &mut self,
        rules: &KeyedGroups,
        vars: &HostVars,
        label: &str,
        strict: bool,
    ) -> InventoryResult<()> {
        constructed::add_host_to_keyed_groups(self, rules, vars, label, strict)
    }

    /// Set host variables from compose expressions
    fn set_composite_vars(
        &mut self,
        rules: &IndexMap<String, String>,
        vars: &HostVars,
        label: &str,
        strict: bool,
    ) -> InventoryResult<()> {
        constructed::set_composite_vars(self, rules, vars, label, strict)
    }
}
