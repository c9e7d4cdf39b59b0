//! Peers to inventory groups, hosts and variables.
//!
//! Runs in a fixed order, each step relying on the previous ones:
//! 1. create one group per distinct NetBird group name
//! 2. add every peer to its groups
//! 3. set host variables from the raw peer fields
//! 4. apply composed groups, keyed groups and compose per peer
//!
//! Nothing is rolled back when a step fails.

use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Value};
use tracing::{debug, info, Span};

use super::peer::Peer;
use crate::inventory::constructed::KeyedGroups;
use crate::inventory::plugins::config::{IpStyle, NetbirdConfig};
use crate::inventory::{InventoryError, InventoryResult, InventoryTarget};

/// Raw fields replaced by the classification lists under `ip_style: api`
const PLAIN_ADDRESS_FIELDS: &[&str] = &["ip", "ipv6"];

/// Variable and rule settings for one run
#[derive(Debug, Clone, Default)]
pub struct MaterializeRules {
    pub ip_style: IpStyle,
    pub strict: bool,
    pub composed_groups: IndexMap<String, String>,
    pub keyed_groups: KeyedGroups,
    pub compose: IndexMap<String, String>,
}

impl MaterializeRules {
    pub fn from_config(config: &NetbirdConfig) -> Self {
        Self {
            ip_style: config.ip_style,
            strict: config.strict,
            composed_groups: config.composed_groups(),
            keyed_groups: config.keyed_group_rules(),
            compose: config.compose.clone(),
        }
    }
}

/// Materialize `peers` into `target`
pub fn materialize<T: InventoryTarget + ?Sized>(
    target: &mut T,
    peers: &[&Peer],
    rules: &MaterializeRules,
    span: &Span,
) -> InventoryResult<()> {
    add_groups(target, peers, span)?;
    add_peers_to_groups(target, peers)?;
    add_host_vars(target, peers, rules.ip_style)?;
    apply_constructed(target, peers, rules, span)?;

    info!(parent: span, hosts = peers.len(), "inventory populated");
    Ok(())
}

fn add_groups<T: InventoryTarget + ?Sized>(
    target: &mut T,
    peers: &[&Peer],
    span: &Span,
) -> InventoryResult<()> {
    let names: IndexSet<&str> = peers.iter().flat_map(|peer| peer.group_names()).collect();
    for name in &names {
        target.add_group(name)?;
    }
    debug!(parent: span, groups = names.len(), "created groups");
    Ok(())
}

fn add_peers_to_groups<T: InventoryTarget + ?Sized>(
    target: &mut T,
    peers: &[&Peer],
) -> InventoryResult<()> {
    for peer in peers {
        target.add_host(&peer.label)?;
        for group in peer.group_names() {
            target.add_host_to_group(&peer.label, group)?;
        }
    }
    Ok(())
}

fn add_host_vars<T: InventoryTarget + ?Sized>(
    target: &mut T,
    peers: &[&Peer],
    ip_style: IpStyle,
) -> InventoryResult<()> {
    for peer in peers {
        match ip_style {
            IpStyle::Plain => {
                for (key, value) in peer.raw_fields() {
                    target.set_variable(&peer.label, key, value.clone())?;
                }
            }
            IpStyle::Api => {
                if peer.ips.is_empty() {
                    return Err(InventoryError::UnsupportedConfiguration(format!(
                        "ip_style=api needs at least one parseable address for peer {}",
                        peer.label
                    )));
                }
                for (key, value) in peer.raw_fields() {
                    if !PLAIN_ADDRESS_FIELDS.contains(&key.as_str()) {
                        target.set_variable(&peer.label, key, value.clone())?;
                    }
                }
                for (key, addresses) in peer.ips.variables() {
                    target.set_variable(&peer.label, key, address_list(addresses))?;
                }
            }
        }
    }
    Ok(())
}

fn apply_constructed<T: InventoryTarget + ?Sized>(
    target: &mut T,
    peers: &[&Peer],
    rules: &MaterializeRules,
    span: &Span,
) -> InventoryResult<()> {
    for peer in peers {
        let vars = target
            .host_vars(&peer.label)
            .ok_or_else(|| InventoryError::HostNotFound(peer.label.clone()))?;

        span.in_scope(|| {
            target.add_host_to_composed_groups(
                &rules.composed_groups,
                &vars,
                &peer.label,
                rules.strict,
            )?;
            target.add_host_to_keyed_groups(&rules.keyed_groups, &vars, &peer.label, rules.strict)?;
            target.set_composite_vars(&rules.compose, &vars, &peer.label, rules.strict)
        })?;
    }
    Ok(())
}

/// Host variable value for a classification list
pub fn address_list(addresses: &[String]) -> Value {
    json!(addresses)
}
