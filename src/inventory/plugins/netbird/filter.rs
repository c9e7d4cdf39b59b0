//! Peer filtering
//!
//! Two predicates, combined with AND:
//! - connectivity: unless `include_disconnected` is set, only connected peers pass
//! - groups: with a non-empty allowlist, a peer passes if any of its group
//!   names is on the list (exact, case-sensitive match)
//!
//! Filtering only narrows the set and keeps the input order.

use tracing::{debug, info, Span};

use super::peer::Peer;
use crate::inventory::plugins::config::{IpStyle, NetbirdConfig};

/// Filter settings for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    pub include_disconnected: bool,
    pub group_allowlist: Vec<String>,
    pub ip_style: IpStyle,
}

impl FilterConfig {
    pub fn from_config(config: &NetbirdConfig) -> Self {
        Self {
            include_disconnected: config.include_disconnected(),
            group_allowlist: config.group_allowlist(),
            ip_style: config.ip_style,
        }
    }

    pub fn include_disconnected(mut self, include: bool) -> Self {
        self.include_disconnected = include;
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.group_allowlist = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// Connectivity predicate
pub fn passes_connectivity(peer: &Peer, config: &FilterConfig) -> bool {
    config.include_disconnected || peer.connected
}

/// Group allowlist predicate
pub fn passes_groups(peer: &Peer, config: &FilterConfig) -> bool {
    config.group_allowlist.is_empty()
        || peer
            .group_names()
            .any(|name| config.group_allowlist.iter().any(|allowed| allowed == name))
}

/// Keep the peers that pass both predicates, in input order
pub fn apply<'a>(peers: &'a [Peer], config: &FilterConfig, span: &Span) -> Vec<&'a Peer> {
    let kept: Vec<&Peer> = peers
        .iter()
        .filter(|peer| {
            if !passes_connectivity(peer, config) {
                debug!(parent: span, peer = %peer.label, "dropping disconnected peer");
                return false;
            }
            if !passes_groups(peer, config) {
                debug!(parent: span, peer = %peer.label, "dropping peer outside group allowlist");
                return false;
            }
            true
        })
        .collect();

    info!(parent: span, total = peers.len(), kept = kept.len(), "filtered peers");
    kept
}
