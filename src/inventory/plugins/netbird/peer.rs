//! Peer records
//!
//! A [`Peer`] is built from one element of the `/peers` response, either
//! straight from the API or from a cached copy of it. Both paths go through
//! the same extraction so they yield identical records.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::inventory::{InventoryError, InventoryResult};

/// Raw fields that carry peer addresses, in classification order
pub const ADDRESS_FIELDS: &[&str] = &["ip", "ipv6", "connection_ip"];

/// A group the peer belongs to, as reported by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
    pub peers_count: Option<u64>,
}

/// Peer addresses grouped by classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IpBreakdown {
    pub ipv4_public: Vec<String>,
    pub ipv4_private: Vec<String>,
    /// 100.64.0.0/10, the range NetBird assigns overlay addresses from
    pub ipv4_shared: Vec<String>,
    pub ipv6_global: Vec<String>,
    pub ipv6_link_local: Vec<String>,
    /// fc00::/7, the range NetBird assigns IPv6 overlay addresses from
    pub ipv6_unique_local: Vec<String>,
}

fn parse_address(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    let without_prefix = raw.split('/').next().unwrap_or(raw);
    without_prefix
        .parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
}

fn is_shared_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 100 && (b & 0xc0) == 64
}

fn is_link_local_v6(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

fn is_unique_local_v6(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

impl IpBreakdown {
    /// Classify addresses; unparseable, unspecified and loopback v6 entries are ignored
    pub fn from_addresses<'a>(addresses: impl IntoIterator<Item = &'a str>) -> Self {
        let mut breakdown = Self::default();
        let mut seen = Vec::new();

        for raw in addresses {
            let Some(ip) = parse_address(raw) else {
                continue;
            };
            if seen.contains(&ip) {
                continue;
            }
            seen.push(ip);

            let text = ip.to_string();
            match ip {
                IpAddr::V4(v4) if v4.is_unspecified() => {}
                IpAddr::V4(v4) if is_shared_v4(&v4) => breakdown.ipv4_shared.push(text),
                IpAddr::V4(v4) if v4.is_private() || v4.is_loopback() || v4.is_link_local() => {
                    breakdown.ipv4_private.push(text)
                }
                IpAddr::V4(_) => breakdown.ipv4_public.push(text),
                IpAddr::V6(v6) if v6.is_unspecified() || v6.is_loopback() => {}
                IpAddr::V6(v6) if is_link_local_v6(&v6) => breakdown.ipv6_link_local.push(text),
                IpAddr::V6(v6) if is_unique_local_v6(&v6) => {
                    breakdown.ipv6_unique_local.push(text)
                }
                IpAddr::V6(_) => breakdown.ipv6_global.push(text),
            }
        }
        breakdown
    }

    pub fn is_empty(&self) -> bool {
        self.variables().iter().all(|(_, list)| list.is_empty())
    }

    /// One `(variable name, addresses)` pair per classification
    pub fn variables(&self) -> [(&'static str, &Vec<String>); 6] {
        [
            ("ipv4_public", &self.ipv4_public),
            ("ipv4_private", &self.ipv4_private),
            ("ipv4_shared", &self.ipv4_shared),
            ("ipv6_global", &self.ipv6_global),
            ("ipv6_link_local", &self.ipv6_link_local),
            ("ipv6_unique_local", &self.ipv6_unique_local),
        ]
    }
}

/// One mesh node
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub id: String,
    /// Display name, defaults to the hostname
    pub name: String,
    pub hostname: String,
    /// DNS label, the inventory host key
    pub label: String,
    pub connected: bool,
    pub groups: Vec<GroupRef>,
    pub ips: IpBreakdown,
    raw: Map<String, Value>,
}

fn malformed(position: usize, message: impl Into<String>) -> InventoryError {
    InventoryError::MalformedResponse {
        position,
        message: message.into(),
    }
}

fn required_str(
    position: usize,
    raw: &Map<String, Value>,
    field: &str,
) -> InventoryResult<String> {
    match raw.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(malformed(
            position,
            format!("field '{}' must be a string, got {}", field, other),
        )),
        None => Err(malformed(
            position,
            format!("missing required field '{}'", field),
        )),
    }
}

fn parse_groups(position: usize, raw: &Map<String, Value>) -> InventoryResult<Vec<GroupRef>> {
    let items = match raw.get("groups") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(malformed(
                position,
                format!("field 'groups' must be a list, got {}", other),
            ))
        }
    };

    items
        .iter()
        .map(|item| {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(position, "group entry without a string 'name'"))?;
            Ok(GroupRef {
                id: item
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: name.to_string(),
                peers_count: item.get("peers_count").and_then(Value::as_u64),
            })
        })
        .collect()
}

impl Peer {
    /// Build a peer from one element of an API response
    pub fn from_api_value(position: usize, value: Value) -> InventoryResult<Self> {
        Self::from_value(position, value, false)
    }

    /// Build a peer from a cached raw mapping; entries written before
    /// `dns_label` was recorded fall back to the hostname as label
    pub fn from_cached_value(position: usize, value: Value) -> InventoryResult<Self> {
        Self::from_value(position, value, true)
    }

    fn from_value(position: usize, value: Value, legacy_label: bool) -> InventoryResult<Self> {
        let Value::Object(raw) = value else {
            return Err(malformed(position, "expected a JSON object"));
        };

        let id = required_str(position, &raw, "id")?;
        let hostname = required_str(position, &raw, "hostname")?;
        let label = match raw.get("dns_label") {
            None if legacy_label => hostname.clone(),
            _ => required_str(position, &raw, "dns_label")?,
        };
        if label.trim().is_empty() {
            return Err(malformed(position, "peer label is empty"));
        }

        let connected = match raw.get("connected") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(malformed(
                    position,
                    format!("field 'connected' must be a boolean, got {}", other),
                ))
            }
        };

        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or(&hostname)
            .to_string();
        let groups = parse_groups(position, &raw)?;
        let ips = IpBreakdown::from_addresses(
            ADDRESS_FIELDS
                .iter()
                .filter_map(|field| raw.get(*field).and_then(Value::as_str)),
        );

        Ok(Self {
            id,
            name,
            hostname,
            label,
            connected,
            groups,
            ips,
            raw,
        })
    }

    /// Raw API fields in response order
    pub fn raw_fields(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// The raw mapping this peer was built from
    pub fn to_raw_json(&self) -> Value {
        Value::Object(self.raw.clone())
    }

    /// Names of the groups this peer belongs to
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }
}

/// Reject peer sets in which two peers share a label
pub fn ensure_unique_labels(peers: &[Peer]) -> InventoryResult<()> {
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(peers.len());
    for (position, peer) in peers.iter().enumerate() {
        if let Some(first) = seen.insert(peer.label.as_str(), position) {
            return Err(malformed(
                position,
                format!(
                    "duplicate label '{}' (first seen at peer #{})",
                    peer.label, first
                ),
            ));
        }
    }
    Ok(())
}
