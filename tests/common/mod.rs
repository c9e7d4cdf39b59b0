//! Shared test utilities and fixtures for the netbird-inventory test suite.
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

use netbird_inventory::inventory::plugins::netbird::{parse_peers, Peer, PeerSource};
use netbird_inventory::inventory::{InventoryError, InventoryResult};

pub const API_KEY: &str = "nbp_integration_token";

/// Path of a file under `tests/fixtures`
pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// The raw `/peers` response fixture
pub fn peers_json() -> String {
    std::fs::read_to_string(fixture_path("peers.json")).unwrap()
}

/// Parsed peers from the fixture
pub fn fixture_peers() -> Vec<Peer> {
    parse_peers(&peers_json()).unwrap()
}

/// A raw peer with the given connectivity and groups
pub fn raw_peer(label: &str, connected: bool, groups: &[&str], extra: Value) -> Value {
    let groups: Vec<Value> = groups
        .iter()
        .map(|name| json!({"id": format!("grp-{name}"), "name": name, "peers_count": 1}))
        .collect();
    let mut peer = json!({
        "id": format!("peer-{label}"),
        "name": label,
        "hostname": label,
        "dns_label": label,
        "connected": connected,
        "groups": groups,
    });
    if let (Some(peer), Value::Object(extra)) = (peer.as_object_mut(), extra) {
        peer.extend(extra);
    }
    peer
}

/// Peers parsed from raw values
pub fn peers_from(raw: Vec<Value>) -> Vec<Peer> {
    parse_peers(&Value::Array(raw).to_string()).unwrap()
}

/// Write an inventory config into `dir`, returning its path
pub fn write_config(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

/// Config body with literal credentials and the given extra options
pub fn config_with(extra: &str) -> String {
    format!(
        "plugin: dominion_solutions.netbird\napi_key: {API_KEY}\napi_url: https://netbird.example.com/api\n{extra}"
    )
}

/// Peer source returning a fixed list and counting calls
#[derive(Clone)]
pub struct CountingPeerSource {
    peers: Arc<Mutex<InventoryResult<Vec<Peer>>>>,
    calls: Arc<AtomicU32>,
}

impl CountingPeerSource {
    pub fn new(peers: Vec<Peer>) -> Self {
        Self {
            peers: Arc::new(Mutex::new(Ok(peers))),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// A source whose every call fails with an authentication error
    pub fn unauthorized() -> Self {
        Self {
            peers: Arc::new(Mutex::new(Err(InventoryError::Authentication {
                status: 401,
                body: r#"{"message":"token invalid","code":401}"#.to_string(),
            }))),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PeerSource for CountingPeerSource {
    fn list_peers(&self, api_key: &str, _api_url: &str) -> InventoryResult<Vec<Peer>> {
        assert_eq!(api_key, API_KEY);
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.peers.lock() {
            Ok(peers) => Ok(peers.clone()),
            Err(InventoryError::Authentication { status, body }) => {
                Err(InventoryError::Authentication {
                    status: *status,
                    body: body.clone(),
                })
            }
            Err(e) => Err(InventoryError::Transport(e.to_string())),
        }
    }
}
