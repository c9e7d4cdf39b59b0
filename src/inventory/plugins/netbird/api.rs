//! NetBird management API client
//!
//! Wraps `GET {api_url}/peers`: one blocking request per call, no retries
//! and no pagination.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use super::peer::{ensure_unique_labels, Peer};
use crate::inventory::{InventoryError, InventoryResult};

/// Something that can list the peers of a NetBird account
#[cfg_attr(test, mockall::automock)]
pub trait PeerSource {
    /// Fetch and parse every peer visible to `api_key`
    fn list_peers(&self, api_key: &str, api_url: &str) -> InventoryResult<Vec<Peer>>;
}

/// Blocking HTTP client for the NetBird API
#[derive(Debug, Clone)]
pub struct NetbirdApi {
    client: reqwest::blocking::Client,
}

impl NetbirdApi {
    /// Create a client whose connect and read timeouts are both `timeout`
    pub fn new(timeout: Duration) -> InventoryResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| InventoryError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Endpoint listing the peers under `api_url`
    pub fn peers_url(api_url: &str) -> String {
        format!("{}/peers", api_url.trim_end_matches('/'))
    }
}

impl PeerSource for NetbirdApi {
    fn list_peers(&self, api_key: &str, api_url: &str) -> InventoryResult<Vec<Peer>> {
        let url = Self::peers_url(api_url);
        debug!(url = %url, "requesting peer list");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Token {}", api_key))
            .header(
                USER_AGENT,
                concat!("netbird-inventory/", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    InventoryError::Transport(format!("Request to {} timed out", url))
                } else if e.is_connect() {
                    InventoryError::Transport(format!("Connection to {} failed: {}", url, e))
                } else {
                    InventoryError::Transport(format!("Request to {} failed: {}", url, e))
                }
            })?;

        let status = response.status();
        let body = response.text().map_err(|e| {
            InventoryError::Transport(format!("Failed to read response body: {}", e))
        })?;

        match status.as_u16() {
            401 => {
                return Err(InventoryError::Authentication {
                    status: status.as_u16(),
                    body,
                })
            }
            404 => {
                return Err(InventoryError::NotFound {
                    status: status.as_u16(),
                    body,
                })
            }
            _ if !status.is_success() => {
                return Err(InventoryError::Transport(format!(
                    "HTTP {} from {}: {}",
                    status, url, body
                )))
            }
            _ => {}
        }

        let peers = parse_peers(&body)?;
        debug!(count = peers.len(), "peer list received");
        Ok(peers)
    }
}

/// Parse a `/peers` response body
pub fn parse_peers(body: &str) -> InventoryResult<Vec<Peer>> {
    let value: Value = serde_json::from_str(body).map_err(|e| InventoryError::MalformedResponse {
        position: 0,
        message: format!("response is not valid JSON: {}", e),
    })?;

    let Value::Array(items) = value else {
        return Err(InventoryError::MalformedResponse {
            position: 0,
            message: "expected a JSON array of peers".to_string(),
        });
    };

    let peers = items
        .into_iter()
        .enumerate()
        .map(|(position, item)| Peer::from_api_value(position, item))
        .collect::<InventoryResult<Vec<_>>>()?;
    ensure_unique_labels(&peers)?;
    Ok(peers)
}
