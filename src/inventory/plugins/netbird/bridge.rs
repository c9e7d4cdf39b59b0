//! Peer records to and from a cache store.

use serde_json::Value;

use super::peer::{ensure_unique_labels, Peer};
use crate::inventory::{CacheChannel, InventoryError, InventoryResult};

/// Stores peer lists in a [`CacheChannel`] as their raw API mappings
pub struct CacheBridge<'a> {
    channel: &'a dyn CacheChannel,
}

impl<'a> CacheBridge<'a> {
    pub fn new(channel: &'a dyn CacheChannel) -> Self {
        Self { channel }
    }

    /// Load the peers cached under `key`. `None` is a miss; an empty list is a hit.
    pub fn load(&self, key: &str) -> InventoryResult<Option<Vec<Peer>>> {
        let Some(value) = self.channel.get(key)? else {
            return Ok(None);
        };

        let Value::Array(items) = value else {
            return Err(InventoryError::Cache(format!(
                "cache entry {} is not a list of peers",
                key
            )));
        };

        let peers = items
            .into_iter()
            .enumerate()
            .map(|(position, item)| Peer::from_cached_value(position, item))
            .collect::<InventoryResult<Vec<_>>>()?;
        ensure_unique_labels(&peers)?;
        Ok(Some(peers))
    }

    /// Store `peers` under `key`
    pub fn save(&self, key: &str, peers: &[Peer]) -> InventoryResult<()> {
        let raw = peers.iter().map(Peer::to_raw_json).collect();
        self.channel.set(key, Value::Array(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::MemoryCache;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn peers() -> Vec<Peer> {
        vec![
            Peer::from_api_value(
                0,
                json!({
                    "id": "p1",
                    "hostname": "apple",
                    "dns_label": "apple.netbird.cloud",
                    "connected": false,
                    "groups": [{"id": "g1", "name": "All", "peers_count": 2}],
                    "ip": "100.92.0.1",
                    "os": "Linux Mint 21.3"
                }),
            )
            .unwrap(),
            Peer::from_api_value(
                1,
                json!({
                    "id": "p2",
                    "hostname": "banana",
                    "dns_label": "banana.netbird.cloud",
                    "connected": true,
                    "groups": [],
                    "ssh_enabled": true
                }),
            )
            .unwrap(),
        ]
    }

    #[test]
    fn test_round_trip() {
        let cache = MemoryCache::new();
        let bridge = CacheBridge::new(&cache);
        let original = peers();

        bridge.save("key", &original).unwrap();
        assert_eq!(bridge.load("key").unwrap(), Some(original));
    }

    #[test]
    fn test_miss_and_empty_hit() {
        let cache = MemoryCache::new();
        let bridge = CacheBridge::new(&cache);

        assert_eq!(bridge.load("key").unwrap(), None);

        bridge.save("key", &[]).unwrap();
        assert_eq!(bridge.load("key").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_legacy_entry_without_label() {
        let cache = MemoryCache::new();
        cache
            .set("key", json!([{"id": "p1", "hostname": "apple", "connected": true}]))
            .unwrap();

        let loaded = CacheBridge::new(&cache).load("key").unwrap().unwrap();
        assert_eq!(loaded[0].label, "apple");
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        let cache = MemoryCache::new();
        cache.set("key", json!({"peers": []})).unwrap();
        assert!(matches!(
            CacheBridge::new(&cache).load("key"),
            Err(InventoryError::Cache(_))
        ));
    }
}
