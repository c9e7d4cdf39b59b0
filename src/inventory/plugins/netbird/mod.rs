//! NetBird Dynamic Inventory Plugin
//!
//! Builds an inventory from the peers of a NetBird account. Each peer becomes
//! a host named after its DNS label, each NetBird group becomes an inventory
//! group, and the raw peer fields become host variables.
//!
//! A run is one straight pass:
//!
//! ```text
//! read config -> cache lookup -> [fetch -> cache write] -> filter -> materialize
//! ```
//!
//! The fetch and the cache write only happen when the cache had nothing
//! usable or was bypassed.
//!
//! # Configuration
//!
//! ```yaml
//! plugin: dominion_solutions.netbird
//! api_key: "{{ lookup('env', 'NETBIRD_TOKEN') }}"
//! api_url: https://netbird.example.com/api
//! ip_style: plain
//! include_disconnected: false
//! netbird_groups:
//!   - Production
//! strict: false
//! groups:
//!   ssh_hosts: ssh_enabled
//! keyed_groups:
//!   - key: os
//!     prefix: os
//! compose:
//!   ansible_host: ip
//! ```

pub mod api;
pub mod bridge;
pub mod filter;
pub mod materialize;
pub mod peer;

pub use api::{parse_peers, NetbirdApi, PeerSource};
pub use bridge::CacheBridge;
pub use filter::FilterConfig;
pub use materialize::{materialize, MaterializeRules};
pub use peer::{GroupRef, IpBreakdown, Peer};

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Span};

use super::config::{
    resolve_credentials, verify_file, CacheBackend, ConfigSource, Credentials, NetbirdConfig,
    TemplatedConfigSource, API_KEY_ENV, API_URL_ENV,
};
use super::{CacheOutcome, DynamicInventoryPlugin, PluginOption, RunSummary};
use crate::inventory::{
    cache_key, CacheChannel, InventoryResult, InventoryTarget, JsonFileCache, MemoryCache,
};

/// NetBird inventory plugin
///
/// Collaborators are injected; [`NetbirdPlugin::new`] wires the defaults
/// (minijinja templating, the HTTP client and the cache store named in the
/// config file).
pub struct NetbirdPlugin {
    config_source: Box<dyn ConfigSource>,
    peer_source: Option<Box<dyn PeerSource>>,
    cache: Option<Box<dyn CacheChannel>>,
}

impl fmt::Debug for NetbirdPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetbirdPlugin")
            .field("custom_peer_source", &self.peer_source.is_some())
            .field("custom_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for NetbirdPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl NetbirdPlugin {
    /// Fully qualified plugin name, also used for cache keys
    pub const NAME: &'static str = "dominion_solutions.netbird";

    pub fn new() -> Self {
        Self {
            config_source: Box::new(TemplatedConfigSource::new()),
            peer_source: None,
            cache: None,
        }
    }

    /// Read options and render templates through `source`
    pub fn with_config_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.config_source = Box::new(source);
        self
    }

    /// Fetch peers from `source` instead of the NetBird API
    pub fn with_peer_source(mut self, source: impl PeerSource + 'static) -> Self {
        self.peer_source = Some(Box::new(source));
        self
    }

    /// Use `cache` instead of the store named by `cache_plugin`
    pub fn with_cache(mut self, cache: impl CacheChannel + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    fn open_cache(config: &NetbirdConfig) -> InventoryResult<Box<dyn CacheChannel>> {
        Ok(match config.cache_backend()? {
            CacheBackend::Memory => Box::new(MemoryCache::new()),
            CacheBackend::JsonFile => {
                let dir = config
                    .cache_connection
                    .as_ref()
                    .map(Into::into)
                    .unwrap_or_else(JsonFileCache::default_dir);
                Box::new(
                    JsonFileCache::new(dir)
                        .with_prefix(config.cache_prefix.clone())
                        .with_timeout(config.cache_timeout),
                )
            }
        })
    }

    fn load_cached(channel: &dyn CacheChannel, key: &str, span: &Span) -> Option<Vec<Peer>> {
        match CacheBridge::new(channel).load(key) {
            Ok(Some(peers)) => {
                info!(parent: span, peers = peers.len(), "using cached peers");
                Some(peers)
            }
            Ok(None) => {
                debug!(parent: span, "cache miss");
                None
            }
            Err(e) => {
                warn!(parent: span, error = %e, "ignoring unusable cache entry");
                None
            }
        }
    }

    fn fetch(
        &self,
        credentials: &Credentials,
        config: &NetbirdConfig,
        span: &Span,
    ) -> InventoryResult<Vec<Peer>> {
        let peers = span.in_scope(|| match &self.peer_source {
            Some(source) => source.list_peers(&credentials.api_key, &credentials.api_url),
            None => NetbirdApi::new(Duration::from_secs(config.timeout))?
                .list_peers(&credentials.api_key, &credentials.api_url),
        })?;
        info!(parent: span, peers = peers.len(), "fetched peers from NetBird API");
        Ok(peers)
    }
}

impl DynamicInventoryPlugin for NetbirdPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Peers of a NetBird mesh network as inventory hosts"
    }

    fn verify_file(&self, path: &Path) -> bool {
        verify_file(path)
    }

    fn parse(
        &self,
        target: &mut dyn InventoryTarget,
        path: &Path,
        cache: bool,
    ) -> InventoryResult<RunSummary> {
        let config = self.config_source.read_config(path)?;
        let credentials = resolve_credentials(self.config_source.as_ref(), &config)?;

        let key = cache_key(Self::NAME, path);
        let span = info_span!("netbird_inventory", config = %path.display(), cache_key = %key);
        debug!(parent: &span, api_url = %credentials.api_url, cache = config.cache, refresh = !cache, "configuration loaded");

        let opened;
        let channel: Option<&dyn CacheChannel> = match (&self.cache, config.cache) {
            (_, false) => None,
            (Some(injected), true) => Some(injected.as_ref()),
            (None, true) => {
                opened = Self::open_cache(&config)?;
                Some(opened.as_ref())
            }
        };

        let cached = match channel {
            Some(channel) if cache => Self::load_cached(channel, &key, &span),
            _ => None,
        };

        let (peers, outcome) = match cached {
            Some(peers) => (peers, CacheOutcome::Hit),
            None => {
                let peers = self.fetch(&credentials, &config, &span)?;
                let outcome = match channel {
                    Some(channel) => {
                        CacheBridge::new(channel).save(&key, &peers)?;
                        debug!(parent: &span, "cache updated");
                        if cache {
                            CacheOutcome::Miss
                        } else {
                            CacheOutcome::Refreshed
                        }
                    }
                    None => CacheOutcome::Disabled,
                };
                (peers, outcome)
            }
        };

        let kept = filter::apply(&peers, &FilterConfig::from_config(&config), &span);
        materialize(target, &kept, &MaterializeRules::from_config(&config), &span)?;

        Ok(RunSummary {
            cache: outcome,
            peers: peers.len(),
            hosts: kept.len(),
        })
    }

    fn options_documentation(&self) -> Vec<PluginOption> {
        vec![
            PluginOption::required_string("plugin", "Plugin name")
                .with_choices(&["netbird", "dominion_solutions.netbird"]),
            PluginOption::required_string("api_key", "NetBird API token, may be a template")
                .with_env_var(API_KEY_ENV),
            PluginOption::required_string("api_url", "NetBird API base URL, may be a template")
                .with_env_var(API_URL_ENV),
            PluginOption::optional_bool("cache", "Cache the peer list between runs", true),
            PluginOption::optional_string("cache_plugin", "Cache store", "jsonfile")
                .with_choices(&["jsonfile", "memory"]),
            PluginOption::optional_string(
                "cache_connection",
                "Cache directory for the jsonfile store",
                "~/.cache/netbird-inventory",
            ),
            PluginOption::optional_string("cache_prefix", "Cache file name prefix", "ANSIBLE_"),
            PluginOption::optional_int(
                "cache_timeout",
                "Cache entry lifetime in seconds, 0 never expires",
                3600,
            ),
            PluginOption::optional_string(
                "ip_style",
                "Expose raw ip fields or classified address lists",
                "plain",
            )
            .with_choices(&["plain", "api"]),
            PluginOption::optional_bool(
                "include_disconnected",
                "Include peers that are not connected",
                false,
            ),
            PluginOption::optional_bool(
                "netbird_connected",
                "Deprecated inverse of include_disconnected",
                true,
            ),
            PluginOption::optional_list(
                "netbird_groups",
                "Only include peers in at least one of these groups",
            ),
            PluginOption::optional_bool(
                "strict",
                "Fail on expressions that cannot be evaluated",
                false,
            ),
            PluginOption::optional_dict("compose", "Host variables from expressions"),
            PluginOption::optional_dict("groups", "Groups from conditional expressions"),
            PluginOption::optional_list("keyed_groups", "Groups from variable values"),
            PluginOption::optional_bool(
                "leading_separator",
                "Keep the separator when a keyed group has no prefix",
                true,
            ),
            PluginOption::optional_int("timeout", "API connect and read timeout in seconds", 30),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::api::MockPeerSource;
    use super::*;
    use crate::inventory::cache::MockCacheChannel;
    use crate::inventory::{Inventory, InventoryError};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
plugin: dominion_solutions.netbird
api_key: nbp_test_token
api_url: https://netbird.example.com/api
cache_plugin: memory
"#;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("test.netbird.yml");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn raw_peers() -> serde_json::Value {
        json!([
            {
                "id": "p1",
                "name": "apple",
                "hostname": "apple",
                "dns_label": "apple.netbird.cloud",
                "connected": false,
                "groups": [{"id": "g1", "name": "All", "peers_count": 2}],
                "ssh_enabled": false
            },
            {
                "id": "p2",
                "name": "banana",
                "hostname": "banana",
                "dns_label": "banana.netbird.cloud",
                "connected": true,
                "groups": [{"id": "g1", "name": "All", "peers_count": 2}],
                "ssh_enabled": false
            }
        ])
    }

    fn live_peers() -> Vec<Peer> {
        parse_peers(&raw_peers().to_string()).unwrap()
    }

    #[test]
    fn test_live_fetch_fills_cache() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, CONFIG);

        let mut source = MockPeerSource::new();
        source
            .expect_list_peers()
            .withf(|key, url| key == "nbp_test_token" && url == "https://netbird.example.com/api")
            .times(1)
            .returning(|_, _| Ok(live_peers()));

        let mut cache = MockCacheChannel::new();
        cache.expect_get().times(1).returning(|_| Ok(None));
        cache
            .expect_set()
            .withf(|_, value| value.as_array().map(Vec::len) == Some(2))
            .times(1)
            .returning(|_, _| Ok(()));

        let plugin = NetbirdPlugin::new().with_peer_source(source).with_cache(cache);
        let mut inventory = Inventory::new();
        let summary = plugin.parse(&mut inventory, &path, true).unwrap();

        assert_eq!(
            summary,
            RunSummary {
                cache: CacheOutcome::Miss,
                peers: 2,
                hosts: 1
            }
        );
        assert_eq!(inventory.host_count(), 1);
        assert!(inventory.get_host("banana.netbird.cloud").is_some());
        assert_eq!(inventory.get_group("All").unwrap().host_count(), 1);
    }

    #[test]
    fn test_cached_peers_skip_the_api() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &format!("{CONFIG}include_disconnected: true\n"));

        let mut source = MockPeerSource::new();
        source.expect_list_peers().times(0);

        let mut cache = MockCacheChannel::new();
        let expected_key = cache_key(NetbirdPlugin::NAME, &path);
        cache
            .expect_get()
            .withf(move |key| key == expected_key)
            .times(1)
            .returning(|_| Ok(Some(raw_peers())));
        cache.expect_set().times(0);

        let plugin = NetbirdPlugin::new().with_peer_source(source).with_cache(cache);
        let mut inventory = Inventory::new();
        let summary = plugin.parse(&mut inventory, &path, true).unwrap();

        assert_eq!(summary.cache, CacheOutcome::Hit);
        assert_eq!(inventory.get_group("All").unwrap().host_count(), 2);
    }

    #[test]
    fn test_empty_cached_list_is_a_hit() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, CONFIG);

        let mut source = MockPeerSource::new();
        source.expect_list_peers().times(0);

        let cache = MemoryCache::new();
        cache.set(&cache_key(NetbirdPlugin::NAME, &path), json!([])).unwrap();

        let plugin = NetbirdPlugin::new().with_peer_source(source).with_cache(cache);
        let mut inventory = Inventory::new();
        let summary = plugin.parse(&mut inventory, &path, true).unwrap();

        assert_eq!(summary.cache, CacheOutcome::Hit);
        assert!(inventory.is_empty());
    }

    #[test]
    fn test_refresh_bypasses_cache_read() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, CONFIG);

        let mut source = MockPeerSource::new();
        source
            .expect_list_peers()
            .times(1)
            .returning(|_, _| Ok(live_peers()));

        let mut cache = MockCacheChannel::new();
        cache.expect_get().times(0);
        cache.expect_set().times(1).returning(|_, _| Ok(()));

        let plugin = NetbirdPlugin::new().with_peer_source(source).with_cache(cache);
        let summary = plugin.parse(&mut Inventory::new(), &path, false).unwrap();

        assert_eq!(summary.cache, CacheOutcome::Refreshed);
    }

    #[test]
    fn test_cache_disabled() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, &format!("{CONFIG}cache: false\n"));

        let mut source = MockPeerSource::new();
        source
            .expect_list_peers()
            .times(1)
            .returning(|_, _| Ok(live_peers()));

        let mut cache = MockCacheChannel::new();
        cache.expect_get().times(0);
        cache.expect_set().times(0);

        let plugin = NetbirdPlugin::new().with_peer_source(source).with_cache(cache);
        let summary = plugin.parse(&mut Inventory::new(), &path, true).unwrap();

        assert_eq!(summary.cache, CacheOutcome::Disabled);
    }

    #[test]
    fn test_corrupt_cache_entry_is_refetched() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, CONFIG);

        let mut source = MockPeerSource::new();
        source
            .expect_list_peers()
            .times(1)
            .returning(|_, _| Ok(live_peers()));

        let cache = MemoryCache::new();
        let key = cache_key(NetbirdPlugin::NAME, &path);
        cache.set(&key, json!({"not": "a list"})).unwrap();

        let plugin = NetbirdPlugin::new().with_peer_source(source).with_cache(cache);
        let summary = plugin.parse(&mut Inventory::new(), &path, true).unwrap();

        assert_eq!(summary.cache, CacheOutcome::Miss);
    }

    #[test]
    fn test_authentication_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, CONFIG);

        let mut source = MockPeerSource::new();
        source.expect_list_peers().times(1).returning(|_, _| {
            Err(InventoryError::Authentication {
                status: 401,
                body: r#"{"message":"token invalid"}"#.to_string(),
            })
        });

        let mut cache = MockCacheChannel::new();
        cache.expect_get().returning(|_| Ok(None));
        cache.expect_set().times(0);

        let plugin = NetbirdPlugin::new().with_peer_source(source).with_cache(cache);
        let mut inventory = Inventory::new();
        let err = plugin.parse(&mut inventory, &path, true).unwrap_err();

        assert!(matches!(err, InventoryError::Authentication { status: 401, .. }));
        assert!(inventory.is_empty());
        assert_eq!(inventory.group_count(), 2);
    }

    #[test]
    fn test_unsupported_cache_plugin() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "plugin: netbird\napi_key: t\napi_url: https://netbird.example.com/api\ncache_plugin: redis\n",
        );

        let mut source = MockPeerSource::new();
        source.expect_list_peers().times(0);

        let plugin = NetbirdPlugin::new().with_peer_source(source);
        let err = plugin.parse(&mut Inventory::new(), &path, true).unwrap_err();
        assert!(matches!(err, InventoryError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn test_options_documentation_covers_config() {
        let plugin = NetbirdPlugin::new();
        let names: Vec<_> = plugin
            .options_documentation()
            .into_iter()
            .map(|o| o.name)
            .collect();

        for name in ["api_key", "api_url", "cache", "ip_style", "keyed_groups", "timeout"] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }
        assert_eq!(plugin.name(), "dominion_solutions.netbird");
    }
}
