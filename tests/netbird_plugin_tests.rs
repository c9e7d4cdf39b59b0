//! End-to-end runs of the NetBird inventory plugin against in-process
//! peer sources and cache stores.

mod common;

use std::sync::Arc;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use netbird_inventory::inventory::cache::cache_key;
use netbird_inventory::inventory::plugins::{CacheOutcome, DynamicInventoryPlugin, NetbirdPlugin};
use netbird_inventory::inventory::{CacheChannel, Inventory, InventoryError, MemoryCache};

fn members(inventory: &Inventory, group: &str) -> Vec<String> {
    inventory
        .get_group(group)
        .map(|g| g.hosts.iter().cloned().collect())
        .unwrap_or_default()
}

fn apple_and_banana(ssh_enabled: bool) -> CountingPeerSource {
    CountingPeerSource::new(peers_from(vec![
        raw_peer("apple", false, &["All"], json!({"ssh_enabled": ssh_enabled})),
        raw_peer("banana", true, &["All"], json!({"ssh_enabled": ssh_enabled})),
    ]))
}

// ============================================================================
// Filtering and materialization
// ============================================================================

#[test]
fn test_disconnected_peers_are_excluded() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "dev.netbird.yml", &config_with("cache: false\n"));

    let plugin = NetbirdPlugin::new().with_peer_source(apple_and_banana(false));
    let mut inventory = Inventory::new();
    plugin.parse(&mut inventory, &path, true).unwrap();

    assert_eq!(inventory.host_names().collect::<Vec<_>>(), vec!["banana"]);
    assert_eq!(members(&inventory, "All"), vec!["banana"]);
}

#[test]
fn test_composed_group_with_false_conditional_stays_empty() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "dev.netbird.yml",
        &config_with("cache: false\ninclude_disconnected: true\ngroups:\n  ssh_hosts: ssh_enabled\n"),
    );

    let plugin = NetbirdPlugin::new().with_peer_source(apple_and_banana(false));
    let mut inventory = Inventory::new();
    plugin.parse(&mut inventory, &path, true).unwrap();

    assert!(members(&inventory, "ssh_hosts").is_empty());
    assert_eq!(members(&inventory, "All"), vec!["apple", "banana"]);
}

#[test]
fn test_authentication_failure_leaves_inventory_untouched() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "dev.netbird.yml", &config_with("cache_plugin: memory\n"));

    let source = CountingPeerSource::unauthorized();
    let plugin = NetbirdPlugin::new().with_peer_source(source.clone());
    let mut inventory = Inventory::new();
    let err = plugin.parse(&mut inventory, &path, true).unwrap_err();

    assert!(matches!(err, InventoryError::Authentication { status: 401, .. }));
    assert!(err.to_string().contains("token invalid"));
    assert_eq!(source.calls(), 1);
    assert!(inventory.is_empty());
    assert_eq!(inventory.group_names().collect::<Vec<_>>(), vec!["all", "ungrouped"]);
}

#[test]
fn test_peer_in_two_groups() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "dev.netbird.yml", &config_with("cache: false\n"));

    let source = CountingPeerSource::new(peers_from(vec![raw_peer(
        "apple",
        true,
        &["All", "Development"],
        json!({}),
    )]));
    let plugin = NetbirdPlugin::new().with_peer_source(source);
    let mut inventory = Inventory::new();
    plugin.parse(&mut inventory, &path, true).unwrap();

    assert_eq!(members(&inventory, "All"), vec!["apple"]);
    assert_eq!(members(&inventory, "Development"), vec!["apple"]);
    assert!(!inventory.get_group("ungrouped").unwrap().has_host("apple"));
}

#[test]
fn test_fixture_with_constructed_rules() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "prod.netbird.yml",
        &config_with(
            r#"cache: false
include_disconnected: true
strict: true
groups:
  ssh_hosts: ssh_enabled
keyed_groups:
  - key: os
    prefix: os
  - key: country_code
    prefix: country
    parent_group: countries
compose:
  ansible_host: ip
  netbird_version: "'v' ~ version"
"#,
        ),
    );

    let plugin = NetbirdPlugin::new().with_peer_source(CountingPeerSource::new(fixture_peers()));
    let mut inventory = Inventory::new();
    let summary = plugin.parse(&mut inventory, &path, true).unwrap();

    assert_eq!(summary.cache, CacheOutcome::Disabled);
    assert_eq!(summary.hosts, 3);
    assert_eq!(members(&inventory, "All").len(), 3);
    assert_eq!(
        members(&inventory, "Development"),
        vec!["apple.netbird.cloud", "banana.netbird.cloud"]
    );
    assert_eq!(members(&inventory, "Production"), vec!["cherry.netbird.cloud"]);
    assert_eq!(
        members(&inventory, "ssh_hosts"),
        vec!["banana.netbird.cloud", "cherry.netbird.cloud"]
    );
    assert_eq!(members(&inventory, "os_Linux_Mint_21_3"), vec!["apple.netbird.cloud"]);
    assert_eq!(members(&inventory, "os_Ubuntu_22_04_4_LTS"), vec!["cherry.netbird.cloud"]);
    assert!(inventory.get_group("countries").unwrap().has_child("country_DE"));

    let list = inventory.to_list_json();
    let cherry = &list["_meta"]["hostvars"]["cherry.netbird.cloud"];
    assert_eq!(cherry["ansible_host"], json!("100.92.51.200"));
    assert_eq!(cherry["netbird_version"], json!("v0.27.9"));
    assert_eq!(cherry["city_name"], json!("Berlin"));
}

#[test]
fn test_group_allowlist() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "prod.netbird.yml",
        &config_with("cache: false\ninclude_disconnected: true\nnetbird_groups:\n  - Production\n"),
    );

    let plugin = NetbirdPlugin::new().with_peer_source(CountingPeerSource::new(fixture_peers()));
    let mut inventory = Inventory::new();
    let summary = plugin.parse(&mut inventory, &path, true).unwrap();

    assert_eq!(summary.peers, 3);
    assert_eq!(summary.hosts, 1);
    assert_eq!(
        inventory.host_names().collect::<Vec<_>>(),
        vec!["cherry.netbird.cloud"]
    );
    assert!(inventory.get_group("Development").is_none());
}

#[test]
fn test_api_ip_style() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "prod.netbird.yml",
        &config_with("cache: false\nip_style: api\n"),
    );

    let plugin = NetbirdPlugin::new().with_peer_source(CountingPeerSource::new(fixture_peers()));
    let mut inventory = Inventory::new();
    plugin.parse(&mut inventory, &path, true).unwrap();

    let banana = inventory.get_host("banana.netbird.cloud").unwrap();
    assert!(!banana.has_var("ip"));
    assert_eq!(banana.get_var("ipv4_shared"), Some(&json!(["100.92.0.17"])));
    assert_eq!(banana.get_var("ipv4_public"), Some(&json!(["198.51.100.7"])));
    assert_eq!(banana.get_var("ipv6_global"), Some(&json!([])));
}

#[test]
fn test_second_run_is_identical() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "prod.netbird.yml",
        &config_with("cache: false\ninclude_disconnected: true\nkeyed_groups:\n  - key: os\n"),
    );

    let plugin = NetbirdPlugin::new().with_peer_source(CountingPeerSource::new(fixture_peers()));
    let mut inventory = Inventory::new();
    plugin.parse(&mut inventory, &path, true).unwrap();
    let first = inventory.to_list_json();

    plugin.parse(&mut inventory, &path, true).unwrap();
    assert_eq!(inventory.to_list_json(), first);

    let mut fresh = Inventory::new();
    plugin.parse(&mut fresh, &path, true).unwrap();
    assert_eq!(fresh.to_list_json(), first);
}

// ============================================================================
// Caching
// ============================================================================

#[test]
fn test_cached_empty_list_skips_the_api() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "dev.netbird.yml", &config_with(""));

    let cache = MemoryCache::new();
    cache
        .set(&cache_key(NetbirdPlugin::NAME, &path), json!([]))
        .unwrap();

    let source = CountingPeerSource::new(fixture_peers());
    let plugin = NetbirdPlugin::new()
        .with_peer_source(source.clone())
        .with_cache(cache);
    let mut inventory = Inventory::new();
    let summary = plugin.parse(&mut inventory, &path, true).unwrap();

    assert_eq!(summary.cache, CacheOutcome::Hit);
    assert_eq!(source.calls(), 0);
    assert!(inventory.is_empty());
}

#[test]
fn test_shared_cache_between_runs() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "dev.netbird.yml", &config_with("include_disconnected: true\n"));

    let cache = Arc::new(MemoryCache::new());
    let source = CountingPeerSource::new(fixture_peers());
    let plugin = NetbirdPlugin::new()
        .with_peer_source(source.clone())
        .with_cache(Arc::clone(&cache));

    let mut first = Inventory::new();
    assert_eq!(plugin.parse(&mut first, &path, true).unwrap().cache, CacheOutcome::Miss);
    assert!(cache.contains(&cache_key(NetbirdPlugin::NAME, &path)));

    let mut second = Inventory::new();
    assert_eq!(plugin.parse(&mut second, &path, true).unwrap().cache, CacheOutcome::Hit);
    assert_eq!(second.to_list_json(), first.to_list_json());

    let mut refreshed = Inventory::new();
    assert_eq!(
        plugin.parse(&mut refreshed, &path, false).unwrap().cache,
        CacheOutcome::Refreshed
    );
    assert_eq!(source.calls(), 2);
}

#[test]
fn test_json_file_cache_persists_across_plugins() {
    let dir = TempDir::new().unwrap();
    let cache_dir = dir.path().join("cache");
    let path = write_config(
        &dir,
        "dev.netbird.yml",
        &config_with(&format!(
            "cache_connection: {}\ncache_prefix: nb_\ninclude_disconnected: true\n",
            cache_dir.display()
        )),
    );

    let source = CountingPeerSource::new(fixture_peers());
    let mut first = Inventory::new();
    NetbirdPlugin::new()
        .with_peer_source(source.clone())
        .parse(&mut first, &path, true)
        .unwrap();

    let key = cache_key(NetbirdPlugin::NAME, &path);
    assert!(cache_dir.join(format!("nb_{key}")).is_file());

    let mut second = Inventory::new();
    let summary = NetbirdPlugin::new()
        .with_peer_source(source.clone())
        .parse(&mut second, &path, true)
        .unwrap();

    assert_eq!(summary.cache, CacheOutcome::Hit);
    assert_eq!(source.calls(), 1);
    assert_eq!(second.to_list_json(), first.to_list_json());
}

#[test]
fn test_credentials_required_even_with_cache() {
    std::env::remove_var("NETBIRD_API_KEY");
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "dev.netbird.yml",
        "plugin: netbird\napi_key: \"{{ lookup('env', 'NETBIRD_TEST_NEVER_SET') }}\"\napi_url: https://netbird.example.com/api\n",
    );

    let cache = MemoryCache::new();
    cache
        .set(&cache_key(NetbirdPlugin::NAME, &path), json!([]))
        .unwrap();

    let plugin = NetbirdPlugin::new()
        .with_peer_source(CountingPeerSource::new(Vec::new()))
        .with_cache(cache);
    let err = plugin.parse(&mut Inventory::new(), &path, true).unwrap_err();

    assert!(matches!(err, InventoryError::Configuration(_)));
    assert!(err
        .to_string()
        .contains("Could not retrieve the Netbird API Key from the configuration sources."));
}

#[test]
fn test_keyed_group_default_value_for_undefined_key() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "dev.netbird.yml",
        &config_with(
            "cache: false\nkeyed_groups:\n  - key: missing_var\n    prefix: os\n    default_value: unknown\n",
        ),
    );

    let plugin = NetbirdPlugin::new().with_peer_source(apple_and_banana(true));
    let mut inventory = Inventory::new();
    plugin.parse(&mut inventory, &path, true).unwrap();

    assert_eq!(members(&inventory, "os_unknown"), vec!["banana"]);
}
