//! Inventory cache stores
//!
//! A `CacheChannel` is a key/value store for raw inventory data that lives
//! across runs. Two stores are provided:
//! - `MemoryCache`: process-local, used for tests and `cache_plugin: memory`
//! - `JsonFileCache`: one pretty-printed JSON file per key with mtime-based expiry
//!
//! Keys are derived from the plugin name and the config file path with
//! [`cache_key`], so two config files never share an entry.
//!
//! # Example
//!
//! ```rust,ignore
//! use netbird_inventory::inventory::cache::{cache_key, CacheChannel, JsonFileCache};
//!
//! let cache = JsonFileCache::new(JsonFileCache::default_dir())
//!     .with_prefix("ANSIBLE_")
//!     .with_timeout(3600);
//! let key = cache_key("dominion_solutions.netbird", Path::new("prod.netbird.yml"));
//!
//! if let Some(raw) = cache.get(&key)? {
//!     // use cached data
//! }
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde_json::Value;
use sha1::{Digest, Sha1};
use tracing::debug;

use super::{InventoryError, InventoryResult};

/// Key/value store for raw inventory data
#[cfg_attr(test, mockall::automock)]
pub trait CacheChannel {
    /// Fetch the value stored under `key`; `None` is a miss
    fn get(&self, key: &str) -> InventoryResult<Option<Value>>;

    /// Store `value` under `key`, replacing any previous entry
    fn set(&self, key: &str, value: Value) -> InventoryResult<()>;
}

impl<T: CacheChannel + ?Sized> CacheChannel for std::sync::Arc<T> {
    fn get(&self, key: &str) -> InventoryResult<Option<Value>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value) -> InventoryResult<()> {
        (**self).set(key, value)
    }
}

fn sha1_hex(data: &[u8]) -> String {
    format!("{:x}", Sha1::digest(data))
}

/// Cache key for a plugin and config file: `{name}_{h(name)}s_{h(path)}`
/// where `h` is the first five hex digits of the SHA-1 digest.
pub fn cache_key(plugin_name: &str, config_path: &Path) -> String {
    let name_digest = sha1_hex(plugin_name.as_bytes());
    let path_digest = sha1_hex(config_path.to_string_lossy().as_bytes());
    format!(
        "{}_{}s_{}",
        plugin_name,
        &name_digest[..5],
        &path_digest[..5]
    )
}

// ============================================================================
// Memory Cache
// ============================================================================

/// Process-local cache store
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl CacheChannel for MemoryCache {
    fn get(&self, key: &str) -> InventoryResult<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> InventoryResult<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}

// ============================================================================
// JSON File Cache
// ============================================================================

/// Cache store keeping one JSON file per key
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    dir: PathBuf,
    prefix: String,
    timeout: Option<Duration>,
}

impl JsonFileCache {
    /// Create a store rooted at `dir` with no prefix and no expiry
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: String::new(),
            timeout: None,
        }
    }

    /// Default cache directory under the user cache dir
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .map(|d| d.join("netbird-inventory"))
            .unwrap_or_else(|| PathBuf::from(".cache/netbird-inventory"))
    }

    /// Prefix prepended to every file name
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Entry lifetime in seconds; 0 keeps entries forever
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, key))
    }

    fn is_expired(&self, path: &Path) -> InventoryResult<bool> {
        let Some(timeout) = self.timeout else {
            return Ok(false);
        };
        let modified = std::fs::metadata(path)?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        Ok(age > timeout)
    }
}

impl CacheChannel for JsonFileCache {
    fn get(&self, key: &str) -> InventoryResult<Option<Value>> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        if self.is_expired(&path)? {
            debug!(path = %path.display(), "cache entry expired");
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let value = serde_json::from_str(&content).map_err(|e| {
            InventoryError::Cache(format!("corrupt cache file {}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: Value) -> InventoryResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.entry_path(key);
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut file, &value)?;
        file.write_all(b"\n")?;
        file.persist(&path).map_err(|e| {
            InventoryError::Cache(format!(
                "failed to write cache file {}: {}",
                path.display(),
                e.error
            ))
        })?;

        debug!(path = %path.display(), "cache entry written");
        Ok(())
    }
}
