//! # netbird-inventory - NetBird peers as an Ansible inventory
//!
//! A dynamic inventory source that turns the peers of a NetBird mesh network
//! into inventory hosts. It speaks the same config file format as the
//! `dominion_solutions.netbird` Ansible inventory plugin.
//!
//! ## Core Concepts
//!
//! - **Peer**: a node reported by the NetBird management API
//! - **Label**: the peer's DNS label, used as the inventory host name
//! - **Group**: a NetBird group; each becomes an inventory group
//! - **Constructed rules**: `compose`, `groups` and `keyed_groups` expressions
//!   that add variables and groups per host
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ ConfigSource │───▶│ NetbirdPlugin│◀──▶│ CacheChannel │
//! │ (*.netbird.  │    │ (orchestrator│    │ (jsonfile /  │
//! │   yml)       │    │   per run)   │    │   memory)    │
//! └──────────────┘    └──────┬───────┘    └──────────────┘
//!                            │ miss
//!                            ▼
//!                     ┌──────────────┐
//!                     │  PeerSource  │  GET {api_url}/peers
//!                     └──────┬───────┘
//!                            ▼
//!                  filter ─▶ materialize
//!                            │
//!                            ▼
//!                   ┌─────────────────┐
//!                   │ InventoryTarget │
//!                   └─────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use netbird_inventory::prelude::*;
//!
//! fn main() -> InventoryResult<()> {
//!     let plugin = NetbirdPlugin::new();
//!     let mut inventory = Inventory::new();
//!
//!     plugin.parse(&mut inventory, Path::new("prod.netbird.yml"), true)?;
//!
//!     println!("{}", serde_json::to_string_pretty(&inventory.to_list_json())?);
//!     Ok(())
//! }
//! ```

pub mod inventory;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::inventory::plugins::netbird::{NetbirdApi, Peer, PeerSource};
    pub use crate::inventory::plugins::{
        CacheOutcome, ConfigSource, DynamicInventoryPlugin, NetbirdConfig, NetbirdPlugin,
        RunSummary, TemplatedConfigSource,
    };
    pub use crate::inventory::{
        CacheChannel, Group, Host, Inventory, InventoryError, InventoryResult, InventoryTarget,
        JsonFileCache, MemoryCache,
    };
    pub use std::path::Path;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
