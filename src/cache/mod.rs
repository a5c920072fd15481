//! # Identity Cache Layer
//!
//! This module implements a lazily populated identity map for one entity type,
//! kept consistent across any number of named views.
//!
//! ## Features
//!
//! - **Lazy Population**: The backing store is bulk-loaded once, on the first
//!   `all()` or on the first `find()` miss
//! - **Identity Map**: One shared [`RecordRef`](crate::RecordRef) per identifier,
//!   referenced by every view
//! - **Nested Views**: Named keyed caches registered with explicit add/remove hooks
//! - **Lifecycle Sync**: Create, load and delete notifications fanned out to every view
//! - **Authoritative Misses**: Once populated, a miss fails without touching the store
//!
//! ## Architecture
//!
//! - [`IdentityCache`]: population state machine, lookups and lifecycle hooks
//! - [`NestedCacheRegistry`]: named nested caches in registration order
//! - `sync`: the fan-out applying one add/remove to every view
//! - [`SharedIdentityCache`]: async-mutex wrapper for multi-task use
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_identity::{IdentityCache, MemoryStore, Record};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone)]
//! struct Attribute {
//!     id: Option<u64>,
//!     name: String,
//! }
//!
//! impl Record for Attribute {
//!     type Id = u64;
//!     const ENTITY_TYPE: &'static str = "Attribute";
//!
//!     fn id(&self) -> Option<u64> {
//!         self.id
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryStore::with_rows(vec![
//!     Attribute { id: Some(1), name: "color".to_string() },
//! ]));
//! let mut cache: IdentityCache<Attribute, _> = IdentityCache::new(store);
//!
//! cache.register_keyed_view("by_name", |a: &Attribute| Some(a.name.clone()))?;
//!
//! // First lookup populates every view from the store
//! let color = cache.find(&1).await?;
//! assert_eq!(color.read().name, "color");
//!
//! let same = cache.find_by("by_name", "color").await?;
//! assert!(same.ptr_eq(&color));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod identity;
pub mod nested;
pub mod shared;
pub mod sync;
pub mod types;

pub use config::{IdentityCacheConfig, IdentityCacheConfigBuilder};
pub use identity::IdentityCache;
pub use nested::{NestedCache, NestedCacheRegistry, ViewFn, ViewHooks, ViewKeyBuilder};
pub use shared::SharedIdentityCache;
pub use sync::{AllView, SyncEvent, SyncKind};
pub use types::{CacheStats, PopulationState, ViewKey, ALL_VIEW, MODEL_VIEW};
