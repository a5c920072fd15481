//! # Ouroboros Identity (ouroboros-identity)
//!
//! A lazily populated, per-entity-type identity cache for Rust.
//!
//! ## Features
//!
//! - Records are loaded from the backing store at most once per cache instance
//! - Any number of named views ("model", "by_name", ...) kept mutually consistent
//! - Create/load/delete lifecycle notifications fanned out to every view
//! - Async-first store adapter trait with an in-memory implementation
//! - Optional shared wrapper for multi-task deployments
//!
//! ## Population
//!
//! A fresh cache is *unpopulated*. The first `all()`, or the first `find()`
//! that misses, loads every record not already cached and fans each one into
//! every view. From then on the cache is authoritative: a miss fails with
//! [`IdentityCacheError::RecordNotFound`] without another store round-trip.
//!
//! ```no_run
//! use ouroboros_identity::{IdentityCache, MemoryStore, Record};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone)]
//! struct Entity {
//!     id: Option<u32>,
//!     code: String,
//! }
//!
//! impl Record for Entity {
//!     type Id = u32;
//!     const ENTITY_TYPE: &'static str = "Entity";
//!
//!     fn id(&self) -> Option<u32> {
//!         self.id
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryStore::with_rows(vec![
//!         Entity { id: Some(1), code: "product".to_string() },
//!         Entity { id: Some(2), code: "category".to_string() },
//!     ]));
//!     let mut cache: IdentityCache<Entity, _> = IdentityCache::new(Arc::clone(&store));
//!
//!     println!("{} entities", cache.all().await?.len());
//!     assert_eq!(store.load_calls(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle Notifications
//!
//! The persistence layer reports its own writes to the cache:
//!
//! ```no_run
//! # use ouroboros_identity::{IdentityCache, MemoryStore, Record};
//! # #[derive(Debug, Clone)]
//! # struct Entity { id: Option<u32>, code: String }
//! # impl Record for Entity {
//! #     type Id = u32;
//! #     const ENTITY_TYPE: &'static str = "Entity";
//! #     fn id(&self) -> Option<u32> { self.id }
//! # }
//! # async fn example(mut cache: IdentityCache<Entity, MemoryStore<Entity>>) -> anyhow::Result<()> {
//! // after INSERT assigned id 3
//! let order = cache.notify_created(Entity { id: Some(3), code: "order".to_string() })?;
//!
//! // after DELETE of the same row
//! cache.notify_deleted(&order)?;
//! assert!(cache.find(&3).await.is_err());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cache;
pub mod error;
pub mod record;

// Re-export main types for convenience
pub use adapter::{MemoryStore, RecordStore};
pub use cache::{
    AllView, CacheStats, IdentityCache, IdentityCacheConfig, IdentityCacheConfigBuilder,
    NestedCache, NestedCacheRegistry, PopulationState, SharedIdentityCache, SyncEvent, SyncKind,
    ViewHooks, ViewKey, ViewKeyBuilder,
};
pub use error::{IdentityCacheError, Result};
pub use record::{Record, RecordRef};
