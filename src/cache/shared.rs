//! Identity cache shared between tasks
//!
//! [`IdentityCache`] assumes a single owner. When several tasks must see one
//! entity type's cache, [`SharedIdentityCache`] serializes them behind an async
//! mutex. The lock is held across the population load, so concurrent first
//! lookups still reach the backing store only once.

use crate::adapter::RecordStore;
use crate::cache::identity::IdentityCache;
use crate::cache::types::{CacheStats, PopulationState};
use crate::error::Result;
use crate::record::{Record, RecordRef};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Cloneable handle to an identity cache guarded by an async mutex
pub struct SharedIdentityCache<T: Record, S> {
    inner: Arc<Mutex<IdentityCache<T, S>>>,
}

impl<T: Record, S> Clone for SharedIdentityCache<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record, S: RecordStore<T>> SharedIdentityCache<T, S> {
    /// Wrap an identity cache for shared use
    pub fn new(cache: IdentityCache<T, S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Lock the cache for a multi-step operation
    pub async fn lock(&self) -> MutexGuard<'_, IdentityCache<T, S>> {
        self.inner.lock().await
    }

    /// Every known persisted record, in insertion/load order
    pub async fn all(&self) -> Result<Vec<RecordRef<T>>> {
        let mut cache = self.inner.lock().await;
        let records = cache.all().await?.to_vec();
        Ok(records)
    }

    /// Find a record by identifier
    pub async fn find(&self, id: &T::Id) -> Result<RecordRef<T>> {
        self.inner.lock().await.find(id).await
    }

    /// Find a record through any registered nested cache
    pub async fn find_by(&self, view: &str, key: &str) -> Result<RecordRef<T>> {
        self.inner.lock().await.find_by(view, key).await
    }

    /// Lifecycle hook: a record was persisted
    pub async fn notify_created(&self, record: impl Into<RecordRef<T>>) -> Result<RecordRef<T>> {
        self.inner.lock().await.notify_created(record)
    }

    /// Lifecycle hook: a persisted record was materialized from the store
    pub async fn notify_loaded(&self, record: impl Into<RecordRef<T>>) -> Result<RecordRef<T>> {
        self.inner.lock().await.notify_loaded(record)
    }

    /// Lifecycle hook: a record was durably removed
    pub async fn notify_deleted(&self, record: &RecordRef<T>) -> Result<()> {
        self.inner.lock().await.notify_deleted(record)
    }

    /// Lifecycle hook: fields of a cached record were changed in place
    pub async fn notify_updated(&self, record: &RecordRef<T>) -> Result<()> {
        self.inner.lock().await.notify_updated(record)
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats()
    }

    /// Current population state
    pub async fn state(&self) -> PopulationState {
        self.inner.lock().await.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryStore;

    #[derive(Debug, Clone)]
    struct Tag {
        id: Option<u32>,
        label: String,
    }

    impl Record for Tag {
        type Id = u32;
        const ENTITY_TYPE: &'static str = "Tag";

        fn id(&self) -> Option<u32> {
            self.id
        }
    }

    fn tag(id: u32, label: &str) -> Tag {
        Tag {
            id: Some(id),
            label: label.to_string(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_load_once() {
        let store = Arc::new(MemoryStore::with_rows((1..=20).map(|id| tag(id, "t"))));
        let cache: SharedIdentityCache<Tag, _> =
            SharedIdentityCache::new(IdentityCache::new(Arc::clone(&store)));

        let mut handles = Vec::new();
        for id in 1..=20u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.find(&id).await }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(store.load_calls(), 1);
        assert_eq!(cache.state().await, PopulationState::Populated);
        assert_eq!(cache.stats().await.entries, 20);
    }

    #[tokio::test]
    async fn test_shared_lifecycle() {
        let store = Arc::new(MemoryStore::with_rows(vec![tag(1, "red")]));
        let cache: SharedIdentityCache<Tag, _> =
            SharedIdentityCache::new(IdentityCache::new(Arc::clone(&store)));

        let created = cache.notify_created(tag(2, "blue")).await.unwrap();
        assert_eq!(cache.all().await.unwrap().len(), 2);

        cache.notify_deleted(&created).await.unwrap();
        let labels: Vec<String> = cache
            .all()
            .await
            .unwrap()
            .iter()
            .map(|t| t.read().label.clone())
            .collect();
        assert_eq!(labels, vec!["red"]);

        {
            let guard = cache.lock().await;
            assert_eq!(guard.model().len(), 1);
        }
        assert!(cache.find(&2).await.unwrap_err().is_not_found());
    }
}
