//! Backing store adapter contract and an in-memory implementation
//!
//! The identity cache reaches its persistent store only through the two bulk
//! loads of [`RecordStore`]. Anything else about the store (query language,
//! connection handling, timeouts) stays behind the adapter.

use crate::record::Record;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Bulk-load primitives consumed by the identity cache
///
/// The entity type is fixed by `T`, so neither method takes it explicitly.
/// Errors are returned as-is to the caller of `all()`/`find()`.
#[async_trait]
pub trait RecordStore<T: Record>: Send + Sync {
    /// Load every persisted record of the entity type
    async fn load_all(&self) -> anyhow::Result<Vec<T>>;

    /// Load every persisted record whose identifier is not in `identifiers`
    ///
    /// Must be equivalent to [`RecordStore::load_all`] filtered by exclusion.
    async fn load_excluding(&self, identifiers: &HashSet<T::Id>) -> anyhow::Result<Vec<T>>;
}

#[async_trait]
impl<T, S> RecordStore<T> for Arc<S>
where
    T: Record,
    S: RecordStore<T> + ?Sized,
{
    async fn load_all(&self) -> anyhow::Result<Vec<T>> {
        (**self).load_all().await
    }

    async fn load_excluding(&self, identifiers: &HashSet<T::Id>) -> anyhow::Result<Vec<T>> {
        (**self).load_excluding(identifiers).await
    }
}

/// In-memory record store
///
/// Rows are kept in insertion order and handed out as clones, the way a
/// database driver materializes fresh values on every query. Load calls are
/// counted so callers can observe how often the cache reached the store.
pub struct MemoryStore<T> {
    rows: Mutex<Vec<T>>,
    load_calls: AtomicUsize,
    pending_failure: Mutex<Option<String>>,
}

impl<T: Record + Clone> MemoryStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            load_calls: AtomicUsize::new(0),
            pending_failure: Mutex::new(None),
        }
    }

    /// Create a store pre-filled with rows
    pub fn with_rows(rows: impl IntoIterator<Item = T>) -> Self {
        let store = Self::new();
        store.rows.lock().extend(rows);
        store
    }

    /// Persist a row (replacing any row with the same identifier)
    pub fn insert(&self, row: T) {
        let mut rows = self.rows.lock();
        let id = row.id();
        if id.is_some() {
            rows.retain(|existing| existing.id() != id);
        }
        rows.push(row);
    }

    /// Remove the row with the given identifier
    pub fn remove(&self, id: &T::Id) -> Option<T> {
        let mut rows = self.rows.lock();
        let position = rows.iter().position(|row| row.id().as_ref() == Some(id))?;
        Some(rows.remove(position))
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// Total number of bulk loads served (successful or not)
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Make the next bulk load fail with `message`
    pub fn fail_next_load(&self, message: impl Into<String>) {
        *self.pending_failure.lock() = Some(message.into());
    }

    fn begin_load(&self) -> anyhow::Result<()> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        match self.pending_failure.lock().take() {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        }
    }
}

impl<T: Record + Clone> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record + Clone> RecordStore<T> for MemoryStore<T> {
    async fn load_all(&self) -> anyhow::Result<Vec<T>> {
        self.begin_load()?;
        let rows = self.rows.lock().clone();
        debug!("Loaded {} {} rows", rows.len(), T::ENTITY_TYPE);
        Ok(rows)
    }

    async fn load_excluding(&self, identifiers: &HashSet<T::Id>) -> anyhow::Result<Vec<T>> {
        self.begin_load()?;
        let rows: Vec<T> = self
            .rows
            .lock()
            .iter()
            .filter(|row| row.id().map_or(true, |id| !identifiers.contains(&id)))
            .cloned()
            .collect();
        debug!(
            "Loaded {} {} rows excluding {} cached identifiers",
            rows.len(),
            T::ENTITY_TYPE,
            identifiers.len()
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: Option<u64>,
        label: &'static str,
    }

    impl Record for Row {
        type Id = u64;
        const ENTITY_TYPE: &'static str = "Row";

        fn id(&self) -> Option<u64> {
            self.id
        }
    }

    fn row(id: u64, label: &'static str) -> Row {
        Row { id: Some(id), label }
    }

    #[tokio::test]
    async fn test_load_excluding_filters_identifiers() {
        let store = MemoryStore::with_rows(vec![row(1, "a"), row(2, "b"), row(3, "c")]);

        let excluded: HashSet<u64> = [2].into_iter().collect();
        let rows = store.load_excluding(&excluded).await.unwrap();

        assert_eq!(rows, vec![row(1, "a"), row(3, "c")]);
        assert_eq!(store.load_calls(), 1);
    }

    #[tokio::test]
    async fn test_insert_replaces_same_identifier() {
        let store = MemoryStore::new();
        store.insert(row(1, "a"));
        store.insert(row(1, "b"));

        let rows = store.load_all().await.unwrap();
        assert_eq!(rows, vec![row(1, "b")]);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::with_rows(vec![row(1, "a"), row(2, "b")]);

        assert_eq!(store.remove(&1), Some(row(1, "a")));
        assert_eq!(store.remove(&1), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let store = MemoryStore::with_rows(vec![row(1, "a")]);
        store.fail_next_load("connection reset");

        let err = store.load_all().await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");

        assert_eq!(store.load_all().await.unwrap().len(), 1);
        assert_eq!(store.load_calls(), 2);
    }

    #[tokio::test]
    async fn test_shared_store_through_arc() {
        let store = Arc::new(MemoryStore::with_rows(vec![row(1, "a")]));
        let handle: Arc<MemoryStore<Row>> = Arc::clone(&store);

        let rows = RecordStore::<Row>::load_all(&handle).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.load_calls(), 1);
    }
}
