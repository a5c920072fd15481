//! Identity cache: lazy population and lifecycle hooks for one entity type

use crate::adapter::RecordStore;
use crate::cache::{
    config::IdentityCacheConfig,
    nested::{NestedCache, NestedCacheRegistry, ViewHooks},
    sync::{self, AllView, SyncEvent, SyncKind, SyncLog},
    types::{CacheStats, PopulationState, ViewKey, ALL_VIEW},
};
use crate::error::{IdentityCacheError, Result};
use crate::record::{Record, RecordRef};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Identity cache bound to one entity type
///
/// This implementation provides:
/// - One in-memory [`RecordRef`] per identifier, shared by every view
/// - Lazy population: the backing store is bulk-loaded at most once, on the
///   first `all()` or on the first `find()` miss
/// - Explicit lifecycle notifications fanned out to every registered view
///
/// The cache is owned by one sequential execution context and takes
/// `&mut self` for every operation that can change it. Wrap it in a
/// [`SharedIdentityCache`](crate::cache::SharedIdentityCache) to share it
/// between tasks.
pub struct IdentityCache<T: Record, S> {
    /// Cache configuration
    config: IdentityCacheConfig,

    /// Backing store adapter
    store: S,

    /// Ordered "all" pseudo-view
    all: AllView<T>,

    /// Named nested caches, including the identifier-keyed model view
    registry: NestedCacheRegistry<T>,

    /// Registry index of the model view
    model_index: usize,

    /// Population state machine
    state: PopulationState,

    /// Current cache statistics
    stats: CacheStats,

    /// Recent fan-outs
    events: SyncLog,
}

/// Resets the population state if a load does not complete
///
/// Covers both an adapter error and the load future being dropped.
struct PopulationGuard<'a> {
    state: &'a mut PopulationState,
    reset: bool,
    armed: bool,
}

impl<'a> PopulationGuard<'a> {
    fn begin(state: &'a mut PopulationState, reset: bool) -> Self {
        *state = PopulationState::Populating;
        Self {
            state,
            reset,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PopulationGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.reset {
            *self.state = PopulationState::Unpopulated;
        }
    }
}

impl<T: Record, S: RecordStore<T>> IdentityCache<T, S> {
    /// Create a cache with the default configuration
    pub fn new(store: S) -> Self {
        Self::build(store, IdentityCacheConfig::default())
    }

    /// Create a cache with a custom configuration
    pub fn with_config(store: S, config: IdentityCacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    fn build(store: S, config: IdentityCacheConfig) -> Self {
        info!(
            "Initializing {} identity cache with config: {:?}",
            T::ENTITY_TYPE,
            config
        );

        let mut registry = NestedCacheRegistry::new();
        let model_index = registry.attach(&config.model_view, ViewHooks::by_identifier());

        Self {
            events: SyncLog::new(config.event_log_capacity),
            config,
            store,
            all: AllView::new(),
            registry,
            model_index,
            state: PopulationState::Unpopulated,
            stats: CacheStats::default(),
        }
    }

    /// Entity type served by this cache
    pub fn entity_type(&self) -> &'static str {
        T::ENTITY_TYPE
    }

    /// Cache configuration
    pub fn config(&self) -> &IdentityCacheConfig {
        &self.config
    }

    /// Current population state
    pub fn state(&self) -> PopulationState {
        self.state
    }

    /// Check if every persisted record is known to the cache
    pub fn is_populated(&self) -> bool {
        self.state == PopulationState::Populated
    }

    /// Backing store adapter
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read-only access to the nested caches
    pub fn registry(&self) -> &NestedCacheRegistry<T> {
        &self.registry
    }

    /// The identifier-keyed nested cache
    pub fn model(&self) -> &NestedCache<T> {
        self.registry.cache_at(self.model_index)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.entries = self.model().len();
        stats
    }

    /// Recent fan-outs, oldest first
    pub fn recent_events(&self) -> impl Iterator<Item = &SyncEvent> {
        self.events.iter()
    }

    /// Register a nested cache with explicit add/remove callbacks
    ///
    /// Records already cached are replayed through `add_fn` before this
    /// returns, so the new view starts consistent with the others. If the
    /// replay fails the view is detached and emptied, and the name can be
    /// registered again.
    pub fn register_view<A, R>(&mut self, name: &str, add_fn: A, remove_fn: R) -> Result<()>
    where
        A: Fn(&mut NestedCache<T>, &RecordRef<T>) -> Result<()> + Send + Sync + 'static,
        R: Fn(&mut NestedCache<T>, &RecordRef<T>) -> Result<()> + Send + Sync + 'static,
    {
        self.register_hooks(name, ViewHooks::new(add_fn, remove_fn))
    }

    /// Register a nested cache keyed by a key derived from each record
    pub fn register_keyed_view<F>(&mut self, name: &str, key_fn: F) -> Result<()>
    where
        F: Fn(&T) -> Option<ViewKey> + Send + Sync + 'static,
    {
        self.register_hooks(name, ViewHooks::keyed(key_fn))
    }

    fn register_hooks(&mut self, name: &str, hooks: ViewHooks<T>) -> Result<()> {
        if name == ALL_VIEW || self.registry.has_hooks(name) {
            return Err(IdentityCacheError::ViewAlreadyRegistered {
                entity_type: T::ENTITY_TYPE,
                view: name.to_string(),
            });
        }

        let existing: Vec<RecordRef<T>> = self.model().values().cloned().collect();
        let index = self.registry.attach(name, hooks);

        for record in &existing {
            if let Some(Err(e)) = self.registry.apply(index, record, true) {
                self.registry.detach(index);
                warn!(
                    "{} view '{}' failed during backfill and was detached: {}",
                    T::ENTITY_TYPE,
                    name,
                    e
                );
                return Err(IdentityCacheError::ViewCallback {
                    view: name.to_string(),
                    source: Box::new(e),
                });
            }
        }

        debug!(
            "Registered {} view '{}' (backfilled {} records)",
            T::ENTITY_TYPE,
            name,
            existing.len()
        );
        Ok(())
    }

    /// Every known persisted record, in insertion/load order
    ///
    /// Populates the cache on first use. Once populated, returns the same
    /// cached view without touching the backing store.
    pub async fn all(&mut self) -> Result<&[RecordRef<T>]> {
        if !self.is_populated() {
            self.populate().await?;
        }
        Ok(self.all.as_slice())
    }

    /// Find a record by identifier
    ///
    /// A miss on an unpopulated cache populates it and retries once. A miss on
    /// a populated cache fails immediately with `RecordNotFound`.
    pub async fn find(&mut self, id: &T::Id) -> Result<RecordRef<T>> {
        let view = self.config.model_view.clone();
        self.find_by(&view, &id.to_string()).await
    }

    /// Find a record through any registered nested cache
    pub async fn find_by(&mut self, view: &str, key: &str) -> Result<RecordRef<T>> {
        if let Some(record) = self.lookup(view, key)? {
            return Ok(record);
        }

        if !self.is_populated() {
            self.populate().await?;
            if let Some(record) = self.peek(view, key) {
                return Ok(record);
            }
        }

        Err(IdentityCacheError::RecordNotFound {
            entity_type: T::ENTITY_TYPE,
            identifier: key.to_string(),
        })
    }

    /// Lifecycle hook: a record was persisted and has its identifier
    ///
    /// Returns the shared handle every view now holds.
    pub fn notify_created(&mut self, record: impl Into<RecordRef<T>>) -> Result<RecordRef<T>> {
        let record = record.into();
        let id = self.require_id(&record, "create")?;

        if self.model().contains_key(&id) {
            return Err(IdentityCacheError::DuplicateRecord {
                entity_type: T::ENTITY_TYPE,
                identifier: id,
            });
        }

        let views = sync::add_to_views(&mut self.all, &mut self.registry, &record)?;
        self.count(|stats| stats.creates += 1);
        self.log_event(SyncKind::Created, id, views);
        Ok(record)
    }

    /// Lifecycle hook: a persisted record was materialized from the store
    ///
    /// If the identifier is already cached the existing handle is returned and
    /// `record` is discarded, keeping one representative per identifier.
    pub fn notify_loaded(&mut self, record: impl Into<RecordRef<T>>) -> Result<RecordRef<T>> {
        let record = record.into();
        let id = self.require_id(&record, "load")?;

        if let Some(existing) = self.model().get(&id) {
            return Ok(existing.clone());
        }

        let views = sync::add_to_views(&mut self.all, &mut self.registry, &record)?;
        self.count(|stats| stats.records_loaded += 1);
        self.log_event(SyncKind::Loaded, id, views);
        Ok(record)
    }

    /// Lifecycle hook: a record was durably removed
    ///
    /// The record is removed from every view by identifier. Deleting a record
    /// the cache never held changes nothing and is not counted.
    pub fn notify_deleted(&mut self, record: &RecordRef<T>) -> Result<()> {
        let id = self.require_id(record, "delete")?;
        let cached = self.model().contains_key(&id);

        let views = sync::remove_from_views(&mut self.all, &mut self.registry, record)?;
        if !cached {
            debug!("{} id={} was not cached; nothing deleted", T::ENTITY_TYPE, id);
            return Ok(());
        }

        self.count(|stats| stats.deletes += 1);
        self.log_event(SyncKind::Deleted, id, views);
        Ok(())
    }

    /// Lifecycle hook: fields of a cached record were changed in place
    ///
    /// Views keyed by derived fields drop the key the record was indexed
    /// under and index it under its current key. The model view and "all"
    /// are left as they are.
    pub fn notify_updated(&mut self, record: &RecordRef<T>) -> Result<()> {
        let id = self.require_id(record, "update")?;
        let cached = self
            .model()
            .get(&id)
            .cloned()
            .ok_or_else(|| IdentityCacheError::RecordNotFound {
                entity_type: T::ENTITY_TYPE,
                identifier: id.clone(),
            })?;

        let views = sync::reindex_views(&mut self.registry, &cached, self.model_index)?;
        self.log_event(SyncKind::Updated, id, views);
        Ok(())
    }

    /// Populate the cache from the backing store
    ///
    /// Records already in the model view are excluded from the load, so local
    /// creations made before population are neither reloaded nor replaced.
    async fn populate(&mut self) -> Result<()> {
        match self.state {
            PopulationState::Populated => return Ok(()),
            PopulationState::Populating => {
                warn!("{} population re-entered while in flight", T::ENTITY_TYPE);
                return Err(IdentityCacheError::PopulationInProgress {
                    entity_type: T::ENTITY_TYPE,
                });
            }
            PopulationState::Unpopulated => {}
        }

        let excluded: HashSet<T::Id> = self.model().values().filter_map(|r| r.id()).collect();
        info!(
            "Populating {} cache ({} records already cached)",
            T::ENTITY_TYPE,
            excluded.len()
        );

        let loaded = {
            let guard = PopulationGuard::begin(&mut self.state, self.config.reset_on_load_failure);
            let result = if excluded.is_empty() {
                self.store.load_all().await
            } else {
                self.store.load_excluding(&excluded).await
            };

            match result {
                Ok(records) => {
                    guard.disarm();
                    records
                }
                Err(e) => {
                    drop(guard);
                    if self.config.enable_metrics {
                        self.stats.failed_populations += 1;
                    }
                    warn!("{} population failed: {}", T::ENTITY_TYPE, e);
                    return Err(IdentityCacheError::Store(e));
                }
            }
        };

        let count = loaded.len();
        for record in loaded {
            if let Err(e) = self.apply_loaded(record) {
                if self.config.reset_on_load_failure {
                    self.state = PopulationState::Unpopulated;
                }
                return Err(e);
            }
        }

        let model: Vec<RecordRef<T>> = self.model().values().cloned().collect();
        self.all.materialize(model);
        self.state = PopulationState::Populated;
        self.count(|stats| stats.populations += 1);

        info!(
            "Populated {} cache: {} loaded, {} total",
            T::ENTITY_TYPE,
            count,
            self.all.len()
        );
        Ok(())
    }

    /// Fan one record from a bulk load into the views
    fn apply_loaded(&mut self, record: T) -> Result<()> {
        let id = match record.id() {
            Some(id) => id.to_string(),
            None => {
                warn!("Skipping {} record without identifier", T::ENTITY_TYPE);
                self.count(|stats| stats.records_skipped += 1);
                return Ok(());
            }
        };

        if self.model().contains_key(&id) {
            warn!(
                "Skipping {} id={} returned by the store although already cached",
                T::ENTITY_TYPE,
                id
            );
            self.count(|stats| stats.records_skipped += 1);
            return Ok(());
        }

        let record = RecordRef::new(record);
        let views = sync::add_to_views(&mut self.all, &mut self.registry, &record)?;
        self.count(|stats| stats.records_loaded += 1);
        self.log_event(SyncKind::Loaded, id, views);
        Ok(())
    }

    fn lookup(&mut self, view: &str, key: &str) -> Result<Option<RecordRef<T>>> {
        let cache = self
            .registry
            .get(view)
            .ok_or_else(|| IdentityCacheError::UnknownView {
                entity_type: T::ENTITY_TYPE,
                view: view.to_string(),
            })?;

        match cache.get(key).cloned() {
            Some(record) => {
                debug!("{} cache hit: {}[{}]", T::ENTITY_TYPE, view, key);
                self.count(|stats| stats.hits += 1);
                Ok(Some(record))
            }
            None => {
                debug!("{} cache miss: {}[{}]", T::ENTITY_TYPE, view, key);
                self.count(|stats| stats.misses += 1);
                Ok(None)
            }
        }
    }

    fn peek(&self, view: &str, key: &str) -> Option<RecordRef<T>> {
        self.registry.get(view)?.get(key).cloned()
    }

    fn require_id(&self, record: &RecordRef<T>, operation: &'static str) -> Result<String> {
        record
            .id()
            .map(|id| id.to_string())
            .ok_or(IdentityCacheError::MissingIdentifier {
                entity_type: T::ENTITY_TYPE,
                operation,
            })
    }

    fn count(&mut self, update: impl FnOnce(&mut CacheStats)) {
        if self.config.enable_metrics {
            update(&mut self.stats);
        }
    }

    fn log_event(&mut self, kind: SyncKind, identifier: String, views: Vec<String>) {
        self.events
            .record(SyncEvent::new(kind, T::ENTITY_TYPE, identifier, views));
    }
}
