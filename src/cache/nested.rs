//! Nested caches and the per-entity registry that owns them
//!
//! A nested cache is one named, independently keyed view over the records of
//! an entity type. The registry keeps one instance per name, in registration
//! order, together with the add/remove hooks the view synchronizer invokes.

use crate::cache::types::ViewKey;
use crate::error::Result;
use crate::record::{Record, RecordRef};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Callback applied to a nested cache when a record is added or removed
pub type ViewFn<T> = Box<dyn Fn(&mut NestedCache<T>, &RecordRef<T>) -> Result<()> + Send + Sync>;

/// Keyed map from view key to shared record, iterated in insertion order
pub struct NestedCache<T> {
    /// Main storage: key -> record
    entries: HashMap<ViewKey, RecordRef<T>>,

    /// Insertion order of keys
    order: VecDeque<ViewKey>,
}

impl<T: Record> NestedCache<T> {
    /// Create an empty nested cache
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Store `record` under `key`, returning the record it replaced
    ///
    /// Replacing keeps the key's original position.
    pub fn insert(&mut self, key: ViewKey, record: RecordRef<T>) -> Option<RecordRef<T>> {
        if let Some(existing) = self.entries.get_mut(&key) {
            return Some(std::mem::replace(existing, record));
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, record);
        None
    }

    /// Remove the entry at `key`
    pub fn remove(&mut self, key: &str) -> Option<RecordRef<T>> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    /// Get the record stored at `key`
    pub fn get(&self, key: &str) -> Option<&RecordRef<T>> {
        self.entries.get(key)
    }

    /// Check if a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the nested cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &ViewKey> {
        self.order.iter()
    }

    /// Records in insertion order
    pub fn values(&self) -> impl Iterator<Item = &RecordRef<T>> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&ViewKey, &RecordRef<T>)> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|record| (key, record)))
    }
}

impl<T: Record> Default for NestedCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Add/remove pair registered with a nested cache
pub struct ViewHooks<T> {
    pub(crate) add: ViewFn<T>,
    pub(crate) remove: ViewFn<T>,
}

impl<T: Record> ViewHooks<T> {
    /// Hooks from explicit add and remove callbacks
    pub fn new<A, R>(add: A, remove: R) -> Self
    where
        A: Fn(&mut NestedCache<T>, &RecordRef<T>) -> Result<()> + Send + Sync + 'static,
        R: Fn(&mut NestedCache<T>, &RecordRef<T>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            add: Box::new(add),
            remove: Box::new(remove),
        }
    }

    /// Hooks for a view keyed by a key derived from the record
    ///
    /// Records for which `key_fn` yields `None` are not indexed. The hooks
    /// remember the key each identifier was indexed under, so removal finds
    /// the entry even after the keyed fields were mutated. Removal only drops
    /// the entry if it still belongs to the removed record's identifier, so
    /// two records colliding on one key never evict each other.
    pub fn keyed<F>(key_fn: F) -> Self
    where
        F: Fn(&T) -> Option<ViewKey> + Send + Sync + 'static,
    {
        // identifier -> key it was indexed under
        let indexed: Arc<Mutex<HashMap<T::Id, ViewKey>>> = Arc::new(Mutex::new(HashMap::new()));
        let add_indexed = Arc::clone(&indexed);

        Self::new(
            move |cache, record| {
                let (id, key) = {
                    let guard = record.read();
                    (guard.id(), key_fn(&*guard))
                };
                let Some(key) = key else {
                    return Ok(());
                };

                if let Some(id) = id {
                    let previous = add_indexed.lock().insert(id, key.clone());
                    if let Some(previous) = previous.filter(|previous| *previous != key) {
                        remove_owned(cache, &previous, record);
                    }
                }
                cache.insert(key, record.clone());
                Ok(())
            },
            move |cache, record| {
                let key = record.id().and_then(|id| indexed.lock().remove(&id));
                if let Some(key) = key {
                    remove_owned(cache, &key, record);
                }
                Ok(())
            },
        )
    }

    /// Hooks for the identifier-keyed view
    pub fn by_identifier() -> Self {
        Self::keyed(|record: &T| record.id().map(|id| id.to_string()))
    }
}

/// Drop the entry at `key` if it holds `record`
fn remove_owned<T: Record>(cache: &mut NestedCache<T>, key: &str, record: &RecordRef<T>) {
    if cache.get(key).map_or(false, |held| held == record) {
        cache.remove(key);
    }
}

struct NestedView<T> {
    name: String,
    cache: NestedCache<T>,
    hooks: Option<ViewHooks<T>>,
}

/// Named nested caches of one entity type, in registration order
pub struct NestedCacheRegistry<T> {
    views: Vec<NestedView<T>>,
}

impl<T: Record> NestedCacheRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { views: Vec::new() }
    }

    /// Get the nested cache for `name`, creating an empty one on first use
    pub fn get_or_create(&mut self, name: &str) -> &mut NestedCache<T> {
        let index = self.ensure(name);
        &mut self.views[index].cache
    }

    /// Get the nested cache for `name`, if it exists
    pub fn get(&self, name: &str) -> Option<&NestedCache<T>> {
        self.position(name).map(|index| &self.views[index].cache)
    }

    /// Check if a nested cache named `name` exists
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Check if `name` exists and has hooks attached
    pub fn has_hooks(&self, name: &str) -> bool {
        self.position(name)
            .map_or(false, |index| self.views[index].hooks.is_some())
    }

    /// Names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.views.iter().map(|view| view.name.as_str())
    }

    /// Number of nested caches
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Check if the registry has no nested caches
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Apply `f` to every `(name, nested cache)` pair in registration order
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &NestedCache<T>),
    {
        for view in &self.views {
            f(&view.name, &view.cache);
        }
    }

    /// Attach hooks to `name`, creating the nested cache if needed
    ///
    /// Returns the view's index so the caller can backfill it through [`apply`](Self::apply).
    pub(crate) fn attach(&mut self, name: &str, hooks: ViewHooks<T>) -> usize {
        let index = self.ensure(name);
        self.views[index].hooks = Some(hooks);
        index
    }

    /// Drop the hooks of the view at `index` and empty its cache
    pub(crate) fn detach(&mut self, index: usize) {
        if let Some(view) = self.views.get_mut(index) {
            view.hooks = None;
            view.cache = NestedCache::new();
        }
    }

    /// Run the add (or remove) hook of the view at `index` against `record`
    pub(crate) fn apply(&mut self, index: usize, record: &RecordRef<T>, adding: bool) -> Option<Result<()>> {
        let view = self.views.get_mut(index)?;
        let hooks = view.hooks.as_ref()?;
        let hook = if adding { &hooks.add } else { &hooks.remove };
        Some(hook(&mut view.cache, record))
    }

    /// Nested cache at `index`
    pub(crate) fn cache_at(&self, index: usize) -> &NestedCache<T> {
        &self.views[index].cache
    }

    /// Name of the view at `index`
    pub(crate) fn name_at(&self, index: usize) -> &str {
        &self.views[index].name
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.views.iter().position(|view| view.name == name)
    }

    fn ensure(&mut self, name: &str) -> usize {
        if let Some(index) = self.position(name) {
            return index;
        }
        self.views.push(NestedView {
            name: name.to_string(),
            cache: NestedCache::new(),
            hooks: None,
        });
        self.views.len() - 1
    }
}

impl<T: Record> Default for NestedCacheRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for composite nested-cache keys
///
/// Produces `primary` or `primary?k1=v1&k2=v2`, parameters in insertion order.
/// Every component is percent-encoded, so `?`, `&` and `=` inside a value
/// cannot make two different parameter sets build the same key.
pub struct ViewKeyBuilder {
    primary: String,
    params: Vec<(String, String)>,
}

impl ViewKeyBuilder {
    /// Create a new key builder with a primary component
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter to the key
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Build the view key
    pub fn build(self) -> ViewKey {
        let mut key = urlencoding::encode(&self.primary).into_owned();

        if !self.params.is_empty() {
            let params_str: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            key.push('?');
            key.push_str(&params_str.join("&"));
        }

        key
    }
}
