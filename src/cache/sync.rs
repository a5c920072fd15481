//! View synchronization
//!
//! Every lifecycle event of a record is fanned out to the "all" pseudo-view
//! and then to every nested cache with hooks, in registration order. A failing
//! hook stops the fan-out; views already updated are not rolled back.

use crate::cache::nested::NestedCacheRegistry;
use crate::cache::types::ALL_VIEW;
use crate::error::{IdentityCacheError, Result};
use crate::record::{Record, RecordRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, error};

/// Ordered pseudo-view of every record
///
/// Stays unmaterialized until the first population, so no "all" buffer is
/// built before anyone asked for it.
pub struct AllView<T> {
    records: Option<Vec<RecordRef<T>>>,
}

impl<T: Record> AllView<T> {
    /// Create an unmaterialized view
    pub fn new() -> Self {
        Self { records: None }
    }

    /// Check if the view has been materialized
    pub fn is_materialized(&self) -> bool {
        self.records.is_some()
    }

    /// Materialize the view from `records`, replacing any previous content
    pub fn materialize(&mut self, records: impl IntoIterator<Item = RecordRef<T>>) {
        self.records = Some(records.into_iter().collect());
    }

    /// Records in insertion/load order (empty while unmaterialized)
    pub fn as_slice(&self) -> &[RecordRef<T>] {
        self.records.as_deref().unwrap_or(&[])
    }

    /// Number of records in the view
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Check if the view holds no records
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Append `record` if materialized. Returns whether the view changed.
    pub(crate) fn add(&mut self, record: &RecordRef<T>) -> bool {
        match self.records.as_mut() {
            Some(records) => {
                records.push(record.clone());
                true
            }
            None => false,
        }
    }

    /// Remove `record` by identifier if materialized. Returns whether anything was removed.
    pub(crate) fn remove(&mut self, record: &RecordRef<T>) -> bool {
        match self.records.as_mut() {
            Some(records) => {
                let before = records.len();
                records.retain(|held| held != record);
                records.len() != before
            }
            None => false,
        }
    }
}

impl<T: Record> Default for AllView<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of lifecycle event applied to the views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Record was persisted locally
    Created,

    /// Record was materialized from the backing store
    Loaded,

    /// Record was deleted
    Deleted,

    /// Record was re-keyed after a field change
    Updated,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Created => write!(f, "created"),
            SyncKind::Loaded => write!(f, "loaded"),
            SyncKind::Deleted => write!(f, "deleted"),
            SyncKind::Updated => write!(f, "updated"),
        }
    }
}

/// One fan-out applied to the views of an entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    /// What happened to the record
    pub kind: SyncKind,

    /// Entity type of the record
    pub entity_type: String,

    /// Record identifier
    pub identifier: String,

    /// Views that applied the event, in fan-out order
    pub views: Vec<String>,

    /// When the fan-out completed
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    /// Create a new sync event stamped with the current time
    pub fn new(kind: SyncKind, entity_type: &str, identifier: String, views: Vec<String>) -> Self {
        Self {
            kind,
            entity_type: entity_type.to_string(),
            identifier,
            views,
            timestamp: Utc::now(),
        }
    }
}

/// Bounded log of recent sync events; the oldest event is dropped first
pub(crate) struct SyncLog {
    capacity: usize,
    events: VecDeque<SyncEvent>,
}

impl SyncLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub(crate) fn record(&mut self, event: SyncEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &SyncEvent> {
        self.events.iter()
    }
}

/// Fan an add out to every view. Returns the names of the views that applied it.
pub(crate) fn add_to_views<T: Record>(
    all: &mut AllView<T>,
    registry: &mut NestedCacheRegistry<T>,
    record: &RecordRef<T>,
) -> Result<Vec<String>> {
    fan_out(all, registry, record, true)
}

/// Fan a remove out to every view. Returns the names of the views that applied it.
pub(crate) fn remove_from_views<T: Record>(
    all: &mut AllView<T>,
    registry: &mut NestedCacheRegistry<T>,
    record: &RecordRef<T>,
) -> Result<Vec<String>> {
    fan_out(all, registry, record, false)
}

fn fan_out<T: Record>(
    all: &mut AllView<T>,
    registry: &mut NestedCacheRegistry<T>,
    record: &RecordRef<T>,
    adding: bool,
) -> Result<Vec<String>> {
    let mut touched = Vec::with_capacity(registry.len() + 1);

    let all_changed = if adding {
        all.add(record)
    } else {
        all.remove(record)
    };
    if all_changed {
        touched.push(ALL_VIEW.to_string());
    }

    for index in 0..registry.len() {
        if let Some(outcome) = registry.apply(index, record, adding) {
            settle(registry, index, outcome, &mut touched)?;
        }
    }

    debug!(
        "Fanned {} {} out to {:?}",
        if adding { "add" } else { "remove" },
        T::ENTITY_TYPE,
        touched
    );
    Ok(touched)
}

/// Re-key `record` in every nested cache except the one at `skip`
///
/// Each view runs its remove hook and then its add hook. Returns the names of
/// the views that applied it.
pub(crate) fn reindex_views<T: Record>(
    registry: &mut NestedCacheRegistry<T>,
    record: &RecordRef<T>,
    skip: usize,
) -> Result<Vec<String>> {
    let mut touched = Vec::with_capacity(registry.len());

    for index in (0..registry.len()).filter(|&index| index != skip) {
        let outcome = match registry.apply(index, record, false) {
            Some(Ok(())) => registry.apply(index, record, true).unwrap_or(Ok(())),
            Some(Err(e)) => Err(e),
            None => continue,
        };
        settle(registry, index, outcome, &mut touched)?;
    }

    debug!("Re-keyed {} in {:?}", T::ENTITY_TYPE, touched);
    Ok(touched)
}

fn settle<T: Record>(
    registry: &NestedCacheRegistry<T>,
    index: usize,
    outcome: Result<()>,
    touched: &mut Vec<String>,
) -> Result<()> {
    let view = registry.name_at(index).to_string();
    match outcome {
        Ok(()) => {
            touched.push(view);
            Ok(())
        }
        Err(e) => {
            error!(
                "{} view '{}' failed during fan-out after {:?}: {}",
                T::ENTITY_TYPE,
                view,
                touched,
                e
            );
            Err(IdentityCacheError::ViewCallback {
                view,
                source: Box::new(e),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::nested::ViewHooks;

    #[derive(Debug)]
    struct Entity {
        id: u32,
        code: &'static str,
    }

    impl Record for Entity {
        type Id = u32;
        const ENTITY_TYPE: &'static str = "Entity";

        fn id(&self) -> Option<u32> {
            Some(self.id)
        }
    }

    fn entity(id: u32, code: &'static str) -> RecordRef<Entity> {
        RecordRef::new(Entity { id, code })
    }

    fn registry() -> NestedCacheRegistry<Entity> {
        let mut registry = NestedCacheRegistry::new();
        registry.attach("model", ViewHooks::by_identifier());
        registry.attach(
            "by_code",
            ViewHooks::keyed(|e: &Entity| Some(e.code.to_string())),
        );
        registry
    }

    #[test]
    fn test_add_skips_unmaterialized_all_view() {
        let mut all = AllView::new();
        let mut registry = registry();

        let touched = add_to_views(&mut all, &mut registry, &entity(1, "x")).unwrap();

        assert_eq!(touched, vec!["model", "by_code"]);
        assert!(!all.is_materialized());
        assert!(all.is_empty());
        assert_eq!(registry.get("model").unwrap().len(), 1);
    }

    #[test]
    fn test_add_and_remove_reach_every_view() {
        let mut all = AllView::new();
        all.materialize(Vec::new());
        let mut registry = registry();

        let record = entity(1, "x");
        let touched = add_to_views(&mut all, &mut registry, &record).unwrap();
        assert_eq!(touched, vec!["all", "model", "by_code"]);
        assert_eq!(all.len(), 1);

        // a different handle with the same identifier removes by identifier
        let touched = remove_from_views(&mut all, &mut registry, &entity(1, "x")).unwrap();
        assert_eq!(touched, vec!["all", "model", "by_code"]);
        assert!(all.is_empty());
        assert!(registry.get("model").unwrap().is_empty());
        assert!(registry.get("by_code").unwrap().is_empty());
    }

    #[test]
    fn test_remove_of_unknown_record_leaves_all_untouched() {
        let mut all = AllView::new();
        all.materialize(vec![entity(1, "x")]);
        let mut registry = registry();

        let touched = remove_from_views(&mut all, &mut registry, &entity(2, "y")).unwrap();

        assert!(!touched.contains(&ALL_VIEW.to_string()));
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_reindex_moves_keyed_entry_and_skips_model() {
        let mut all = AllView::new();
        let mut registry = registry();
        let record = entity(1, "x");
        add_to_views(&mut all, &mut registry, &record).unwrap();

        record.write().code = "y";
        let touched = reindex_views(&mut registry, &record, 0).unwrap();

        assert_eq!(touched, vec!["by_code"]);
        let by_code = registry.get("by_code").unwrap();
        assert!(!by_code.contains_key("x"));
        assert!(by_code.get("y").unwrap().ptr_eq(&record));
        assert!(registry.get("model").unwrap().contains_key("1"));
    }

    #[test]
    fn test_views_without_hooks_are_skipped() {
        let mut all = AllView::new();
        let mut registry = registry();
        registry.get_or_create("scratch");

        let touched = add_to_views(&mut all, &mut registry, &entity(1, "x")).unwrap();

        assert!(!touched.contains(&"scratch".to_string()));
        assert!(registry.get("scratch").unwrap().is_empty());
    }

    #[test]
    fn test_failing_hook_does_not_roll_back() {
        let mut all = AllView::new();
        let mut registry = registry();
        registry.attach(
            "broken",
            ViewHooks::new(|_, _| Err("index full".into()), |_, _| Ok(())),
        );
        registry.attach("after", ViewHooks::by_identifier());

        let err = add_to_views(&mut all, &mut registry, &entity(1, "x")).unwrap_err();

        assert!(matches!(
            err,
            IdentityCacheError::ViewCallback { ref view, .. } if view == "broken"
        ));
        assert_eq!(registry.get("model").unwrap().len(), 1);
        assert_eq!(registry.get("by_code").unwrap().len(), 1);
        assert!(registry.get("after").unwrap().is_empty());
    }

    #[test]
    fn test_sync_log_is_bounded() {
        let mut log = SyncLog::new(2);
        for id in 1..=3 {
            log.record(SyncEvent::new(
                SyncKind::Created,
                "Entity",
                id.to_string(),
                vec!["model".to_string()],
            ));
        }

        let ids: Vec<&str> = log.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);

        let mut disabled = SyncLog::new(0);
        disabled.record(SyncEvent::new(SyncKind::Deleted, "Entity", "1".to_string(), vec![]));
        assert_eq!(disabled.iter().count(), 0);
    }

    #[test]
    fn test_sync_kind_display() {
        assert_eq!(SyncKind::Created.to_string(), "created");
        assert_eq!(SyncKind::Loaded.to_string(), "loaded");
        assert_eq!(SyncKind::Deleted.to_string(), "deleted");
        assert_eq!(SyncKind::Updated.to_string(), "updated");
    }
}
