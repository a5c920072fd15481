//! Record trait and shared record handles
//!
//! Every view of an identity cache holds the same [`RecordRef`] for a given
//! identifier, so a field written through one view is visible through all of
//! them.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A persisted entity that can live in an identity cache
///
/// The identifier is `None` while the record is transient and becomes `Some`
/// exactly once, when the persistence layer assigns it.
pub trait Record: Send + Sync + 'static {
    /// Stable identifier type
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Entity type name used in errors and log lines
    const ENTITY_TYPE: &'static str;

    /// Identifier, if the record has been persisted
    fn id(&self) -> Option<Self::Id>;

    /// Check if the record has been persisted
    fn is_persisted(&self) -> bool {
        self.id().is_some()
    }
}

/// Shared handle to a cached record
///
/// Cloning the handle never clones the record. Equality is identifier
/// equality; use [`RecordRef::ptr_eq`] to compare identity of the handle.
///
/// The identifier must not be changed through [`RecordRef::write`]; views are
/// keyed on it.
pub struct RecordRef<T>(Arc<RwLock<T>>);

impl<T: Record> RecordRef<T> {
    /// Wrap a record in a new shared handle
    pub fn new(record: T) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    /// Current identifier of the record
    pub fn id(&self) -> Option<T::Id> {
        self.0.read().id()
    }

    /// Lock the record for reading
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// Lock the record for writing
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Check whether two handles point at the same in-memory record
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for RecordRef<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Record> From<T> for RecordRef<T> {
    fn from(record: T) -> Self {
        RecordRef::new(record)
    }
}

impl<T: Record> PartialEq for RecordRef<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match self.id() {
            Some(id) => other.id() == Some(id),
            None => false,
        }
    }
}

impl<T: Record + fmt::Debug> fmt::Debug for RecordRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordRef").field(&*self.0.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: Option<u32>,
        body: String,
    }

    impl Record for Note {
        type Id = u32;
        const ENTITY_TYPE: &'static str = "Note";

        fn id(&self) -> Option<u32> {
            self.id
        }
    }

    #[test]
    fn test_clone_shares_record() {
        let first = RecordRef::new(Note {
            id: Some(1),
            body: "draft".to_string(),
        });
        let second = first.clone();

        second.write().body = "final".to_string();

        assert_eq!(first.read().body, "final");
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_equality_is_by_identifier() {
        let a = RecordRef::new(Note {
            id: Some(7),
            body: "a".to_string(),
        });
        let b = RecordRef::new(Note {
            id: Some(7),
            body: "b".to_string(),
        });
        let c = RecordRef::new(Note {
            id: Some(8),
            body: "a".to_string(),
        });

        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn test_transient_records_only_equal_themselves() {
        let a = RecordRef::new(Note {
            id: None,
            body: "x".to_string(),
        });
        let b = RecordRef::new(Note {
            id: None,
            body: "x".to_string(),
        });

        assert!(!a.read().is_persisted());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
