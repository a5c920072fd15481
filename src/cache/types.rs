//! Core type definitions for the identity cache

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key type for nested caches - the identifier's display form, or a composite
/// key built with [`ViewKeyBuilder`](crate::cache::ViewKeyBuilder)
pub type ViewKey = String;

/// Name of the ordered pseudo-view holding every record
pub const ALL_VIEW: &str = "all";

/// Default name of the identifier-keyed nested cache
pub const MODEL_VIEW: &str = "model";

/// Population state of an identity cache
///
/// A miss is only authoritative once the cache is `Populated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PopulationState {
    /// No bulk load has completed yet
    #[default]
    Unpopulated,

    /// A bulk load is in flight
    Populating,

    /// Every persisted record is known to the cache
    Populated,
}

impl fmt::Display for PopulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopulationState::Unpopulated => write!(f, "unpopulated"),
            PopulationState::Populating => write!(f, "populating"),
            PopulationState::Populated => write!(f, "populated"),
        }
    }
}

/// Statistics for identity cache monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Lookups answered from a nested cache
    pub hits: u64,

    /// Lookups that missed their nested cache (before any retry)
    pub misses: u64,

    /// Completed populations
    pub populations: u64,

    /// Populations that failed in the backing store
    pub failed_populations: u64,

    /// Records added to the cache by population or `notify_loaded`
    pub records_loaded: u64,

    /// Loaded records dropped because their identifier was already cached
    pub records_skipped: u64,

    /// Create notifications applied
    pub creates: u64,

    /// Delete notifications applied
    pub deletes: u64,

    /// Records currently held by the identifier-keyed view
    pub entries: usize,
}

impl CacheStats {
    /// Calculate lookup hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate lookup miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, populations: {}, creates: {}, deletes: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.populations,
            self.creates,
            self.deletes
        )
    }
}
