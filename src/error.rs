//! Error types for identity cache operations
//!
//! This module defines the error type shared by the cache, its nested views
//! and the configuration layer. Failures raised by a backing store adapter are
//! carried through unmodified.

use thiserror::Error;

/// Main error type for identity cache operations
#[derive(Error, Debug)]
pub enum IdentityCacheError {
    /// Lookup failed after the one-shot population retry was exhausted
    #[error("Couldn't find {entity_type} with id={identifier}")]
    RecordNotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// A lifecycle notification received a record that was never persisted
    #[error("{entity_type} record has no identifier ({operation})")]
    MissingIdentifier {
        entity_type: &'static str,
        operation: &'static str,
    },

    /// A create notification arrived for an identifier that is already cached
    #[error("{entity_type} with id={identifier} is already cached")]
    DuplicateRecord {
        entity_type: &'static str,
        identifier: String,
    },

    /// Population was entered while a previous population is still in flight
    #[error("Population of {entity_type} is already in progress")]
    PopulationInProgress { entity_type: &'static str },

    /// View name is already taken (or reserved)
    #[error("View '{view}' is already registered for {entity_type}")]
    ViewAlreadyRegistered {
        entity_type: &'static str,
        view: String,
    },

    /// Lookup against a view that was never registered
    #[error("Unknown view '{view}' for {entity_type}")]
    UnknownView {
        entity_type: &'static str,
        view: String,
    },

    /// A view callback failed during fan-out. Earlier views are not rolled back.
    #[error("View '{view}' callback failed: {source}")]
    ViewCallback {
        view: String,
        #[source]
        source: Box<IdentityCacheError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Backing store failure, propagated as-is
    #[error(transparent)]
    Store(#[from] anyhow::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl IdentityCacheError {
    /// Check whether this is the domain "not found" signal
    pub fn is_not_found(&self) -> bool {
        matches!(self, IdentityCacheError::RecordNotFound { .. })
    }
}

/// Result type alias for identity cache operations
pub type Result<T> = std::result::Result<T, IdentityCacheError>;

impl From<String> for IdentityCacheError {
    fn from(s: String) -> Self {
        IdentityCacheError::Other(s)
    }
}

impl From<&str> for IdentityCacheError {
    fn from(s: &str) -> Self {
        IdentityCacheError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = IdentityCacheError::RecordNotFound {
            entity_type: "Attribute",
            identifier: "42".to_string(),
        };
        assert_eq!(error.to_string(), "Couldn't find Attribute with id=42");
        assert!(error.is_not_found());

        let error = IdentityCacheError::PopulationInProgress {
            entity_type: "Attribute",
        };
        assert!(error.to_string().contains("already in progress"));
        assert!(!error.is_not_found());

        let error = IdentityCacheError::ViewCallback {
            view: "by_name".to_string(),
            source: Box::new("index corrupted".into()),
        };
        assert!(error.to_string().contains("by_name"));
        assert!(error.to_string().contains("index corrupted"));
    }

    #[test]
    fn test_store_error_is_transparent() {
        let error: IdentityCacheError = anyhow::anyhow!("connection refused").into();
        assert!(matches!(error, IdentityCacheError::Store(_)));
        assert_eq!(error.to_string(), "connection refused");
    }

    #[test]
    fn test_error_conversion() {
        let error: IdentityCacheError = "test error".into();
        assert!(matches!(error, IdentityCacheError::Other(_)));

        let error: IdentityCacheError = "test error".to_string().into();
        assert!(matches!(error, IdentityCacheError::Other(_)));
    }
}
