//! Configuration for the identity cache

use crate::cache::types::{ALL_VIEW, MODEL_VIEW};
use crate::error::{IdentityCacheError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Environment variable overriding [`IdentityCacheConfig::model_view`]
pub const ENV_MODEL_VIEW: &str = "IDENTITY_CACHE_MODEL_VIEW";
/// Environment variable overriding [`IdentityCacheConfig::reset_on_load_failure`]
pub const ENV_RESET_ON_LOAD_FAILURE: &str = "IDENTITY_CACHE_RESET_ON_LOAD_FAILURE";
/// Environment variable overriding [`IdentityCacheConfig::enable_metrics`]
pub const ENV_ENABLE_METRICS: &str = "IDENTITY_CACHE_ENABLE_METRICS";
/// Environment variable overriding [`IdentityCacheConfig::event_log_capacity`]
pub const ENV_EVENT_LOG_CAPACITY: &str = "IDENTITY_CACHE_EVENT_LOG_CAPACITY";

/// Configuration for an identity cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCacheConfig {
    /// Name of the identifier-keyed nested cache consulted by `find`
    pub model_view: String,

    /// Return to `Unpopulated` when a bulk load fails or is dropped,
    /// so a later lookup retries. When false the cache stays `Populating`
    /// and every later population fails fast.
    pub reset_on_load_failure: bool,

    /// Maintain hit/miss and lifecycle counters
    pub enable_metrics: bool,

    /// Number of recent sync events kept in memory (0 disables the log)
    pub event_log_capacity: usize,
}

impl Default for IdentityCacheConfig {
    fn default() -> Self {
        Self {
            model_view: MODEL_VIEW.to_string(),
            reset_on_load_failure: true,
            enable_metrics: true,
            event_log_capacity: 256,
        }
    }
}

impl IdentityCacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> IdentityCacheConfigBuilder {
        IdentityCacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.model_view.trim().is_empty() {
            return Err(IdentityCacheError::ConfigError(
                "model_view must not be empty".to_string(),
            ));
        }

        if self.model_view == ALL_VIEW {
            return Err(IdentityCacheError::ConfigError(format!(
                "model_view must not use the reserved name '{}'",
                ALL_VIEW
            )));
        }

        Ok(())
    }

    /// Build a configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            model_view: std::env::var(ENV_MODEL_VIEW).unwrap_or(defaults.model_view),
            reset_on_load_failure: env_or(
                ENV_RESET_ON_LOAD_FAILURE,
                defaults.reset_on_load_failure,
            )?,
            enable_metrics: env_or(ENV_ENABLE_METRICS, defaults.enable_metrics)?,
            event_log_capacity: env_or(ENV_EVENT_LOG_CAPACITY, defaults.event_log_capacity)?,
        };

        config.validate()?;
        Ok(config)
    }
}

fn env_or<V: FromStr>(name: &str, default: V) -> Result<V> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            IdentityCacheError::ConfigError(format!("invalid value for {}: {:?}", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

/// Builder for identity cache configuration
#[derive(Debug, Default)]
pub struct IdentityCacheConfigBuilder {
    model_view: Option<String>,
    reset_on_load_failure: Option<bool>,
    enable_metrics: Option<bool>,
    event_log_capacity: Option<usize>,
}

impl IdentityCacheConfigBuilder {
    /// Set the name of the identifier-keyed view
    pub fn model_view(mut self, name: impl Into<String>) -> Self {
        self.model_view = Some(name.into());
        self
    }

    /// Enable or disable resetting population state on load failure
    pub fn reset_on_load_failure(mut self, reset: bool) -> Self {
        self.reset_on_load_failure = Some(reset);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Set how many sync events are retained
    pub fn event_log_capacity(mut self, capacity: usize) -> Self {
        self.event_log_capacity = Some(capacity);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> IdentityCacheConfig {
        let defaults = IdentityCacheConfig::default();

        IdentityCacheConfig {
            model_view: self.model_view.unwrap_or(defaults.model_view),
            reset_on_load_failure: self
                .reset_on_load_failure
                .unwrap_or(defaults.reset_on_load_failure),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
            event_log_capacity: self
                .event_log_capacity
                .unwrap_or(defaults.event_log_capacity),
        }
    }
}

/// Preset configurations
impl IdentityCacheConfig {
    /// A failed load leaves the cache `Populating`; later populations fail fast
    pub fn strict() -> Self {
        Self {
            reset_on_load_failure: false,
            ..Default::default()
        }
    }

    /// No counters and no event log
    pub fn minimal() -> Self {
        Self {
            enable_metrics: false,
            event_log_capacity: 0,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IdentityCacheConfig::default();
        assert_eq!(config.model_view, "model");
        assert!(config.reset_on_load_failure);
        assert!(config.enable_metrics);
        assert_eq!(config.event_log_capacity, 256);
    }

    #[test]
    fn test_config_validation() {
        assert!(IdentityCacheConfig::default().validate().is_ok());

        let config = IdentityCacheConfig::builder().model_view("  ").build();
        assert!(config.validate().is_err());

        let config = IdentityCacheConfig::builder().model_view("all").build();
        assert!(matches!(
            config.validate(),
            Err(IdentityCacheError::ConfigError(_))
        ));
    }

    #[test]
    fn test_config_builder() {
        let config = IdentityCacheConfig::builder()
            .model_view("by_id")
            .reset_on_load_failure(false)
            .event_log_capacity(8)
            .build();

        assert_eq!(config.model_view, "by_id");
        assert!(!config.reset_on_load_failure);
        assert!(config.enable_metrics);
        assert_eq!(config.event_log_capacity, 8);
    }

    #[test]
    fn test_preset_configs() {
        assert!(!IdentityCacheConfig::strict().reset_on_load_failure);

        let minimal = IdentityCacheConfig::minimal();
        assert!(!minimal.enable_metrics);
        assert_eq!(minimal.event_log_capacity, 0);
    }

    #[test]
    fn test_env_or_parsing() {
        std::env::set_var("IDENTITY_CACHE_TEST_CAPACITY", " 12 ");
        assert_eq!(env_or("IDENTITY_CACHE_TEST_CAPACITY", 0usize).unwrap(), 12);

        std::env::set_var("IDENTITY_CACHE_TEST_FLAG", "maybe");
        assert!(env_or("IDENTITY_CACHE_TEST_FLAG", true).is_err());

        assert!(env_or("IDENTITY_CACHE_TEST_UNSET", true).unwrap());
    }
}
