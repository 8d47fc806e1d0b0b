//! Configuration validation rules.
//!
//! This module provides validation logic for `Config` values after they
//! have been loaded from environment, files, or defaults. Mode exclusivity
//! is deliberately not checked here: the controller enforces it at
//! construction so the host sees a `NotConfigured` opt-out, not a load
//! failure.

use crate::config::{Backend, Config};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl Config {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if a remote backend is selected
    /// without an endpoint, and `ConfigError::Invalid` if
    /// `remote_cache_entries` is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.backend, Backend::Remote | Backend::RemoteKeyed) && self.remote_endpoint.is_none() {
            return Err(ConfigError::Missing {
                field: "remote_endpoint".into(),
                hint: "Set REVISIT_REMOTE_ENDPOINT to the object gateway base URL".into(),
            });
        }

        if self.remote_cache_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "remote_cache_entries".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.enabled && self.snapshot && self.retrieve {
            tracing::warn!("both snapshot and retrieve are set; the controller will refuse to start");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_remote_without_endpoint() {
        let config = Config { backend: Backend::Remote, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "remote_endpoint"));
    }

    #[test]
    fn test_validate_keyed_without_endpoint() {
        let config = Config { backend: Backend::RemoteKeyed, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_cache_entries() {
        let config = Config { remote_cache_entries: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "remote_cache_entries"));
    }

    #[test]
    fn test_validate_remote_with_endpoint() {
        let config = Config {
            backend: Backend::Remote,
            remote_endpoint: Some("https://objects.internal".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
