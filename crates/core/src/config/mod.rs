//! Time machine configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (REVISIT_*)
//! 2. TOML config file (if REVISIT_CONFIG_FILE set)
//! 3. Built-in defaults

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Embedded key-value file on the local filesystem.
    Local,
    /// Whole-store object upload/download around a local scratch file.
    Remote,
    /// One remote object per fingerprint, no scratch file.
    RemoteKeyed,
}

/// Time machine configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (REVISIT_*)
/// 2. TOML config file (if REVISIT_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Master feature flag. When false the controller refuses construction
    /// and the component stays out of the host pipeline.
    #[serde(default)]
    pub enabled: bool,

    /// Storage target URI template. May embed `%(name)s`, `%(time)s` and
    /// `%(batch_time)s` placeholders expanded at run start.
    #[serde(default)]
    pub uri: String,

    /// Record mode: persist every response seen during the run.
    #[serde(default)]
    pub snapshot: bool,

    /// Replay mode: serve every response from the store, never the network.
    #[serde(default)]
    pub retrieve: bool,

    /// Which storage backend to build for the run.
    #[serde(default = "default_backend")]
    pub backend: Backend,

    /// Gzip response bodies inside stored records.
    #[serde(default = "default_true")]
    pub compress_body: bool,

    /// Sort query string pairs before fingerprinting, so reordered but
    /// equivalent URLs collapse to one key.
    #[serde(default)]
    pub sort_query: bool,

    /// Header names folded into the fingerprint. Empty means headers are
    /// ignored, matching the default crawler fingerprint.
    #[serde(default)]
    pub include_headers: Vec<String>,

    /// Base URL of the S3-compatible object gateway (remote backends only).
    #[serde(default)]
    pub remote_endpoint: Option<String>,

    /// Bearer token presented to the object gateway, if it requires one.
    #[serde(default)]
    pub remote_token: Option<String>,

    /// Capacity of the per-key backend's in-memory read cache.
    #[serde(default = "default_cache_entries")]
    pub remote_cache_entries: usize,
}

fn default_backend() -> Backend {
    Backend::Local
}

fn default_true() -> bool {
    true
}

fn default_cache_entries() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            uri: String::new(),
            snapshot: false,
            retrieve: false,
            backend: Backend::Local,
            compress_body: true,
            sort_query: false,
            include_headers: Vec::new(),
            remote_endpoint: None,
            remote_token: None,
            remote_cache_entries: default_cache_entries(),
        }
    }
}

impl Config {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `REVISIT_`
    /// 2. TOML file from `REVISIT_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("REVISIT_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("REVISIT_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
