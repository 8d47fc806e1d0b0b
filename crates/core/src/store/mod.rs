//! Pluggable snapshot storage.
//!
//! One small capability interface over materially different backends: an
//! embedded key-value file on the local filesystem, or remote object
//! storage synchronized at run boundaries (the `revisit-remote` crate).
//! From the controller's perspective they behave identically.

pub mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::codec::SnapshotRecord;
use crate::error::Error;

/// Run parameters substituted into the storage target URI template.
///
/// An explicit, enumerated set: `%(name)s`, `%(time)s` (run start, UTC,
/// second precision) and `%(batch_time)s` (run start, full precision) are
/// the recognized placeholders.
#[derive(Debug, Clone)]
pub struct UriParams {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub batch_time: DateTime<Utc>,
}

impl UriParams {
    /// Parameters for a run starting now.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self { name: name.into(), start_time: now, batch_time: now }
    }

    fn time_token(&self) -> String {
        // colons are replaced so the token is safe in file names
        self.start_time.format("%Y-%m-%dT%H-%M-%S").to_string()
    }

    fn batch_time_token(&self) -> String {
        self.batch_time.format("%Y-%m-%dT%H-%M-%S%.6f").to_string()
    }
}

/// Expand a `%()s`-style URI template against run parameters.
pub fn expand_uri(template: &str, params: &UriParams) -> String {
    template
        .replace("%(name)s", &params.name)
        .replace("%(time)s", &params.time_token())
        .replace("%(batch_time)s", &params.batch_time_token())
}

/// Capability interface every storage backend implements.
///
/// Lifecycle per run: `set_target` → `is_target_reachable` (retrieve mode
/// gate) → `open` → any number of `get`/`put` → `close`. Callers serialize
/// access; backends do not add locking of their own beyond what the storage
/// engine provides natively.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Expand the configured URI template into a concrete target.
    fn set_target(&mut self, params: &UriParams) -> Result<(), Error>;

    /// Whether the expanded target can serve a retrieve run. A `false` here
    /// in retrieve mode aborts the run before any request is dispatched.
    fn is_target_reachable(&self) -> bool;

    /// Open the backing store, creating it if the mode allows.
    async fn open(&mut self) -> Result<(), Error>;

    /// Flush and release the backing store. For remote backends this is
    /// where the snapshot artifact gets published.
    async fn close(&mut self) -> Result<(), Error>;

    /// Fetch the record for a fingerprint, if one was stored.
    async fn get(&self, fingerprint: &str) -> Result<Option<SnapshotRecord>, Error>;

    /// Store a record under a fingerprint. Last write wins.
    async fn put(&self, fingerprint: &str, record: &SnapshotRecord) -> Result<(), Error>;
}
