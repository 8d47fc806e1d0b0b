//! Counters sink.
//!
//! The crawler host owns its metrics pipeline; the time machine only emits
//! named increment events through this trait.

use std::collections::HashMap;
use std::sync::Mutex;

/// A response was persisted to the store.
pub const STORE: &str = "timemachine/store";
/// A transient dispatch failure was masked by a stashed snapshot.
pub const ERROR_RECOVERY: &str = "timemachine/errorrecovery";
/// Per-key remote lookup hit.
pub const RETRIEVE: &str = "timemachine/retrieve";
/// Per-key remote lookup miss.
pub const RETRIEVE_FAILED: &str = "timemachine/retrieve-failed";

/// Sink for named counter increments.
pub trait Stats: Send + Sync {
    fn inc(&self, counter: &str);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStats;

impl Stats for NoopStats {
    fn inc(&self, _counter: &str) {}
}

/// In-memory counter map, for tests and embedders without a metrics
/// pipeline.
#[derive(Debug, Default)]
pub struct MemoryStats {
    counters: Mutex<HashMap<String, u64>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: &str) -> u64 {
        self.counters
            .lock()
            .map(|c| c.get(counter).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Stats for MemoryStats {
    fn inc(&self, counter: &str) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(counter.to_string()).or_insert(0) += 1;
        }
    }
}
