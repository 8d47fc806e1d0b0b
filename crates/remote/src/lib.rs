//! Remote storage backends and backend selection for revisit.
//!
//! This crate provides:
//! - The `ObjectClient` abstraction over object storage (HTTP gateway and
//!   in-memory implementations)
//! - The scratch-file remote store and the per-key remote store
//! - `build_store` / `time_machine`, which turn configuration into a ready
//!   controller

pub mod keyed;
pub mod object;
pub mod scratch;

pub use keyed::RemoteKeyedStore;
pub use object::{HttpObjectClient, MemoryObjectClient, ObjectClient, parse_object_uri};
pub use scratch::RemoteStore;

use std::sync::Arc;

use revisit_core::stats::Stats;
use revisit_core::{Backend, Config, Error, LocalStore, Mode, SnapshotStore, TimeMachine};

/// Build the storage backend selected by configuration.
///
/// # Errors
///
/// Backend construction failures surface as [`Error::NotConfigured`]: a
/// backend that cannot be instantiated keeps the component out of the
/// pipeline rather than crashing the host.
pub fn build_store(config: &Config, stats: Arc<dyn Stats>) -> Result<Box<dyn SnapshotStore>, Error> {
    match config.backend {
        Backend::Local => Ok(Box::new(LocalStore::from_config(config))),
        Backend::Remote | Backend::RemoteKeyed => {
            let endpoint = config
                .remote_endpoint
                .as_deref()
                .ok_or_else(|| Error::NotConfigured("remote endpoint is not set".to_string()))?;
            let client = HttpObjectClient::new(endpoint, config.remote_token.clone())
                .map_err(|e| Error::NotConfigured(e.to_string()))?;
            let client: Arc<dyn ObjectClient> = Arc::new(client);

            match config.backend {
                Backend::Remote => {
                    let mode = if config.retrieve { Mode::Retrieve } else { Mode::Snapshot };
                    Ok(Box::new(RemoteStore::from_config(config, mode, client)))
                }
                _ => Ok(Box::new(RemoteKeyedStore::from_config(config, client, stats))),
            }
        }
    }
}

/// Build a ready controller from configuration: select the backend, then
/// construct the state machine around it.
pub fn time_machine(config: &Config, stats: Arc<dyn Stats>) -> Result<TimeMachine, Error> {
    let store = build_store(config, stats.clone())?;
    TimeMachine::new(config, store, stats)
}
