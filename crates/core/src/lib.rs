//! Core types and state machine for revisit.
//!
//! This crate provides:
//! - The replay-or-record controller (`TimeMachine`)
//! - Request fingerprinting and the snapshot codec
//! - The `SnapshotStore` capability interface and the local SQLite store
//! - Configuration and unified error types

pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod machine;
pub mod stats;
pub mod store;

pub use codec::{DefaultResponseFactory, ResponseFactory, SnapshotCodec, SnapshotRecord};
pub use config::{Backend, Config};
pub use error::Error;
pub use fingerprint::Fingerprinter;
pub use http::{DispatchError, REPLAY_FLAG, Request, Response};
pub use machine::{Mode, TimeMachine};
pub use stats::{MemoryStats, NoopStats, Stats};
pub use store::{LocalStore, SnapshotStore, UriParams, expand_uri};
