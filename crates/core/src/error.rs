//! Unified error types for revisit.
//!
//! The taxonomy follows the middleware contract: configuration problems keep
//! the component out of the pipeline, run-abort problems stop the crawl, and
//! corrupt records are surfaced distinctly so the retrieve path can refuse
//! to serve them.

use tokio_rusqlite::rusqlite;

/// Unified error type for the snapshot cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The component cannot participate in the pipeline (feature flag off,
    /// missing target, mode flags not mutually exclusive, backend not
    /// constructible). The host treats this as an opt-out, not a crash.
    #[error("NOT_CONFIGURED: {0}")]
    NotConfigured(String),

    /// The run must stop: retrieve target unreachable, or a replay was
    /// expected and not found.
    #[error("RUN_ABORT: {0}")]
    RunAbort(String),

    /// A stored record failed to decode.
    #[error("CORRUPT_SNAPSHOT: {0}")]
    CorruptSnapshot(String),

    /// Embedded key-value store operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Local filesystem operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// The expanded storage target URI is not usable.
    #[error("INVALID_TARGET: {0}")]
    InvalidTarget(String),

    /// Remote object-store operation failed.
    #[error("REMOTE_ERROR: {0}")]
    Remote(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
