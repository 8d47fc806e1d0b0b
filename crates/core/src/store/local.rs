//! Embedded key-value store on the local filesystem.
//!
//! One SQLite file per run, addressed by an expanded URI template. Records
//! live under two keys per fingerprint: `<fp>_data` holds the encoded
//! record, `<fp>_time` is an existence/timestamp marker, so existence
//! checks never pay payload deserialization.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_rusqlite::{Connection, params};
use tracing::debug;

use super::{SnapshotStore, UriParams, expand_uri};
use crate::codec::{SnapshotCodec, SnapshotRecord};
use crate::config::Config;
use crate::error::Error;

/// Local SQLite-backed snapshot store.
pub struct LocalStore {
    uri_template: String,
    codec: SnapshotCodec,
    target: Option<PathBuf>,
    db: Option<Connection>,
}

impl LocalStore {
    pub fn new(uri_template: impl Into<String>, codec: SnapshotCodec) -> Self {
        Self { uri_template: uri_template.into(), codec, target: None, db: None }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.uri.clone(), SnapshotCodec::new(config.compress_body))
    }

    /// A store bound directly to a concrete path, bypassing URI templating.
    /// Remote backends use this for their local scratch file.
    pub fn at_path(path: impl Into<PathBuf>, codec: SnapshotCodec) -> Self {
        let path = path.into();
        Self { uri_template: path.to_string_lossy().into_owned(), codec, target: Some(path), db: None }
    }

    /// The expanded target path, once `set_target` has run.
    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    fn db(&self) -> Result<&Connection, Error> {
        self.db
            .as_ref()
            .ok_or_else(|| Error::InvalidTarget("store is not open".to_string()))
    }
}

#[async_trait]
impl SnapshotStore for LocalStore {
    fn set_target(&mut self, params: &UriParams) -> Result<(), Error> {
        let expanded = expand_uri(&self.uri_template, params);
        let path = expanded.strip_prefix("file://").unwrap_or(&expanded);
        let path = PathBuf::from(path);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        self.target = Some(path);
        Ok(())
    }

    fn is_target_reachable(&self) -> bool {
        self.target.as_ref().is_some_and(|p| p.exists())
    }

    async fn open(&mut self) -> Result<(), Error> {
        let target = self
            .target
            .clone()
            .ok_or_else(|| Error::InvalidTarget("storage target not configured".to_string()))?;

        let conn = Connection::open(&target).await.map_err(|e| Error::Database(e.into()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;
                 CREATE TABLE IF NOT EXISTS kv (
                     key TEXT PRIMARY KEY,
                     value BLOB NOT NULL
                 );",
            )?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        debug!("using time machine store at {}", target.display());

        self.db = Some(conn);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        if let Some(db) = self.db.take() {
            // move WAL content into the main file so the artifact on disk is
            // complete before the handle is released (the remote scratch
            // variant uploads that file as-is)
            db.call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<SnapshotRecord>, Error> {
        let db = self.db()?;
        let time_key = format!("{fingerprint}_time");
        let data_key = format!("{fingerprint}_data");

        let bytes = db
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let exists: bool = conn
                    .query_row(
                        "SELECT EXISTS(SELECT 1 FROM kv WHERE key = ?1)",
                        params![time_key],
                        |row| row.get(0),
                    )
                    .map_err(Error::from)?;
                if !exists {
                    return Ok(None);
                }

                match conn.query_row("SELECT value FROM kv WHERE key = ?1", params![data_key], |row| {
                    row.get::<_, Vec<u8>>(0)
                }) {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => {
                        Err(Error::CorruptSnapshot("existence marker without payload".to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        match bytes {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, fingerprint: &str, record: &SnapshotRecord) -> Result<(), Error> {
        let db = self.db()?;
        let data = self.codec.encode(record)?;
        let time_key = format!("{fingerprint}_time");
        let data_key = format!("{fingerprint}_data");
        let stored_at = record.stored_at.to_rfc3339();

        db.call(move |conn| -> Result<(), Error> {
            let tx = conn.transaction().map_err(Error::from)?;
            tx.execute("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)", params![data_key, data])
                .map_err(Error::from)?;
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![time_key, stored_at.into_bytes()],
            )
            .map_err(Error::from)?;
            tx.commit().map_err(Error::from)?;
            Ok(())
        })
        .await
        .map_err(Error::from)
    }
}
