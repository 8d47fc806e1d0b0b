//! Snapshot record wire format.
//!
//! A stored record is the full material needed to rebuild a response:
//! status, URL, ordered header pairs, and body bytes, plus an informational
//! `stored_at` timestamp. On the wire the body is optionally gzipped and
//! the whole record is bincode-encoded. The compression bit travels inside
//! the record, so a store written with compression on can be read by a
//! codec configured with it off.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::http::Response;

/// A persisted response keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub status: u16,
    pub url: String,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,

    /// When the record was stored. Informational only; the core never
    /// expires records based on it.
    pub stored_at: DateTime<Utc>,
}

impl SnapshotRecord {
    /// Capture a first-hand response for storage.
    pub fn from_response(response: &Response) -> Self {
        Self {
            status: response.status,
            url: response.url.clone(),
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: Utc::now(),
        }
    }
}

/// Builds a live response from a decoded record.
///
/// The host pipeline owns response representation; this seam lets it pick a
/// concrete type from the declared headers and URL so a replayed response
/// is indistinguishable from a first-hand one downstream.
pub trait ResponseFactory: Send + Sync {
    fn response_from(&self, record: SnapshotRecord) -> Response;
}

/// Factory producing the plain boundary [`Response`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResponseFactory;

impl ResponseFactory for DefaultResponseFactory {
    fn response_from(&self, record: SnapshotRecord) -> Response {
        Response::new(record.url, record.status, record.headers, record.body)
    }
}

/// Wire shape. Kept separate from [`SnapshotRecord`] so the in-memory type
/// always holds a plain body regardless of storage compression.
#[derive(Serialize, Deserialize)]
struct WireRecord {
    status: u16,
    url: String,
    headers: Vec<(String, Vec<u8>)>,
    body: Vec<u8>,
    body_compressed: bool,
    stored_at: DateTime<Utc>,
}

/// Serializes snapshot records to and from storage bytes.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotCodec {
    compress: bool,
}

impl SnapshotCodec {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    /// Encode a record to storage bytes.
    pub fn encode(&self, record: &SnapshotRecord) -> Result<Vec<u8>, Error> {
        let body = if self.compress { gzip(&record.body)? } else { record.body.clone() };
        let wire = WireRecord {
            status: record.status,
            url: record.url.clone(),
            headers: record.headers.clone(),
            body,
            body_compressed: self.compress,
            stored_at: record.stored_at,
        };
        bincode::serialize(&wire).map_err(|e| Error::Io(std::io::Error::other(e)))
    }

    /// Decode storage bytes back into a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptSnapshot`] when the bytes do not deserialize
    /// into the expected record shape or the body fails to decompress. The
    /// retrieve path treats that the same as "not found".
    pub fn decode(&self, bytes: &[u8]) -> Result<SnapshotRecord, Error> {
        let wire: WireRecord =
            bincode::deserialize(bytes).map_err(|e| Error::CorruptSnapshot(e.to_string()))?;
        let body = if wire.body_compressed {
            gunzip(&wire.body).map_err(|e| Error::CorruptSnapshot(e.to_string()))?
        } else {
            wire.body
        };
        Ok(SnapshotRecord {
            status: wire.status,
            url: wire.url,
            headers: wire.headers,
            body,
            stored_at: wire.stored_at,
        })
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}
