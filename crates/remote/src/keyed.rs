//! Per-key remote backend.
//!
//! No scratch file: every fingerprint is its own object under
//! `bucket/prefix/<fingerprint>`. Trades latency per request for never
//! materializing the whole store locally. A bounded LRU of decoded records
//! absorbs repeat lookups within a run.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;

use revisit_core::stats::{self, Stats};
use revisit_core::{
    Config, Error, SnapshotCodec, SnapshotRecord, SnapshotStore, UriParams, expand_uri,
};

use crate::object::{ObjectClient, parse_object_uri};

struct Target {
    bucket: String,
    prefix: String,
}

/// Remote store addressing one object per fingerprint.
pub struct RemoteKeyedStore {
    uri_template: String,
    codec: SnapshotCodec,
    client: Arc<dyn ObjectClient>,
    stats: Arc<dyn Stats>,
    capacity: NonZeroUsize,
    target: Option<Target>,
    cache: Mutex<LruCache<String, SnapshotRecord>>,
}

impl RemoteKeyedStore {
    pub fn new(
        uri_template: impl Into<String>,
        codec: SnapshotCodec,
        client: Arc<dyn ObjectClient>,
        stats: Arc<dyn Stats>,
        cache_entries: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            uri_template: uri_template.into(),
            codec,
            client,
            stats,
            capacity,
            target: None,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn from_config(config: &Config, client: Arc<dyn ObjectClient>, stats: Arc<dyn Stats>) -> Self {
        Self::new(
            config.uri.clone(),
            SnapshotCodec::new(config.compress_body),
            client,
            stats,
            config.remote_cache_entries,
        )
    }

    fn object_key(&self, fingerprint: &str) -> Result<(String, String), Error> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| Error::InvalidTarget("storage target not configured".to_string()))?;
        let key = if target.prefix.is_empty() {
            fingerprint.to_string()
        } else {
            format!("{}/{fingerprint}", target.prefix)
        };
        Ok((target.bucket.clone(), key))
    }

    fn cached(&self, fingerprint: &str) -> Option<SnapshotRecord> {
        self.cache.lock().ok()?.get(fingerprint).cloned()
    }

    fn remember(&self, fingerprint: &str, record: &SnapshotRecord) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(fingerprint.to_string(), record.clone());
        }
    }
}

#[async_trait]
impl SnapshotStore for RemoteKeyedStore {
    fn set_target(&mut self, params: &UriParams) -> Result<(), Error> {
        let uri = expand_uri(&self.uri_template, params);
        let (bucket, prefix) = parse_object_uri(&uri)?;
        self.target = Some(Target { bucket, prefix });
        Ok(())
    }

    fn is_target_reachable(&self) -> bool {
        self.target.is_some()
    }

    async fn open(&mut self) -> Result<(), Error> {
        if self.target.is_none() {
            return Err(Error::InvalidTarget("storage target not configured".to_string()));
        }
        self.cache = Mutex::new(LruCache::new(self.capacity));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        Ok(())
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<SnapshotRecord>, Error> {
        if let Some(record) = self.cached(fingerprint) {
            self.stats.inc(stats::RETRIEVE);
            return Ok(Some(record));
        }

        let (bucket, key) = self.object_key(fingerprint)?;
        let Some(bytes) = self.client.get_object(&bucket, &key).await? else {
            self.stats.inc(stats::RETRIEVE_FAILED);
            return Ok(None);
        };

        let record = self.codec.decode(&bytes)?;
        self.remember(fingerprint, &record);
        self.stats.inc(stats::RETRIEVE);
        Ok(Some(record))
    }

    async fn put(&self, fingerprint: &str, record: &SnapshotRecord) -> Result<(), Error> {
        let (bucket, key) = self.object_key(fingerprint)?;
        let bytes = self.codec.encode(record)?;
        self.client.put_object(&bucket, &key, bytes.into()).await?;
        self.remember(fingerprint, record);
        Ok(())
    }
}
