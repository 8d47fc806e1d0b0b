//! Whole-store remote backend.
//!
//! The durable medium is one object per run in a bucket; the working copy
//! is a local scratch file synchronized at the run boundaries. A retrieve
//! run downloads the object before opening; a snapshot run starts empty
//! and uploads on close. In between, every operation is the local store's.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{error, info};

use revisit_core::{
    Config, Error, LocalStore, Mode, SnapshotCodec, SnapshotRecord, SnapshotStore, UriParams, expand_uri,
};

use crate::object::{ObjectClient, parse_object_uri};

struct Target {
    bucket: String,
    key: String,
    uri: String,
}

/// Remote store over a local scratch file.
pub struct RemoteStore {
    uri_template: String,
    codec: SnapshotCodec,
    mode: Mode,
    client: Arc<dyn ObjectClient>,
    target: Option<Target>,
    scratch: Option<NamedTempFile>,
    inner: Option<LocalStore>,
}

impl RemoteStore {
    pub fn new(uri_template: impl Into<String>, codec: SnapshotCodec, mode: Mode, client: Arc<dyn ObjectClient>) -> Self {
        Self {
            uri_template: uri_template.into(),
            codec,
            mode,
            client,
            target: None,
            scratch: None,
            inner: None,
        }
    }

    pub fn from_config(config: &Config, mode: Mode, client: Arc<dyn ObjectClient>) -> Self {
        Self::new(config.uri.clone(), SnapshotCodec::new(config.compress_body), mode, client)
    }

    fn inner(&self) -> Result<&LocalStore, Error> {
        self.inner
            .as_ref()
            .ok_or_else(|| Error::InvalidTarget("store is not open".to_string()))
    }
}

#[async_trait]
impl SnapshotStore for RemoteStore {
    fn set_target(&mut self, params: &UriParams) -> Result<(), Error> {
        let uri = expand_uri(&self.uri_template, params);
        let (bucket, key) = parse_object_uri(&uri)?;
        self.target = Some(Target { bucket, key, uri });
        Ok(())
    }

    /// A parse check, not a network probe: the original store is only
    /// consulted once the run opens.
    fn is_target_reachable(&self) -> bool {
        self.target.is_some()
    }

    async fn open(&mut self) -> Result<(), Error> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| Error::InvalidTarget("storage target not configured".to_string()))?;

        let scratch = tempfile::Builder::new().suffix(".db").tempfile()?;

        if self.mode == Mode::Retrieve {
            let bytes = self
                .client
                .get_object(&target.bucket, &target.key)
                .await?
                .ok_or_else(|| Error::RunAbort(format!("remote snapshot {} not found", target.uri)))?;
            std::fs::write(scratch.path(), &bytes)?;
        }

        let mut inner = LocalStore::at_path(scratch.path(), self.codec);
        inner.open().await?;

        self.scratch = Some(scratch);
        self.inner = Some(inner);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        let Some(mut inner) = self.inner.take() else {
            self.scratch = None;
            return Ok(());
        };
        inner.close().await?;

        // scratch is removed on drop either way; snapshot runs publish it first
        let scratch = self.scratch.take();
        if self.mode == Mode::Snapshot
            && let (Some(scratch), Some(target)) = (scratch, self.target.as_ref())
        {
            match std::fs::read(scratch.path()) {
                Ok(bytes) => match self.client.put_object(&target.bucket, &target.key, bytes.into()).await {
                    Ok(()) => info!("uploaded time machine store to {}", target.uri),
                    // the run's snapshot work is done; a failed publication
                    // must not turn into a crash at shutdown
                    Err(e) => error!("failed to upload time machine store to {}: {e}", target.uri),
                },
                Err(e) => error!("failed to read scratch file for {}: {e}", target.uri),
            }
        }
        Ok(())
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<SnapshotRecord>, Error> {
        self.inner()?.get(fingerprint).await
    }

    async fn put(&self, fingerprint: &str, record: &SnapshotRecord) -> Result<(), Error> {
        self.inner()?.put(fingerprint, record).await
    }
}
