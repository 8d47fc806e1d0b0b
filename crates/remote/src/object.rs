//! Object storage client abstraction.
//!
//! Remote snapshot backends speak to object storage through this small
//! trait so the transport stays swappable: an HTTP client for
//! S3-compatible gateways, an in-memory client for tests, or a signed SDK
//! client supplied by the embedder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use url::Url;

use revisit_core::Error;

/// Whole-object read/write against a bucket.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Download an object. `Ok(None)` means the object does not exist.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, Error>;

    /// Upload an object, overwriting any previous version.
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), Error>;
}

/// Split an `s3://bucket/key` style target URI into bucket and key.
pub fn parse_object_uri(uri: &str) -> Result<(String, String), Error> {
    let parsed = Url::parse(uri).map_err(|e| Error::InvalidTarget(format!("{uri}: {e}")))?;

    if parsed.scheme() != "s3" {
        return Err(Error::InvalidTarget(format!("target scheme is not s3: {}", parsed.scheme())));
    }

    let bucket = parsed
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::InvalidTarget("bucket must not be empty".to_string()))?;
    let key = parsed.path().trim_start_matches('/');
    if key.is_empty() {
        return Err(Error::InvalidTarget("object key must not be empty".to_string()));
    }

    Ok((bucket.to_string(), key.to_string()))
}

/// HTTP client for S3-compatible object gateways.
///
/// Objects are addressed as `{endpoint}/{bucket}/{key}` with plain GET/PUT
/// and optional bearer-token auth. Request signing is the embedder's
/// concern: a signed SDK client plugs in behind [`ObjectClient`].
pub struct HttpObjectClient {
    http: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpObjectClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self, Error> {
        // a trailing slash keeps Url::join from eating the last path segment
        let normalized = if endpoint.ends_with('/') { endpoint.to_string() } else { format!("{endpoint}/") };
        let endpoint = Url::parse(&normalized).map_err(|e| Error::Remote(format!("invalid endpoint: {e}")))?;

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Remote(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, endpoint, token })
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, Error> {
        self.endpoint
            .join(&format!("{bucket}/{key}"))
            .map_err(|e| Error::Remote(format!("invalid object path {bucket}/{key}: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectClient for HttpObjectClient {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, Error> {
        let url = self.object_url(bucket, key)?;
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| Error::Remote(format!("download failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Remote(format!("download failed: status {}", response.status().as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Remote(format!("download failed: {e}")))?;
        Ok(Some(bytes))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), Error> {
        let url = self.object_url(bucket, key)?;
        let response = self
            .authorize(self.http.put(url))
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Remote(format!("upload failed: status {}", response.status().as_u16())));
        }
        Ok(())
    }
}

/// In-memory object store, shared across clones. Used by tests and as a
/// stand-in gateway for embedders that keep everything local.
#[derive(Clone, Default)]
pub struct MemoryObjectClient {
    objects: Arc<Mutex<HashMap<(String, String), Bytes>>>,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .map(|o| o.contains_key(&(bucket.to_string(), key.to_string())))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, Error> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| Error::Remote("object map poisoned".to_string()))?;
        Ok(objects.get(&(bucket.to_string(), key.to_string())).cloned())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), Error> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| Error::Remote("object map poisoned".to_string()))?;
        objects.insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }
}
