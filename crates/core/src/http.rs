//! Boundary types shared with the host crawler pipeline.
//!
//! The crawler engine owns request dispatch; these types describe the slice
//! of its world the time machine needs to see. Headers are kept as an
//! ordered multimap of raw byte values so replayed responses reproduce the
//! recorded wire data exactly.

/// Flag set on responses served from the store instead of the network.
pub const REPLAY_FLAG: &str = "replay";

/// A request about to be dispatched by the host pipeline.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,

    /// Nested target URL for requests proxied through a rendering
    /// sub-system. When set, fingerprinting keys on this URL instead of the
    /// outer proxy URL.
    pub render_url: Option<String>,

    /// How many times the host has re-dispatched this request.
    pub retries: u32,

    /// Typed side-channel owned by the controller: a snapshot retrieved in
    /// `before_request` is parked here so `after_response` and `on_error`
    /// never need a second store lookup.
    pub replay_stash: Option<Response>,
}

impl Request {
    /// A plain GET request, the common case for crawls.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            render_url: None,
            retries: 0,
            replay_stash: None,
        }
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }
}

/// A response, produced either by the network or by replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub url: String,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,

    /// String flags the pipeline attaches to a response. The time machine
    /// only ever reads and writes [`REPLAY_FLAG`].
    pub flags: Vec<String>,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, headers: Vec<(String, Vec<u8>)>, body: Vec<u8>) -> Self {
        Self { status, url: url.into(), headers, body, flags: Vec::new() }
    }

    /// Mark this response as served from the store.
    pub fn mark_replay(&mut self) {
        if !self.is_replay() {
            self.flags.push(REPLAY_FLAG.to_string());
        }
    }

    /// Whether this response was served from the store.
    pub fn is_replay(&self) -> bool {
        self.flags.iter().any(|f| f == REPLAY_FLAG)
    }
}

/// Network-layer dispatch failures as reported by the host pipeline.
///
/// The transient subset is the fixed recoverable set: when one of these is
/// raised for a request that carries a stashed snapshot, the controller
/// substitutes the snapshot instead of failing the run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("request timed out")]
    Timeout,

    #[error("dns lookup failed: {0}")]
    Dns(String),

    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection reset")]
    ConnectionReset,

    #[error("connection lost")]
    ConnectionLost,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("i/o error: {0}")]
    Io(String),

    /// Anything outside the recoverable set. Never masked by replay.
    #[error("{0}")]
    Other(String),
}

impl DispatchError {
    /// Whether this failure belongs to the fixed recoverable set.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}
