//! The time machine controller: the mode state machine the host pipeline
//! talks to.
//!
//! A run is either a snapshot run (record every response) or a retrieve run
//! (replay every response from the store, never touching the network). The
//! controller is driven at three extension points — before dispatch, after
//! response, on dispatch error — plus a matched run-started/run-ended
//! lifecycle pair.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{DefaultResponseFactory, ResponseFactory, SnapshotRecord};
use crate::config::Config;
use crate::error::Error;
use crate::fingerprint::Fingerprinter;
use crate::http::{DispatchError, Request, Response};
use crate::stats::{self, Stats};
use crate::store::{SnapshotStore, UriParams};

/// Run mode, fixed for the controller's lifetime. Exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Record: requests go to the network, responses are persisted.
    Snapshot,
    /// Replay: responses come from the store, requests never dispatch.
    Retrieve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    /// The configured target could not back this run. Interception becomes
    /// a no-op while the host tears the run down.
    Invalid,
}

/// Replay-or-record controller.
pub struct TimeMachine {
    mode: Mode,
    state: State,
    storage: Box<dyn SnapshotStore>,
    stats: Arc<dyn Stats>,
    fingerprinter: Fingerprinter,
    factory: Box<dyn ResponseFactory>,
}

impl TimeMachine {
    /// Build a controller from configuration and an already-selected
    /// storage backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConfigured`] when the feature flag is off, the
    /// target URI is unset, or the mode flags are not mutually exclusive.
    /// The host treats that as "stay out of the pipeline".
    pub fn new(config: &Config, storage: Box<dyn SnapshotStore>, stats: Arc<dyn Stats>) -> Result<Self, Error> {
        if !config.enabled {
            return Err(Error::NotConfigured("time machine is not enabled".to_string()));
        }
        if config.uri.trim().is_empty() {
            return Err(Error::NotConfigured("storage target URI is not set".to_string()));
        }
        let mode = match (config.snapshot, config.retrieve) {
            (true, false) => Mode::Snapshot,
            (false, true) => Mode::Retrieve,
            _ => {
                return Err(Error::NotConfigured(
                    "exactly one of snapshot and retrieve must be enabled".to_string(),
                ));
            }
        };

        Ok(Self {
            mode,
            state: State::Ready,
            storage,
            stats,
            fingerprinter: Fingerprinter::from_config(config),
            factory: Box::new(DefaultResponseFactory),
        })
    }

    /// Replace the response factory used to rebuild replayed responses.
    pub fn with_response_factory(mut self, factory: Box<dyn ResponseFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the run was invalidated at start (interception is a no-op).
    pub fn is_invalid(&self) -> bool {
        self.state == State::Invalid
    }

    /// Run-started lifecycle hook: expand the storage target and open it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunAbort`] in retrieve mode when the expanded
    /// target is unreachable; the host must terminate the run rather than
    /// fall through to live traffic.
    pub async fn run_started(&mut self, params: &UriParams) -> Result<(), Error> {
        if let Err(e) = self.storage.set_target(params) {
            self.state = State::Invalid;
            return Err(e);
        }

        if self.mode == Mode::Retrieve && !self.storage.is_target_reachable() {
            self.state = State::Invalid;
            return Err(Error::RunAbort(
                "snapshot target is unreachable; nothing to replay".to_string(),
            ));
        }

        if let Err(e) = self.storage.open().await {
            self.state = State::Invalid;
            return Err(e);
        }

        debug!(mode = ?self.mode, "time machine run started");
        Ok(())
    }

    /// Run-ended lifecycle hook: close the storage backend. Always
    /// attempted, including after an `Invalid` transition, so scratch files
    /// and handles are not leaked on abort.
    pub async fn run_ended(&mut self) -> Result<(), Error> {
        self.storage.close().await
    }

    /// Before-dispatch hook.
    ///
    /// Snapshot mode passes the request through. Retrieve mode serves the
    /// stored response for the request's fingerprint and short-circuits
    /// network dispatch; a miss (or a corrupt record) means the recorded
    /// request sequence no longer matches this run and is fatal.
    pub async fn before_request(&mut self, request: &mut Request) -> Result<Option<Response>, Error> {
        if self.state == State::Invalid || self.mode == Mode::Snapshot {
            return Ok(None);
        }

        let fingerprint = self.fingerprinter.fingerprint(request);
        let record = match self.storage.get(&fingerprint).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(Error::RunAbort(format!(
                    "no snapshot for {} {} - did the request chain change since the snapshot run?",
                    request.method, request.url
                )));
            }
            Err(Error::CorruptSnapshot(reason)) => {
                warn!(url = %request.url, %reason, "stored snapshot failed to decode");
                return Err(Error::RunAbort(format!("snapshot for {} is corrupt: {reason}", request.url)));
            }
            Err(e) => return Err(e),
        };

        let mut response = self.factory.response_from(record);
        response.mark_replay();

        // stash a copy so after_response/on_error never do a second lookup
        request.replay_stash = Some(response.clone());

        Ok(Some(response))
    }

    /// After-response hook. Snapshotting is a side effect: the response is
    /// always returned unchanged. Responses flagged as replays are never
    /// re-stored.
    pub async fn after_response(&mut self, request: &Request, response: Response) -> Result<Response, Error> {
        if self.state == State::Invalid || self.mode == Mode::Retrieve {
            return Ok(response);
        }

        if response.is_replay() {
            return Ok(response);
        }

        let fingerprint = self.fingerprinter.fingerprint(request);
        let record = SnapshotRecord::from_response(&response);
        self.storage.put(&fingerprint, &record).await?;
        self.stats.inc(stats::STORE);

        Ok(response)
    }

    /// On-error hook: the self-healing path. A transient network failure on
    /// a request that carries a stashed snapshot degrades to the cached
    /// answer instead of failing the run. The stash is consumed, so it is
    /// served at most once.
    pub fn on_error(&self, request: &mut Request, error: &DispatchError) -> Option<Response> {
        if !error.is_transient() {
            return None;
        }

        let snapshot = request.replay_stash.take()?;
        debug!(url = %request.url, retries = request.retries, %error, "serving stashed snapshot after dispatch failure");
        self.stats.inc(stats::ERROR_RECOVERY);
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::MemoryStats;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store tracking call counts, shared across controllers.
    #[derive(Default)]
    struct MemStore {
        records: Arc<Mutex<HashMap<String, SnapshotRecord>>>,
        puts: Arc<AtomicUsize>,
        reachable: bool,
    }

    impl MemStore {
        fn shared(&self) -> Self {
            Self { records: Arc::clone(&self.records), puts: Arc::clone(&self.puts), reachable: true }
        }
    }

    #[async_trait]
    impl SnapshotStore for MemStore {
        fn set_target(&mut self, _params: &UriParams) -> Result<(), Error> {
            Ok(())
        }

        fn is_target_reachable(&self) -> bool {
            self.reachable
        }

        async fn open(&mut self) -> Result<(), Error> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), Error> {
            Ok(())
        }

        async fn get(&self, fingerprint: &str) -> Result<Option<SnapshotRecord>, Error> {
            Ok(self.records.lock().unwrap().get(fingerprint).cloned())
        }

        async fn put(&self, fingerprint: &str, record: &SnapshotRecord) -> Result<(), Error> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.records.lock().unwrap().insert(fingerprint.to_string(), record.clone());
            Ok(())
        }
    }

    /// Store whose target expansion always fails.
    struct BadTargetStore;

    #[async_trait]
    impl SnapshotStore for BadTargetStore {
        fn set_target(&mut self, _params: &UriParams) -> Result<(), Error> {
            Err(Error::InvalidTarget("unparseable target".to_string()))
        }

        fn is_target_reachable(&self) -> bool {
            false
        }

        async fn open(&mut self) -> Result<(), Error> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), Error> {
            Ok(())
        }

        async fn get(&self, _fingerprint: &str) -> Result<Option<SnapshotRecord>, Error> {
            Ok(None)
        }

        async fn put(&self, _fingerprint: &str, _record: &SnapshotRecord) -> Result<(), Error> {
            Ok(())
        }
    }

    fn config(snapshot: bool, retrieve: bool) -> Config {
        Config {
            enabled: true,
            uri: "/tmp/%(name)s.db".to_string(),
            snapshot,
            retrieve,
            ..Default::default()
        }
    }

    fn sample_response() -> Response {
        Response::new(
            "http://www.example.com/",
            202,
            vec![("Content-Type".to_string(), b"text/html".to_vec())],
            b"test body".to_vec(),
        )
    }

    fn machine(config: &Config, store: MemStore) -> (TimeMachine, Arc<MemoryStats>) {
        let stats = Arc::new(MemoryStats::new());
        let machine = TimeMachine::new(config, Box::new(store), stats.clone()).unwrap();
        (machine, stats)
    }

    #[test]
    fn test_not_enabled() {
        let cfg = Config { enabled: false, ..config(true, false) };
        let result = TimeMachine::new(&cfg, Box::new(MemStore::default()), Arc::new(MemoryStats::new()));
        assert!(matches!(result, Err(Error::NotConfigured(_))));
    }

    #[test]
    fn test_uri_not_configured() {
        let cfg = Config { uri: String::new(), ..config(true, false) };
        let result = TimeMachine::new(&cfg, Box::new(MemStore::default()), Arc::new(MemoryStats::new()));
        assert!(matches!(result, Err(Error::NotConfigured(_))));
    }

    #[test]
    fn test_both_modes_rejected() {
        let result = TimeMachine::new(&config(true, true), Box::new(MemStore::default()), Arc::new(MemoryStats::new()));
        assert!(matches!(result, Err(Error::NotConfigured(_))));
    }

    #[test]
    fn test_neither_mode_rejected() {
        let result =
            TimeMachine::new(&config(false, false), Box::new(MemStore::default()), Arc::new(MemoryStats::new()));
        assert!(matches!(result, Err(Error::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_snapshot_run_passes_through_and_stores() {
        let store = MemStore::default();
        let puts = Arc::clone(&store.puts);
        let (mut machine, stats) = machine(&config(true, false), store);
        machine.run_started(&UriParams::new("spider")).await.unwrap();

        let mut request = Request::get("http://www.example.com");
        assert!(machine.before_request(&mut request).await.unwrap().is_none());

        let response = machine.after_response(&request, sample_response()).await.unwrap();
        assert_eq!(response, sample_response());
        assert_eq!(puts.load(Ordering::SeqCst), 1);
        assert_eq!(stats.get(stats::STORE), 1);

        machine.run_ended().await.unwrap();
    }

    #[tokio::test]
    async fn test_retrieve_replays_and_short_circuits() {
        let recorder = MemStore::default();
        let replayer = recorder.shared();

        let (mut machine, _) = machine(&config(true, false), recorder);
        machine.run_started(&UriParams::new("spider")).await.unwrap();
        let mut request = Request::get("http://www.example.com");
        machine.after_response(&request, sample_response()).await.unwrap();
        machine.run_ended().await.unwrap();

        let stats = Arc::new(MemoryStats::new());
        let mut machine = TimeMachine::new(&config(false, true), Box::new(replayer), stats).unwrap();
        machine.run_started(&UriParams::new("spider")).await.unwrap();
        let replayed = machine.before_request(&mut request).await.unwrap().unwrap();
        assert!(replayed.is_replay());
        assert_eq!(replayed.status, 202);
        assert_eq!(replayed.body, b"test body".to_vec());
        assert!(request.replay_stash.is_some());
        machine.run_ended().await.unwrap();
    }

    #[tokio::test]
    async fn test_retrieve_miss_aborts() {
        let store = MemStore { reachable: true, ..Default::default() };
        let (mut machine, _) = machine(&config(false, true), store);
        machine.run_started(&UriParams::new("spider")).await.unwrap();

        let mut request = Request::get("http://www.example.com");
        let result = machine.before_request(&mut request).await;
        assert!(matches!(result, Err(Error::RunAbort(_))));
    }

    #[tokio::test]
    async fn test_retrieve_unreachable_target_invalidates() {
        let store = MemStore { reachable: false, ..Default::default() };
        let (mut machine, _) = machine(&config(false, true), store);

        let result = machine.run_started(&UriParams::new("spider")).await;
        assert!(matches!(result, Err(Error::RunAbort(_))));
        assert!(machine.is_invalid());

        // interception is now a no-op; teardown close still works
        let mut request = Request::get("http://www.example.com");
        assert!(machine.before_request(&mut request).await.unwrap().is_none());
        machine.run_ended().await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_target_invalidates() {
        let mut machine =
            TimeMachine::new(&config(false, true), Box::new(BadTargetStore), Arc::new(MemoryStats::new())).unwrap();

        let result = machine.run_started(&UriParams::new("spider")).await;
        assert!(matches!(result, Err(Error::InvalidTarget(_))));
        assert!(machine.is_invalid());

        // interception is now a no-op; teardown close still works
        let mut request = Request::get("http://www.example.com");
        assert!(machine.before_request(&mut request).await.unwrap().is_none());
        machine.run_ended().await.unwrap();
    }

    #[tokio::test]
    async fn test_replayed_response_is_never_restored() {
        let store = MemStore::default();
        let puts = Arc::clone(&store.puts);
        let (mut machine, _) = machine(&config(true, false), store);
        machine.run_started(&UriParams::new("spider")).await.unwrap();

        let request = Request::get("http://www.example.com");
        let mut replay = sample_response();
        replay.mark_replay();
        machine.after_response(&request, replay).await.unwrap();
        assert_eq!(puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_recovery_with_stash() {
        let (machine, stats) = machine(&config(true, false), MemStore::default());

        let mut request = Request::get("http://www.example.com");
        request.retries = 2;
        let mut stashed = sample_response();
        stashed.mark_replay();
        request.replay_stash = Some(stashed.clone());

        let recovered = machine.on_error(&mut request, &DispatchError::Dns("no such host".into()));
        assert_eq!(recovered, Some(stashed));
        assert_eq!(stats.get(stats::ERROR_RECOVERY), 1);
        assert!(request.replay_stash.is_none());
    }

    #[tokio::test]
    async fn test_error_without_stash_propagates() {
        let (machine, stats) = machine(&config(true, false), MemStore::default());
        let mut request = Request::get("http://www.example.com");
        assert!(machine.on_error(&mut request, &DispatchError::Timeout).is_none());
        assert_eq!(stats.get(stats::ERROR_RECOVERY), 0);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_masked() {
        let (machine, _) = machine(&config(true, false), MemStore::default());
        let mut request = Request::get("http://www.example.com");
        request.replay_stash = Some(sample_response());
        let result = machine.on_error(&mut request, &DispatchError::Other("http 500".into()));
        assert!(result.is_none());
        assert!(request.replay_stash.is_some());
    }
}
