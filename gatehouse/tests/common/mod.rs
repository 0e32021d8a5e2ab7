//! Shared fixtures for client integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatehouse::{
    ApiClient, ClientConfig, OutgoingRequest, SessionHooks, Transport, TransportError,
    TransportResponse,
};
use http::{HeaderMap, StatusCode};

pub const BASE: &str = "https://api.campus.edu";

type Outcome = Result<TransportResponse, TransportError>;

/// Transport that answers from a script and records what it was sent.
///
/// Scripted outcomes are consumed in order; once the script is empty every
/// call answers `200 {"call": n}` where `n` is the 1-based call number.
pub struct ScriptedTransport {
    calls: AtomicUsize,
    latency: Duration,
    script: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<OutgoingRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            latency,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, outcome: Outcome) -> &Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_status(&self, status: u16, body: &'static str) -> &Self {
        self.push(Ok(TransportResponse::with_status(
            StatusCode::from_u16(status).unwrap(),
            body,
        )))
    }

    pub fn push_rate_limited(&self, retry_after: Option<&str>) -> &Self {
        let mut headers = HeaderMap::new();
        if let Some(retry_after) = retry_after {
            headers.insert("retry-after", retry_after.parse().unwrap());
        }
        self.push(Ok(TransportResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            "",
        )))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<OutgoingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(TransportResponse::with_status(
                StatusCode::OK,
                format!(r#"{{"call":{call}}}"#),
            ))
        })
    }
}

/// Session hooks that count how often they fired.
#[derive(Default)]
pub struct RecordingHooks {
    cleared: AtomicUsize,
    navigated: AtomicUsize,
}

impl RecordingHooks {
    pub fn cleared(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }

    pub fn navigated(&self) -> usize {
        self.navigated.load(Ordering::SeqCst)
    }
}

impl SessionHooks for RecordingHooks {
    fn clear_persisted_session(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }

    fn navigate_to_login(&self) {
        self.navigated.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn config() -> ClientConfig {
    ClientConfig::builder().base_endpoint(BASE).build()
}

pub fn client(transport: &Arc<ScriptedTransport>) -> ApiClient {
    ApiClient::new(Arc::clone(transport), config())
}

pub fn client_with_hooks(
    transport: &Arc<ScriptedTransport>,
    hooks: &Arc<RecordingHooks>,
) -> ApiClient {
    ApiClient::builder()
        .transport(Arc::clone(transport))
        .hooks(Arc::clone(hooks))
        .config(config())
        .build()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
