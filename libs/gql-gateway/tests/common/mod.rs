#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gql_gateway::{
    CachePolicy, CredentialRefresher, GatewayError, GraphqlResponse, InMemorySessionProvider,
    Operation, RequestGateway, SessionProvider, Transport, TransportError,
};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::Barrier;

/// Transport that accepts exactly one session identifier and records the
/// identifier seen by every call.
pub struct SessionCheckingTransport {
    sessions: Arc<InMemorySessionProvider>,
    accepted: Mutex<String>,
    payload: Mutex<Value>,
    seen: Mutex<Vec<Option<String>>>,
    rejection_barrier: Option<(Arc<Barrier>, usize)>,
    rejections: AtomicUsize,
}

impl SessionCheckingTransport {
    pub fn new(sessions: Arc<InMemorySessionProvider>, accepted: &str, payload: Value) -> Self {
        Self {
            sessions,
            accepted: Mutex::new(accepted.to_owned()),
            payload: Mutex::new(payload),
            seen: Mutex::new(Vec::new()),
            rejection_barrier: None,
            rejections: AtomicUsize::new(0),
        }
    }

    /// Hold the first `parties` rejected calls until all of them are pending,
    /// so that they observe expiry at the same time.
    #[must_use]
    pub fn with_rejection_barrier(mut self, parties: usize) -> Self {
        self.rejection_barrier = Some((Arc::new(Barrier::new(parties)), parties));
        self
    }

    pub fn accept(&self, session_id: &str) {
        *self.accepted.lock() = session_id.to_owned();
    }

    pub fn set_payload(&self, payload: Value) {
        *self.payload.lock() = payload;
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn seen(&self) -> Vec<Option<String>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Transport for SessionCheckingTransport {
    async fn call(
        &self,
        _operation: &Operation,
        _policy: CachePolicy,
    ) -> Result<GraphqlResponse, TransportError> {
        let session = self
            .sessions
            .session_id()
            .map(|s| s.expose_secret().to_owned());
        self.seen.lock().push(session.clone());

        let accepted = session.as_deref() == Some(self.accepted.lock().as_str());
        if accepted {
            return Ok(GraphqlResponse::data(self.payload.lock().clone()));
        }

        let rejection = self.rejections.fetch_add(1, Ordering::SeqCst);
        if let Some((barrier, parties)) = &self.rejection_barrier
            && rejection < *parties
        {
            barrier.wait().await;
        }
        Err(TransportError::unauthorized("HTTP 401"))
    }
}

/// Refresher that rotates the session to `sid-<n>` after a delay, or fails
/// with a fixed message.
pub struct RotatingRefresher {
    sessions: Arc<InMemorySessionProvider>,
    transport: Arc<SessionCheckingTransport>,
    delay: Duration,
    failure: Option<String>,
    rotate_server: bool,
    runs: AtomicUsize,
}

impl RotatingRefresher {
    pub fn new(
        sessions: Arc<InMemorySessionProvider>,
        transport: Arc<SessionCheckingTransport>,
    ) -> Self {
        Self {
            sessions,
            transport,
            delay: Duration::ZERO,
            failure: None,
            rotate_server: true,
            runs: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_owned());
        self
    }

    /// Rotate the local session without the server accepting the new one.
    #[must_use]
    pub fn server_keeps_rejecting(mut self) -> Self {
        self.rotate_server = false;
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialRefresher for RotatingRefresher {
    async fn refresh(&self, _gateway: &RequestGateway) -> Result<(), GatewayError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(GatewayError::business(message.clone()));
        }

        let fresh = format!("sid-{run}");
        if self.rotate_server {
            self.transport.accept(&fresh);
        }
        self.sessions.set_session_id(SecretString::from(fresh));
        Ok(())
    }
}

pub fn sessions(initial: &str) -> Arc<InMemorySessionProvider> {
    Arc::new(InMemorySessionProvider::with_session_id(initial))
}

pub fn me_query() -> Operation {
    Operation::query("query Me { me { id } }").with_name("Me")
}
