use std::fmt;
use std::sync::Arc;

use crate::cache::{CacheStore, MemoryCacheStore};
use crate::classify::classify;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::metrics::{GatewayEvent, GatewayMetrics, NoOpMetrics};
use crate::operation::{CachePolicy, Operation};
use crate::refresh::{CredentialRefresher, FollowerWait, RefreshCoordinator, RefreshOutcome};
use crate::response::Payload;
use crate::transport::Transport;

/// Single entry point through which repositories run GraphQL operations.
///
/// Cheap to clone; clones share the transport, cache and refresh register, so
/// at most one credential refresh is in flight per gateway regardless of how
/// many clones issue requests.
#[derive(Clone)]
pub struct RequestGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheStore>,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    coordinator: RefreshCoordinator,
    metrics: Arc<dyn GatewayMetrics>,
}

impl fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGateway")
            .field("has_refresher", &self.inner.refresher.is_some())
            .field("cached_entries", &self.inner.cache.len())
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestGateway`].
#[must_use]
pub struct RequestGatewayBuilder {
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn CacheStore>>,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    follower_wait: FollowerWait,
    metrics: Option<Arc<dyn GatewayMetrics>>,
}

impl RequestGatewayBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: None,
            refresher: None,
            follower_wait: FollowerWait::default(),
            metrics: None,
        }
    }

    /// Use a custom cache store (default: [`MemoryCacheStore`]).
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enable session recovery. Without a refresher an expired session is
    /// returned to the caller as [`GatewayError::AuthExpired`].
    pub fn refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn follower_wait(mut self, wait: FollowerWait) -> Self {
        self.follower_wait = wait;
        self
    }

    /// Take gateway-level settings from loaded configuration.
    pub fn config(self, config: &GatewayConfig) -> Self {
        self.follower_wait(config.follower_wait())
    }

    /// Use a metrics backend (default: [`NoOpMetrics`]).
    pub fn metrics(mut self, metrics: Arc<dyn GatewayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn build(self) -> RequestGateway {
        RequestGateway {
            inner: Arc::new(GatewayInner {
                transport: self.transport,
                cache: self
                    .cache
                    .unwrap_or_else(|| Arc::new(MemoryCacheStore::new())),
                refresher: self.refresher,
                coordinator: RefreshCoordinator::new(self.follower_wait),
                metrics: self.metrics.unwrap_or_else(|| Arc::new(NoOpMetrics)),
            }),
        }
    }
}

impl RequestGateway {
    pub fn builder(transport: Arc<dyn Transport>) -> RequestGatewayBuilder {
        RequestGatewayBuilder::new(transport)
    }

    /// Run one operation and return its final outcome.
    ///
    /// Mutations always go to the network. With [`CachePolicy::CacheFirst`] a
    /// cached payload is returned without a network call. An expired session
    /// triggers one coordinated credential refresh followed by exactly one
    /// retry; the retried outcome is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns the classified [`GatewayError`] of the final attempt, or the
    /// refresher's error when this call led a refresh that failed.
    pub async fn execute(&self, operation: &Operation, policy: CachePolicy) -> GatewayResult {
        let policy = operation.effective_policy(policy);
        if policy == CachePolicy::CacheFirst
            && let Some(hit) = self.cached(operation)
        {
            return Ok(hit);
        }
        self.fetch_with_recovery(operation, policy).await
    }

    /// Run a query against the network.
    ///
    /// # Errors
    ///
    /// See [`RequestGateway::execute`].
    pub async fn query(&self, operation: &Operation) -> GatewayResult {
        self.execute(operation, CachePolicy::NetworkOnly).await
    }

    /// Run a mutation.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidOperation`] for a query, otherwise see
    /// [`RequestGateway::execute`].
    pub async fn mutate(&self, operation: &Operation) -> GatewayResult {
        if operation.is_query() {
            return Err(GatewayError::InvalidOperation(format!(
                "'{}' is a query; use query() or execute()",
                operation.display_name()
            )));
        }
        self.execute(operation, CachePolicy::NetworkOnly).await
    }

    /// Run one operation without session recovery.
    ///
    /// An expired session is returned as [`GatewayError::AuthExpired`]. Use
    /// this from inside a [`CredentialRefresher`]; going through
    /// [`RequestGateway::execute`] there would wait on the refresh the
    /// refresher itself is running.
    ///
    /// # Errors
    ///
    /// Returns the classified [`GatewayError`] of the single attempt.
    pub async fn execute_unguarded(
        &self,
        operation: &Operation,
        policy: CachePolicy,
    ) -> GatewayResult {
        let policy = operation.effective_policy(policy);
        if policy == CachePolicy::CacheFirst
            && let Some(hit) = self.cached(operation)
        {
            return Ok(hit);
        }
        self.fetch(operation, policy).await
    }

    /// Renew the session now, sharing the cycle with any in-flight refresh.
    ///
    /// A no-op without a configured refresher.
    ///
    /// # Errors
    ///
    /// Returns the refresher's error when this call led the refresh and it
    /// failed.
    pub async fn refresh_session(&self) -> Result<(), GatewayError> {
        let Some(refresher) = &self.inner.refresher else {
            tracing::debug!("no credential refresher configured; nothing to refresh");
            return Ok(());
        };
        self.inner
            .coordinator
            .coordinate(|| refresher.refresh(self))
            .await
            .map(|_| ())
    }

    /// Drop every cached payload. In-flight operations are unaffected.
    pub fn clear_data(&self) {
        let dropped = self.inner.cache.len();
        self.inner.cache.clear_all();
        tracing::info!(entries = dropped, "cleared cached data");
    }

    /// Refresh register of this gateway.
    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// Cache store of this gateway.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.inner.cache
    }

    pub(crate) fn cached(&self, operation: &Operation) -> Option<Payload> {
        let hit = self.inner.cache.get(&operation.cache_key());
        let event = if hit.is_some() {
            GatewayEvent::CacheHit
        } else {
            GatewayEvent::CacheMiss
        };
        self.record(event, operation);
        hit
    }

    /// Network attempt plus session recovery.
    pub(crate) async fn fetch_with_recovery(
        &self,
        operation: &Operation,
        policy: CachePolicy,
    ) -> GatewayResult {
        match self.fetch(operation, policy).await {
            Err(e) if e.is_auth_expired() => self.recover(operation, e).await,
            other => other,
        }
    }

    /// One transport round trip, classified; successes are cached.
    async fn fetch(&self, operation: &Operation, policy: CachePolicy) -> GatewayResult {
        let raw = self.inner.transport.call(operation, policy).await;
        let result = classify(raw);

        match &result {
            Ok(payload) => self.inner.cache.put(operation.cache_key(), payload.clone()),
            Err(e) => tracing::debug!(
                operation = operation.display_name(),
                kind = %operation.kind(),
                %policy,
                error_kind = e.kind().as_str(),
                error = %e,
                "operation failed"
            ),
        }
        result
    }

    async fn recover(&self, operation: &Operation, expired: GatewayError) -> GatewayResult {
        self.record(GatewayEvent::AuthExpired, operation);

        let Some(refresher) = &self.inner.refresher else {
            tracing::warn!(
                operation = operation.display_name(),
                "session expired and no credential refresher is configured"
            );
            return Err(expired);
        };

        match self
            .inner
            .coordinator
            .coordinate(|| refresher.refresh(self))
            .await
        {
            Ok(RefreshOutcome::Refreshed) => self.record(GatewayEvent::RefreshSucceeded, operation),
            Ok(RefreshOutcome::Joined) => {}
            Ok(RefreshOutcome::WaitExceeded) => {
                self.record(GatewayEvent::FollowerWaitExceeded, operation);
            }
            Err(e) => {
                self.record(GatewayEvent::RefreshFailed, operation);
                return Err(e);
            }
        }

        tracing::debug!(
            operation = operation.display_name(),
            "retrying after credential refresh"
        );
        self.record(GatewayEvent::Retried, operation);
        self.fetch(operation, CachePolicy::NetworkOnly).await
    }

    fn record(&self, event: GatewayEvent, operation: &Operation) {
        self.inner
            .metrics
            .record_event(event, operation.display_name(), operation.kind());
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::response::GraphqlResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedTransport {
        calls: AtomicUsize,
        payload: serde_json::Value,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn call(
            &self,
            _operation: &Operation,
            _policy: CachePolicy,
        ) -> Result<GraphqlResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GraphqlResponse::data(self.payload.clone()))
        }
    }

    fn fixed(payload: serde_json::Value) -> Arc<FixedTransport> {
        Arc::new(FixedTransport {
            calls: AtomicUsize::new(0),
            payload,
        })
    }

    #[tokio::test]
    async fn cache_first_serves_hit_without_network() {
        let transport = fixed(json!({"me": {"id": "1"}}));
        let gateway = RequestGateway::builder(transport.clone()).build();
        let op = Operation::query("{ me { id } }").with_name("Me");

        gateway.execute(&op, CachePolicy::CacheFirst).await.unwrap();
        let second = gateway.execute(&op, CachePolicy::CacheFirst).await.unwrap();

        assert_eq!(second, json!({"me": {"id": "1"}}));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mutations_bypass_cache() {
        let transport = fixed(json!({"logout": true}));
        let gateway = RequestGateway::builder(transport.clone()).build();
        let op = Operation::mutation("mutation { logout }");

        gateway.execute(&op, CachePolicy::CacheFirst).await.unwrap();
        gateway.execute(&op, CachePolicy::CacheFirst).await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mutation_result_is_written_to_cache() {
        let op = Operation::mutation("mutation { logout }");
        let gateway = RequestGateway::builder(fixed(json!({"logout": true}))).build();

        gateway.mutate(&op).await.unwrap();

        assert_eq!(gateway.cache().len(), 1);
        assert_eq!(gateway.cache().get(&op.cache_key()), Some(json!({"logout": true})));
    }

    #[tokio::test]
    async fn clear_data_empties_cache() {
        let gateway = RequestGateway::builder(fixed(json!({"id": "1"}))).build();
        gateway.query(&Operation::query("{ id }")).await.unwrap();
        assert_eq!(gateway.cache().len(), 1);

        gateway.clear_data();
        assert!(gateway.cache().is_empty());
    }

    #[tokio::test]
    async fn mutate_rejects_queries() {
        let transport = fixed(json!({"id": "1"}));
        let gateway = RequestGateway::builder(transport.clone()).build();

        let err = gateway.mutate(&Operation::query("{ id }")).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidOperation(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_session_without_refresher_is_noop() {
        let gateway = RequestGateway::builder(fixed(json!({}))).build();
        gateway.refresh_session().await.unwrap();
        assert_eq!(gateway.coordinator().cycles(), 0);
    }
}
