//! Metrics hooks for gateway events
//!
//! Backends (Prometheus, `StatsD`, ...) implement [`GatewayMetrics`]; the
//! gateway defaults to [`NoOpMetrics`].

use crate::operation::OperationKind;

/// Gateway event types for metrics tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Payload served from the local cache
    CacheHit,

    /// Cache consulted but empty for this operation
    CacheMiss,

    /// A call was rejected because the session expired
    AuthExpired,

    /// This operation led a credential refresh that succeeded
    RefreshSucceeded,

    /// This operation led a credential refresh that failed
    RefreshFailed,

    /// A follower gave up waiting for the leader and retried anyway
    FollowerWaitExceeded,

    /// The operation was retried after refresh coordination
    Retried,
}

impl GatewayEvent {
    /// Get the metric name for this event
    #[must_use]
    pub fn metric_name(&self) -> &'static str {
        match self {
            GatewayEvent::CacheHit => "gateway.cache.hit",
            GatewayEvent::CacheMiss => "gateway.cache.miss",
            GatewayEvent::AuthExpired => "gateway.auth.expired",
            GatewayEvent::RefreshSucceeded => "gateway.refresh.ok",
            GatewayEvent::RefreshFailed => "gateway.refresh.fail",
            GatewayEvent::FollowerWaitExceeded => "gateway.refresh.wait_exceeded",
            GatewayEvent::Retried => "gateway.retry",
        }
    }
}

/// Trait for metrics backends
pub trait GatewayMetrics: Send + Sync {
    /// Record a gateway event for an operation
    fn record_event(&self, event: GatewayEvent, operation: &str, kind: OperationKind);
}

/// No-op metrics implementation (default)
#[derive(Debug, Clone, Copy)]
pub struct NoOpMetrics;

impl GatewayMetrics for NoOpMetrics {
    fn record_event(&self, _event: GatewayEvent, _operation: &str, _kind: OperationKind) {
        // No-op
    }
}

/// Logging-based metrics implementation (for debugging)
#[derive(Debug, Clone, Copy)]
pub struct LoggingMetrics;

impl GatewayMetrics for LoggingMetrics {
    fn record_event(&self, event: GatewayEvent, operation: &str, kind: OperationKind) {
        tracing::debug!(
            metric = event.metric_name(),
            operation = operation,
            kind = kind.as_str(),
            "Gateway event recorded"
        );
    }
}
