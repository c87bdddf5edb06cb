//! Cache-then-network streaming for queries.

use futures::stream::{self, BoxStream, StreamExt};
use tokio::task::JoinHandle;

use crate::error::{GatewayError, GatewayResult, TransportError};
use crate::gateway::RequestGateway;
use crate::operation::{CachePolicy, Operation};
use crate::response::Payload;

/// Lazily started sequence of at most two results: the cached payload (if
/// any), then the network outcome. An error is always the last item.
pub type ResultStream = BoxStream<'static, GatewayResult>;

enum StreamState {
    NotStarted {
        gateway: RequestGateway,
        operation: Operation,
    },
    AwaitingNetwork(JoinHandle<GatewayResult>),
    Finished,
}

impl RequestGateway {
    /// Stream a query with the [`CachePolicy::CacheAndNetwork`] policy.
    ///
    /// Nothing happens until the stream is first polled. The cache is then
    /// read and the network request is issued in the background; the cached
    /// payload is yielded first and the network outcome (after session
    /// recovery, if needed) last. With an empty cache only the network outcome
    /// is yielded.
    ///
    /// A mutation yields a single [`GatewayError::InvalidOperation`].
    #[must_use]
    pub fn stream(&self, operation: Operation) -> ResultStream {
        if !operation.is_query() {
            let err = GatewayError::InvalidOperation(format!(
                "'{}' is a mutation; only queries can be streamed",
                operation.display_name()
            ));
            return stream::once(async move { Err(err) }).boxed();
        }

        let state = StreamState::NotStarted {
            gateway: self.clone(),
            operation,
        };
        stream::unfold(state, next_item).boxed()
    }
}

async fn next_item(state: StreamState) -> Option<(GatewayResult, StreamState)> {
    match state {
        StreamState::NotStarted { gateway, operation } => {
            let cached: Option<Payload> = gateway.cached(&operation);
            let network = tokio::spawn(async move {
                gateway
                    .fetch_with_recovery(&operation, CachePolicy::CacheAndNetwork)
                    .await
            });

            match cached {
                Some(payload) => Some((Ok(payload), StreamState::AwaitingNetwork(network))),
                None => Some((join(network).await, StreamState::Finished)),
            }
        }
        StreamState::AwaitingNetwork(network) => Some((join(network).await, StreamState::Finished)),
        StreamState::Finished => None,
    }
}

async fn join(network: JoinHandle<GatewayResult>) -> GatewayResult {
    network.await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "network task for streamed query did not complete");
        Err(TransportError::Network(Box::new(e)).into())
    })
}
