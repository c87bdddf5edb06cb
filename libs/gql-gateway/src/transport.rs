use async_trait::async_trait;

use crate::error::TransportError;
use crate::operation::{CachePolicy, Operation};
use crate::response::GraphqlResponse;

/// Performs one network round trip for one operation.
///
/// Implementations must not retry authentication failures themselves: an
/// expired session is reported as [`TransportError::Unauthorized`] and the
/// gateway decides whether to refresh and retry.
///
/// The cache policy is passed through as a hint for transports that keep an
/// HTTP-level cache; the gateway's own [`CacheStore`](crate::CacheStore) is
/// consulted before the transport is called.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        operation: &Operation,
        policy: CachePolicy,
    ) -> Result<GraphqlResponse, TransportError>;
}
