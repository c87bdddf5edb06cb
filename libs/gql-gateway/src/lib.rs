#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! GraphQL request gateway
//!
//! This crate sits between repositories and a GraphQL transport and provides:
//! - A single result contract ([`GatewayResult`]) with a fixed error taxonomy
//! - A local response cache with `NetworkOnly`, `CacheFirst` and
//!   `CacheAndNetwork` policies
//! - Transparent recovery from session expiry: one coordinated credential
//!   refresh shared by all concurrent callers, then exactly one retry
//! - Cache-then-network streaming for queries
//!
//! The wire transport, the credential refresh logic and the session storage are
//! collaborators plugged in through the [`Transport`], [`CredentialRefresher`]
//! and [`SessionProvider`] traits.
//!
//! # Example
//!
//! ```ignore
//! use gql_gateway::{CachePolicy, Operation, RequestGateway};
//!
//! let gateway = RequestGateway::builder(transport)
//!     .refresher(Arc::new(MyRefresher::new(sessions.clone())))
//!     .build();
//!
//! let op = Operation::query("{ me { id name } }").with_name("Me");
//! let me = gateway.execute(&op, CachePolicy::CacheFirst).await?;
//! ```

mod cache;
mod classify;
mod config;
mod error;
mod gateway;
pub mod metrics;
mod operation;
mod refresh;
mod response;
mod session;
mod stream;
mod transport;

pub use cache::{CacheStore, MemoryCacheStore};
pub use classify::classify;
pub use config::{ConfigError, DEFAULT_USER_AGENT, ENV_PREFIX, GatewayConfig, HttpLogLevel};
pub use error::{ErrorKind, GatewayError, GatewayResult, TransportError};
pub use gateway::{RequestGateway, RequestGatewayBuilder};
pub use metrics::{GatewayEvent, GatewayMetrics, LoggingMetrics, NoOpMetrics};
pub use operation::{CacheKey, CachePolicy, Operation, OperationKind};
pub use refresh::{CredentialRefresher, FollowerWait, RefreshCoordinator, RefreshOutcome};
pub use response::{
    GraphqlError, GraphqlErrorLocation, GraphqlPathSegment, GraphqlResponse, Payload,
    decode_payload,
};
pub use session::{InMemorySessionProvider, SessionProvider};
pub use stream::ResultStream;
pub use transport::Transport;
