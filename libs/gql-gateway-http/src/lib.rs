#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP transport for the GraphQL request gateway
//!
//! This crate provides a hyper-based [`Transport`](gql_gateway::Transport)
//! with:
//! - Automatic TLS via rustls (HTTPS only unless `allow_insecure_http`)
//! - Per-request timeout
//! - Session header injection from a [`SessionProvider`](gql_gateway::SessionProvider)
//! - User-Agent header injection
//! - Wire logging at `none` / `basic` / `headers` / `body` detail, with the
//!   session header redacted
//! - Response body size limit (8 MiB by default)
//!
//! # Example
//!
//! ```ignore
//! use gql_gateway::{GatewayConfig, InMemorySessionProvider, RequestGateway};
//! use gql_gateway_http::HttpTransport;
//!
//! let config = GatewayConfig::load(Some(Path::new("gateway.yaml")))?;
//! let sessions = Arc::new(InMemorySessionProvider::with_session_id(sid));
//! let transport = HttpTransport::from_gateway_config(&config, sessions.clone())?;
//! let gateway = RequestGateway::builder(Arc::new(transport))
//!     .config(&config)
//!     .build();
//! ```

mod body;
mod config;
pub mod layers;
mod tls;
mod transport;

pub use config::{BuildError, DEFAULT_MAX_BODY_SIZE, ERROR_BODY_PREVIEW_LIMIT, HttpTransportConfig};
pub use transport::HttpTransport;
