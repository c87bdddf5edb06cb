use std::time::Duration;

use gql_gateway::{ConfigError, GatewayConfig, HttpLogLevel};
use http::header::HeaderName;
use http::Uri;
use thiserror::Error;

/// Maximum response body size (8 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Maximum number of body bytes quoted in a non-2xx error
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Errors that can occur while constructing an [`HttpTransport`](crate::HttpTransport)
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Resolved settings of the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// GraphQL endpoint every operation is POSTed to
    pub endpoint: Uri,

    /// Per-request timeout
    pub timeout: Duration,

    /// Wire logging detail
    pub log_level: HttpLogLevel,

    /// Header carrying the session identifier
    pub session_header: HeaderName,

    /// Scheme prepended to the session identifier, e.g. `Bearer`
    pub session_scheme: Option<String>,

    /// User-Agent sent when the request has none
    pub user_agent: String,

    /// Permit plain `http://` endpoints
    pub allow_insecure_http: bool,

    /// Response bodies larger than this are rejected
    pub max_body_size: usize,
}

impl HttpTransportConfig {
    /// Resolve transport settings from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the configuration fails validation, the base
    /// URL is not a valid URI, or the session header name is invalid.
    pub fn from_gateway_config(config: &GatewayConfig) -> Result<Self, BuildError> {
        config.validate()?;

        let endpoint = config
            .base_url
            .parse::<Uri>()
            .map_err(|e| BuildError::InvalidEndpoint {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })?;
        let session_header = HeaderName::from_bytes(config.session_header.trim().as_bytes())?;

        Ok(Self {
            endpoint,
            timeout: config.timeout(),
            log_level: config.log_level,
            session_header,
            session_scheme: config
                .session_scheme
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            user_agent: config.user_agent.clone(),
            allow_insecure_http: config.allow_insecure_http,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        })
    }

    /// Override the response body limit.
    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }
}
