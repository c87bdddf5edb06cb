use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::refresh::FollowerWait;

/// Default User-Agent string for gateway HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("gql-gateway/", env!("CARGO_PKG_VERSION"));

/// Prefix of environment variables overriding file configuration,
/// e.g. `GQL_GATEWAY__TIMEOUT_SECONDS=3`.
pub const ENV_PREFIX: &str = "GQL_GATEWAY__";

/// Errors that can occur while loading or validating gateway configuration
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("config file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How much of each HTTP exchange the transport writes to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpLogLevel {
    /// Nothing
    None,
    /// Method, URL, status and elapsed time
    #[default]
    Basic,
    /// Basic plus headers (session header redacted)
    Headers,
    /// Headers plus request and response bodies
    Body,
}

impl HttpLogLevel {
    #[must_use]
    pub fn logs_headers(self) -> bool {
        matches!(self, Self::Headers | Self::Body)
    }

    #[must_use]
    pub fn logs_bodies(self) -> bool {
        matches!(self, Self::Body)
    }
}

/// Gateway and HTTP transport configuration.
///
/// Loaded in layers: built-in defaults, then an optional YAML file, then
/// `GQL_GATEWAY__*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// GraphQL endpoint; required
    pub base_url: String,

    /// Per-request timeout in seconds (default: 10)
    pub timeout_seconds: u64,

    /// Wire logging detail (default: basic)
    pub log_level: HttpLogLevel,

    /// Follower polls before proceeding without the leader (default: 10)
    pub max_follower_wait_iterations: u32,

    /// Delay between follower polls in milliseconds (default: 500)
    pub follower_poll_interval_ms: u64,

    /// Header carrying the session identifier (default: `authorization`)
    pub session_header: String,

    /// Scheme prepended to the session identifier (default: `Bearer`)
    pub session_scheme: Option<String>,

    /// User-Agent sent when the request has none
    pub user_agent: String,

    /// Permit plain `http://` endpoints (default: false)
    pub allow_insecure_http: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let wait = FollowerWait::default();
        Self {
            base_url: String::new(),
            timeout_seconds: 10,
            log_level: HttpLogLevel::default(),
            max_follower_wait_iterations: wait.max_iterations,
            follower_poll_interval_ms: u64::try_from(wait.poll_interval.as_millis())
                .unwrap_or(u64::MAX),
            session_header: "authorization".to_owned(),
            session_scheme: Some("Bearer".to_owned()),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            allow_insecure_http: false,
        }
    }
}

impl GatewayConfig {
    /// Create a configuration for `base_url` with every other key defaulted.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load layered configuration and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `path` is given but missing, a layer cannot
    /// be parsed, or the merged result fails [`GatewayConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        tracing::debug!(
            base_url = %config.base_url,
            timeout_seconds = config.timeout_seconds,
            "gateway configuration loaded"
        );
        Ok(config)
    }

    /// Check invariants the loaders cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty, unparsable or non-HTTP base URL,
    /// a plain `http` URL without `allow_insecure_http`, a zero timeout, a
    /// zero poll interval, or an empty session header.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid_url = |reason: &str| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: reason.to_owned(),
        };

        if self.base_url.trim().is_empty() {
            return Err(invalid_url("must not be empty"));
        }
        let url = url::Url::parse(&self.base_url).map_err(|e| invalid_url(&e.to_string()))?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http => {}
            "http" => return Err(invalid_url("plain http requires allow_insecure_http")),
            other => return Err(invalid_url(&format!("unsupported scheme '{other}'"))),
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("timeout_seconds must be > 0".into()));
        }
        if self.follower_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "follower_poll_interval_ms must be > 0".into(),
            ));
        }
        if self.session_header.trim().is_empty() {
            return Err(ConfigError::Invalid("session_header must not be empty".into()));
        }
        Ok(())
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Follower wait bound for the refresh coordinator.
    #[must_use]
    pub fn follower_wait(&self) -> FollowerWait {
        FollowerWait {
            max_iterations: self.max_follower_wait_iterations,
            poll_interval: Duration::from_millis(self.follower_poll_interval_ms),
        }
    }
}
