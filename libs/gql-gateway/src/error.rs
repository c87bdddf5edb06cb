use std::time::Duration;
use thiserror::Error;

use crate::response::Payload;

/// Result returned to gateway callers.
pub type GatewayResult<T = Payload> = Result<T, GatewayError>;

/// Coarse classification of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Server-reported domain error (e.g. wrong password)
    Business,
    /// Session is no longer valid and could not be renewed here
    AuthExpired,
    /// Credential refresh failed; the caller should log the user out
    ForceLogout,
    /// Network or IO failure
    Transport,
    /// Transport succeeded but the response carried no data
    NonExistentData,
    /// The caller asked for something the gateway cannot do
    Usage,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::AuthExpired => "auth_expired",
            Self::ForceLogout => "force_logout",
            Self::Transport => "transport",
            Self::NonExistentData => "non_existent_data",
            Self::Usage => "usage",
        }
    }
}

/// Failure of one network round trip, as reported by a transport.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The server rejected the session (HTTP 401 or equivalent)
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// The round trip did not complete in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status other than 401
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus { status: u16, body_preview: String },

    /// Connection, DNS, TLS or IO failure
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The response body could not be read as a GraphQL response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built
    #[error("failed to build request: {0}")]
    Build(String),
}

impl TransportError {
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Error half of every [`GatewayResult`].
///
/// Callers never see raw transport failures; they arrive wrapped in
/// [`GatewayError::Transport`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// First GraphQL error reported by the server
    #[error("{message}")]
    Business { message: String },

    /// Session expired and no refresh could be attempted
    #[error("session expired: {message}")]
    AuthExpired { message: String },

    /// Credential refresh failed
    #[error("forced logout: {reason}")]
    ForceLogout { reason: String },

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// Response had neither errors nor data
    #[error("Data received is null")]
    NonExistentData,

    /// Operation not valid for the requested call (e.g. streaming a mutation)
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Payload did not match the requested type
    #[error("failed to decode payload: {0}")]
    Decode(String),
}

impl GatewayError {
    #[must_use]
    pub fn business(message: impl Into<String>) -> Self {
        Self::Business {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn force_logout(reason: impl Into<String>) -> Self {
        Self::ForceLogout {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Business { .. } => ErrorKind::Business,
            Self::AuthExpired { .. } => ErrorKind::AuthExpired,
            Self::ForceLogout { .. } => ErrorKind::ForceLogout,
            Self::Transport(_) => ErrorKind::Transport,
            Self::NonExistentData => ErrorKind::NonExistentData,
            Self::InvalidOperation(_) | Self::Decode(_) => ErrorKind::Usage,
        }
    }

    /// True when this error should trigger the refresh-and-retry protocol.
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired { .. })
    }
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized { message } => Self::AuthExpired { message },
            other => Self::Transport(other),
        }
    }
}
