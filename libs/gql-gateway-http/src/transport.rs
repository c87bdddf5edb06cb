use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gql_gateway::{
    CachePolicy, GatewayConfig, GraphqlResponse, HttpLogLevel, Operation, SessionProvider,
    Transport, TransportError,
};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, ServiceBuilder, ServiceExt};

use crate::body::{read_body_limited, read_body_preview};
use crate::config::{BuildError, ERROR_BODY_PREVIEW_LIMIT, HttpTransportConfig};
use crate::layers::{SessionHeaderLayer, UserAgentLayer, WireLogLayer};
use crate::tls;

type GraphqlService = BoxCloneSyncService<Request<Full<Bytes>>, Response<Incoming>, TransportError>;

const APPLICATION_JSON: &str = "application/json";

/// [`Transport`] that POSTs GraphQL operations over HTTP(S).
///
/// Each request passes through a tower stack (outer to inner):
///
/// ```text
/// Timeout -> SessionHeader -> UserAgent -> WireLog -> hyper client
/// ```
///
/// The session header is read from the [`SessionProvider`] on every attempt,
/// so the gateway's retry after a credential refresh carries the new session.
/// HTTP 401 is reported as [`TransportError::Unauthorized`] and never retried
/// here.
#[derive(Clone)]
pub struct HttpTransport {
    service: GraphqlService,
    endpoint: Uri,
    log_level: HttpLogLevel,
    max_body_size: usize,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("log_level", &self.log_level)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build a transport from resolved settings.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if TLS initialization fails or the user agent is
    /// not a valid header value.
    pub fn new(
        config: HttpTransportConfig,
        sessions: Arc<dyn SessionProvider>,
    ) -> Result<Self, BuildError> {
        if config.allow_insecure_http {
            tracing::warn!(
                endpoint = %config.endpoint,
                "insecure HTTP enabled; use only for testing with mock servers"
            );
        }

        let timeout = config.timeout;
        let https = tls::https_connector(config.allow_insecure_http)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        client_builder.pool_timer(TokioTimer::new());
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let ua_layer = UserAgentLayer::try_new(&config.user_agent)?;
        let session_layer = SessionHeaderLayer::new(
            sessions,
            config.session_header.clone(),
            config.session_scheme.as_deref(),
        );

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(session_layer)
            .layer(ua_layer)
            .layer(WireLogLayer::new(config.log_level, config.session_header))
            .service(hyper_client)
            .map_err(move |e: BoxError| map_tower_error(e, timeout));

        Ok(Self {
            service: BoxCloneSyncService::new(service),
            endpoint: config.endpoint,
            log_level: config.log_level,
            max_body_size: config.max_body_size,
        })
    }

    /// Build a transport straight from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the configuration is invalid or the transport
    /// cannot be built.
    pub fn from_gateway_config(
        config: &GatewayConfig,
        sessions: Arc<dyn SessionProvider>,
    ) -> Result<Self, BuildError> {
        Self::new(HttpTransportConfig::from_gateway_config(config)?, sessions)
    }

    #[must_use]
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    fn build_request(&self, operation: &Operation) -> Result<Request<Full<Bytes>>, TransportError> {
        let body = serde_json::to_vec(&operation.to_request_body())
            .map_err(|e| TransportError::Build(e.to_string()))?;

        if self.log_level.logs_bodies() {
            tracing::debug!(
                operation = operation.display_name(),
                body = %String::from_utf8_lossy(&body),
                "--> request body"
            );
        }

        Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON)
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| TransportError::Build(e.to_string()))
    }

    async fn read_response(
        &self,
        operation: &Operation,
        response: Response<Incoming>,
    ) -> Result<GraphqlResponse, TransportError> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(TransportError::unauthorized(format!(
                "HTTP 401 for operation '{}'",
                operation.display_name()
            )));
        }

        if !status.is_success() {
            let preview_limit = self.max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
            let body_preview = read_body_preview(response.into_body(), preview_limit).await?;
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body_preview,
            });
        }

        let bytes = read_body_limited(response.into_body(), self.max_body_size).await?;
        if self.log_level.logs_bodies() {
            tracing::debug!(
                operation = operation.display_name(),
                body = %String::from_utf8_lossy(&bytes),
                "<-- response body"
            );
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::InvalidResponse(format!("not a GraphQL response: {e}"))
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        operation: &Operation,
        policy: CachePolicy,
    ) -> Result<GraphqlResponse, TransportError> {
        tracing::trace!(
            operation = operation.display_name(),
            kind = %operation.kind(),
            %policy,
            "sending operation"
        );

        let request = self.build_request(operation)?;
        let response = self.service.clone().oneshot(request).await?;
        self.read_response(operation, response).await
    }
}

/// Map tower errors to `TransportError` with the actual timeout duration.
///
/// Typed errors boxed by inner layers are passed through unchanged.
fn map_tower_error(err: BoxError, timeout: Duration) -> TransportError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return TransportError::Timeout(timeout);
    }

    match err.downcast::<TransportError>() {
        Ok(transport_err) => *transport_err,
        Err(other) => TransportError::Network(other),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn elapsed_maps_to_timeout() {
        let err: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert!(matches!(
            map_tower_error(err, Duration::from_secs(3)),
            TransportError::Timeout(d) if d == Duration::from_secs(3)
        ));
    }

    #[test]
    fn boxed_transport_error_is_passed_through() {
        let err: BoxError = Box::new(TransportError::Build("bad header".into()));
        assert!(matches!(
            map_tower_error(err, Duration::from_secs(3)),
            TransportError::Build(_)
        ));
    }

    #[test]
    fn other_errors_are_network() {
        let err: BoxError = Box::new(std::io::Error::other("reset"));
        assert!(matches!(
            map_tower_error(err, Duration::from_secs(3)),
            TransportError::Network(_)
        ));
    }

    #[test]
    fn transport_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<HttpTransport>();
    }
}
