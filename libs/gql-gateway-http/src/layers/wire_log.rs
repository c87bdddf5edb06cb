use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use gql_gateway::HttpLogLevel;
use http::header::HeaderName;
use http::{HeaderMap, Request, Response};
use tower::{Layer, Service};

const REDACTED: &str = "<redacted>";

/// Tower layer that logs each HTTP exchange at the configured detail.
///
/// Sits innermost so it sees the final request headers. The session header
/// and any header marked sensitive are never logged in clear.
#[derive(Clone, Debug)]
pub struct WireLogLayer {
    level: HttpLogLevel,
    redact: HeaderName,
}

impl WireLogLayer {
    #[must_use]
    pub fn new(level: HttpLogLevel, redact: HeaderName) -> Self {
        Self { level, redact }
    }
}

impl<S> Layer<S> for WireLogLayer {
    type Service = WireLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WireLogService {
            inner,
            level: self.level,
            redact: self.redact.clone(),
        }
    }
}

/// Created by [`WireLogLayer`].
#[derive(Clone, Debug)]
pub struct WireLogService<S> {
    inner: S,
    level: HttpLogLevel,
    redact: HeaderName,
}

impl<S, B, ResBody> Service<Request<B>> for WireLogService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: fmt::Display + Send + 'static,
    B: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let level = self.level;
        let redact = self.redact.clone();
        let method = req.method().clone();
        let uri = req.uri().clone();

        if level.logs_headers() {
            tracing::debug!(
                http.method = %method,
                http.url = %uri,
                headers = %format_headers(req.headers(), &redact),
                "--> request headers"
            );
        }

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let started = Instant::now();
            let result = inner.call(req).await;
            if level == HttpLogLevel::None {
                return result;
            }

            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            match &result {
                Ok(response) => {
                    tracing::debug!(
                        http.method = %method,
                        http.url = %uri,
                        http.status_code = response.status().as_u16(),
                        elapsed_ms,
                        "<-- response"
                    );
                    if level.logs_headers() {
                        tracing::debug!(
                            headers = %format_headers(response.headers(), &redact),
                            "<-- response headers"
                        );
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        http.method = %method,
                        http.url = %uri,
                        elapsed_ms,
                        error = %e,
                        "<-- request failed"
                    );
                }
            }
            result
        })
    }
}

fn format_headers(headers: &HeaderMap, redact: &HeaderName) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if name == redact || value.is_sensitive() {
                REDACTED
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            format!("{name}: {shown}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
