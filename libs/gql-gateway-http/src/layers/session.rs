use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use gql_gateway::{SessionProvider, TransportError};
use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderValue, Request, Response};
use secrecy::ExposeSecret;
use tower::{BoxError, Layer, Service};

/// Tower layer that injects the current session identifier into outbound
/// requests.
///
/// The [`SessionProvider`] is read on every call, so a retried request carries
/// whatever identifier a credential refresh stored in the meantime. Without a
/// session the header is left out.
#[derive(Clone)]
pub struct SessionHeaderLayer {
    sessions: Arc<dyn SessionProvider>,
    header_name: HeaderName,
    scheme: Option<Arc<str>>,
}

impl fmt::Debug for SessionHeaderLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHeaderLayer")
            .field("header_name", &self.header_name)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl SessionHeaderLayer {
    /// Inject `Authorization: Bearer <session>`.
    #[must_use]
    pub fn bearer(sessions: Arc<dyn SessionProvider>) -> Self {
        Self::new(sessions, AUTHORIZATION, Some("Bearer"))
    }

    /// Inject `<header_name>: [<scheme> ]<session>`.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        header_name: HeaderName,
        scheme: Option<&str>,
    ) -> Self {
        Self {
            sessions,
            header_name,
            scheme: scheme.map(Arc::from),
        }
    }
}

impl<S> Layer<S> for SessionHeaderLayer {
    type Service = SessionHeaderService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionHeaderService {
            inner,
            sessions: Arc::clone(&self.sessions),
            header_name: self.header_name.clone(),
            scheme: self.scheme.clone(),
        }
    }
}

/// Created by [`SessionHeaderLayer`].
#[derive(Clone)]
pub struct SessionHeaderService<S> {
    inner: S,
    sessions: Arc<dyn SessionProvider>,
    header_name: HeaderName,
    scheme: Option<Arc<str>>,
}

impl<S> SessionHeaderService<S> {
    fn header_value(&self) -> Result<Option<HeaderValue>, TransportError> {
        let Some(session) = self.sessions.session_id() else {
            return Ok(None);
        };

        let raw = zeroize::Zeroizing::new(match &self.scheme {
            Some(scheme) => format!("{scheme} {}", session.expose_secret()),
            None => session.expose_secret().to_owned(),
        });
        let mut value = HeaderValue::from_str(&raw)
            .map_err(|e| TransportError::Build(format!("invalid session header value: {e}")))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}

impl<S, B, ResBody> Service<Request<B>> for SessionHeaderService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    B: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        match self.header_value() {
            Ok(Some(value)) => {
                req.headers_mut().insert(self.header_name.clone(), value);
            }
            Ok(None) => {
                req.headers_mut().remove(&self.header_name);
            }
            Err(e) => return Box::pin(async move { Err(Box::new(e) as BoxError) }),
        }

        // Clone-swap pattern (Tower Service contract).
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move { inner.call(req).await.map_err(Into::into) })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use gql_gateway::InMemorySessionProvider;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use secrecy::SecretString;
    use std::convert::Infallible;
    use tower::ServiceExt;

    /// Echoes the injected header back as the response body.
    #[derive(Clone)]
    struct EchoHeaderService {
        header: HeaderName,
    }

    impl Service<Request<Full<Bytes>>> for EchoHeaderService {
        type Response = Response<Option<String>>;
        type Error = Infallible;
        type Future = std::future::Ready<Result<Self::Response, Infallible>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let value = req.headers().get(&self.header).map(|v| {
                assert!(v.is_sensitive());
                v.to_str().unwrap().to_owned()
            });
            std::future::ready(Ok(Response::builder()
                .status(StatusCode::OK)
                .body(value)
                .unwrap()))
        }
    }

    fn request() -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri("http://example.com/graphql")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[test]
    fn session_header_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<SessionHeaderLayer>();
        assert_traits::<SessionHeaderService<EchoHeaderService>>();
    }

    #[tokio::test]
    async fn injects_bearer_session() {
        let sessions = Arc::new(InMemorySessionProvider::with_session_id("sid-0"));
        let svc = SessionHeaderLayer::bearer(sessions).layer(EchoHeaderService {
            header: AUTHORIZATION,
        });

        let response = svc.oneshot(request()).await.unwrap();
        assert_eq!(response.body().as_deref(), Some("Bearer sid-0"));
    }

    #[tokio::test]
    async fn reads_session_on_every_call() {
        let sessions = Arc::new(InMemorySessionProvider::with_session_id("sid-0"));
        let header = HeaderName::from_static("x-session-id");
        let svc = SessionHeaderLayer::new(sessions.clone(), header.clone(), None)
            .layer(EchoHeaderService { header });

        let first = svc.clone().oneshot(request()).await.unwrap();
        sessions.set_session_id(SecretString::from("sid-1"));
        let second = svc.oneshot(request()).await.unwrap();

        assert_eq!(first.body().as_deref(), Some("sid-0"));
        assert_eq!(second.body().as_deref(), Some("sid-1"));
    }

    #[tokio::test]
    async fn omits_header_without_session() {
        let sessions = Arc::new(InMemorySessionProvider::new());
        let svc = SessionHeaderLayer::bearer(sessions).layer(EchoHeaderService {
            header: AUTHORIZATION,
        });

        let response = svc.oneshot(request()).await.unwrap();
        assert!(response.body().is_none());
    }

    #[tokio::test]
    async fn invalid_session_value_is_build_error() {
        let sessions = Arc::new(InMemorySessionProvider::with_session_id("bad\nvalue"));
        let svc = SessionHeaderLayer::bearer(sessions).layer(EchoHeaderService {
            header: AUTHORIZATION,
        });

        let err = svc.oneshot(request()).await.unwrap_err();
        let transport = err.downcast::<TransportError>().unwrap();
        assert!(matches!(*transport, TransportError::Build(_)));
    }
}
