//! TLS connector construction.

use std::sync::Arc;

use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;

use crate::config::BuildError;

/// Get the crypto provider for TLS connections.
///
/// Uses the process-wide default provider when one is installed, otherwise an
/// aws-lc-rs provider that is not installed globally.
#[must_use]
pub fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build an HTTPS connector trusting the webpki root set.
///
/// With `allow_http` plain `http://` URIs are accepted as well.
///
/// # Errors
///
/// Returns [`BuildError::Tls`] if the provider rejects the default protocol
/// versions.
pub fn https_connector(allow_http: bool) -> Result<HttpsConnector<HttpConnector>, BuildError> {
    let builder = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(crypto_provider())
        .map_err(|e| BuildError::Tls(Box::new(e)))?;

    let connector = if allow_http {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}
