use bytes::Bytes;
use gql_gateway::TransportError;
use http_body::Body;
use http_body_util::BodyExt;
use tower::BoxError;

/// Collect a response body, failing once more than `limit` bytes arrive.
///
/// # Errors
///
/// Returns [`TransportError::InvalidResponse`] when the body exceeds `limit`
/// and [`TransportError::Network`] when reading a frame fails.
pub async fn read_body_limited<B>(body: B, limit: usize) -> Result<Bytes, TransportError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| TransportError::Network(e.into()))?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(TransportError::InvalidResponse(format!(
                    "response body exceeds {limit} bytes"
                )));
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

/// Read at most `limit` bytes of an error body for diagnostics.
///
/// # Errors
///
/// Returns [`TransportError::Network`] when reading a frame fails.
pub async fn read_body_preview<B>(body: B, limit: usize) -> Result<String, TransportError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match read_body_limited(body, limit).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(TransportError::InvalidResponse(_)) => Ok("<body too large for preview>".to_owned()),
        Err(e) => Err(e),
    }
}
