//! Maps one raw transport outcome onto the gateway result contract.

use crate::error::{GatewayError, GatewayResult, TransportError};
use crate::response::GraphqlResponse;

/// Classify a raw transport outcome.
///
/// Order of precedence:
/// 1. unauthorized transport failure -> [`GatewayError::AuthExpired`]
/// 2. any other transport failure -> [`GatewayError::Transport`]
/// 3. GraphQL errors -> [`GatewayError::Business`] with the **first** error's
///    message only
/// 4. no errors and null/absent data -> [`GatewayError::NonExistentData`]
/// 5. otherwise the data payload
///
/// # Errors
///
/// Returns the classified [`GatewayError`] for every non-success outcome.
pub fn classify(raw: Result<GraphqlResponse, TransportError>) -> GatewayResult {
    let response = raw.map_err(GatewayError::from)?;

    if let Some(first) = response.errors.into_iter().next() {
        return Err(GatewayError::Business {
            message: first.message,
        });
    }

    match response.data {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(GatewayError::NonExistentData),
    }
}
