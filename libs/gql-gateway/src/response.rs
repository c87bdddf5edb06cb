use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::GatewayError;

/// Successful response data. Never `null` once classified as success.
pub type Payload = serde_json::Value;

/// Location of a GraphQL error within the document (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// Segment of the response path an error refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphqlPathSegment {
    Key(String),
    Index(i64),
}

/// A GraphQL-level error reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub locations: Vec<GraphqlErrorLocation>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub path: Vec<GraphqlPathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl GraphqlError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }
}

/// Raw GraphQL response as returned by a [`Transport`](crate::Transport).
///
/// Either field may be present; the classifier decides what it means.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<GraphqlError>,
}

/// Servers may send `null` for an absent list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl GraphqlResponse {
    /// Response carrying only data.
    #[must_use]
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Response carrying only errors.
    #[must_use]
    pub fn errors(errors: Vec<GraphqlError>) -> Self {
        Self { data: None, errors }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Deserialize a payload into a caller-owned type.
///
/// # Errors
///
/// Returns [`GatewayError::Decode`] if the payload does not match `T`.
pub fn decode_payload<T: DeserializeOwned>(payload: Payload) -> Result<T, GatewayError> {
    serde_json::from_value(payload).map_err(|e| GatewayError::Decode(e.to_string()))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_graphql_error_response() {
        let raw = json!({
            "data": null,
            "errors": [{
                "message": "wrong password",
                "locations": [{"line": 2, "column": 3}],
                "path": ["login", 0],
                "extensions": {"code": "BAD_CREDENTIALS"}
            }]
        });

        let resp: GraphqlResponse = serde_json::from_value(raw).unwrap();
        assert!(resp.data.is_none());
        assert!(resp.has_errors());
        let err = &resp.errors[0];
        assert_eq!(err.message, "wrong password");
        assert_eq!(err.locations[0], GraphqlErrorLocation { line: 2, column: 3 });
        assert_eq!(
            err.path,
            vec![
                GraphqlPathSegment::Key("login".into()),
                GraphqlPathSegment::Index(0)
            ]
        );
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let resp: GraphqlResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(resp, GraphqlResponse::default());
    }

    #[test]
    fn null_lists_read_as_empty() {
        let resp: GraphqlResponse =
            serde_json::from_str(r#"{"data":{"id":"1"},"errors":null}"#).unwrap();
        assert_eq!(resp, GraphqlResponse::data(json!({"id": "1"})));

        let resp: GraphqlResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "denied", "locations": null, "path": null}]
        }))
        .unwrap();
        assert_eq!(resp.errors, vec![GraphqlError::new("denied")]);
    }

    #[test]
    fn decode_payload_reports_shape_mismatch() {
        #[derive(Debug, serde::Deserialize)]
        struct Me {
            #[allow(dead_code)]
            id: String,
        }

        let err = decode_payload::<Me>(json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }
}
