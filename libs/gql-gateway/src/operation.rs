use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Whether an operation reads (`Query`) or writes (`Mutation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When the local cache is consulted for a query.
///
/// Mutations ignore the policy and always run as [`CachePolicy::NetworkOnly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CachePolicy {
    /// Always go to the network (default)
    #[default]
    NetworkOnly,
    /// Serve a cached payload when present, otherwise go to the network
    CacheFirst,
    /// Serve the cached payload immediately, then the network payload
    ///
    /// Only [`RequestGateway::stream`](crate::RequestGateway::stream) yields
    /// both values; `execute` returns the network value.
    CacheAndNetwork,
}

impl CachePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkOnly => "network_only",
            Self::CacheFirst => "cache_first",
            Self::CacheAndNetwork => "cache_and_network",
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable key under which an operation's payload is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable description of a GraphQL query or mutation.
///
/// Cheap to clone: the document text is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    kind: OperationKind,
    name: Option<String>,
    document: Arc<str>,
    variables: Value,
}

impl Operation {
    /// Create a query operation from its document text.
    #[must_use]
    pub fn query(document: impl Into<Arc<str>>) -> Self {
        Self::new(OperationKind::Query, document)
    }

    /// Create a mutation operation from its document text.
    #[must_use]
    pub fn mutation(document: impl Into<Arc<str>>) -> Self {
        Self::new(OperationKind::Mutation, document)
    }

    fn new(kind: OperationKind, document: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            name: None,
            document: document.into(),
            variables: Value::Object(Map::new()),
        }
    }

    /// Set the `operationName` sent with the request.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the variables object sent with the request.
    ///
    /// A `null` value is normalized to an empty object.
    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = if variables.is_null() {
            Value::Object(Map::new())
        } else {
            variables
        };
        self
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn is_query(&self) -> bool {
        self.kind == OperationKind::Query
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn document(&self) -> &str {
        &self.document
    }

    #[must_use]
    pub fn variables(&self) -> &Value {
        &self.variables
    }

    /// Name used in logs and metrics; falls back to the operation kind.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }

    /// The policy actually applied for this operation.
    ///
    /// Mutations never consult the cache before executing.
    #[must_use]
    pub fn effective_policy(&self, requested: CachePolicy) -> CachePolicy {
        match self.kind {
            OperationKind::Query => requested,
            OperationKind::Mutation => CachePolicy::NetworkOnly,
        }
    }

    /// Stable cache key: name plus a SHA-256 digest of document and variables.
    ///
    /// Variables are hashed with object keys sorted, so equal variable objects
    /// produce equal keys regardless of insertion order.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.document.as_bytes());
        hasher.update([0]);
        hasher.update(canonical(&self.variables).to_string().as_bytes());
        let digest = hex::encode(hasher.finalize());
        CacheKey(format!("{}:{digest}", self.display_name()))
    }

    /// JSON body for a GraphQL-over-HTTP request.
    #[must_use]
    pub fn to_request_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".to_owned(), Value::String(self.document.to_string()));
        body.insert("variables".to_owned(), self.variables.clone());
        if let Some(name) = &self.name {
            body.insert("operationName".to_owned(), Value::String(name.clone()));
        }
        Value::Object(body)
    }
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mutation_ignores_requested_policy() {
        let op = Operation::mutation("mutation { logout }");
        assert_eq!(
            op.effective_policy(CachePolicy::CacheFirst),
            CachePolicy::NetworkOnly
        );

        let q = Operation::query("{ me { id } }");
        assert_eq!(
            q.effective_policy(CachePolicy::CacheAndNetwork),
            CachePolicy::CacheAndNetwork
        );
    }

    #[test]
    fn cache_key_ignores_variable_order() {
        let a = Operation::query("query U($a: Int, $b: Int) { u }")
            .with_variables(json!({"a": 1, "b": 2}));
        let mut vars = Map::new();
        vars.insert("b".to_owned(), json!(2));
        vars.insert("a".to_owned(), json!(1));
        let b = Operation::query("query U($a: Int, $b: Int) { u }")
            .with_variables(Value::Object(vars));

        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_differs_by_variables_and_kind() {
        let base = Operation::query("{ user(id: $id) { id } }");
        let one = base.clone().with_variables(json!({"id": "1"}));
        let two = base.clone().with_variables(json!({"id": "2"}));
        assert_ne!(one.cache_key(), two.cache_key());

        let as_mutation = Operation::mutation("{ user(id: $id) { id } }")
            .with_variables(json!({"id": "1"}));
        assert_ne!(one.cache_key(), as_mutation.cache_key());
    }

    #[test]
    fn cache_key_is_prefixed_with_display_name() {
        let op = Operation::query("{ me { id } }").with_name("Me");
        assert!(op.cache_key().as_str().starts_with("Me:"));

        let anon = Operation::query("{ me { id } }");
        assert!(anon.cache_key().as_str().starts_with("query:"));
    }

    #[test]
    fn request_body_includes_operation_name_when_set() {
        let op = Operation::query("query Me { me { id } }")
            .with_name("Me")
            .with_variables(json!({"x": true}));
        assert_eq!(
            op.to_request_body(),
            json!({
                "query": "query Me { me { id } }",
                "variables": {"x": true},
                "operationName": "Me",
            })
        );

        let anon = Operation::query("{ me { id } }").with_variables(Value::Null);
        assert_eq!(
            anon.to_request_body(),
            json!({"query": "{ me { id } }", "variables": {}})
        );
    }
}
