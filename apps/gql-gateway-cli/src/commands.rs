use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Args, ValueEnum};
use futures::StreamExt;
use gql_gateway::{
    CachePolicy, CredentialRefresher, GatewayConfig, GatewayError, InMemorySessionProvider,
    LoggingMetrics, Operation, Payload, RequestGateway, SessionProvider,
};
use gql_gateway_http::HttpTransport;
use secrecy::SecretString;
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    #[default]
    NetworkOnly,
    CacheFirst,
    CacheAndNetwork,
}

impl From<PolicyArg> for CachePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::NetworkOnly => Self::NetworkOnly,
            PolicyArg::CacheFirst => Self::CacheFirst,
            PolicyArg::CacheAndNetwork => Self::CacheAndNetwork,
        }
    }
}

#[derive(Args, Debug)]
pub struct OperationArgs {
    /// Operation document, or `@path` to read it from a file
    document: String,

    /// Operation name sent as `operationName`
    #[arg(short, long)]
    name: Option<String>,

    /// Variables as a JSON object
    #[arg(long, value_parser = parse_variables)]
    variables: Option<Value>,

    /// Cache policy (ignored for mutations)
    #[arg(short, long, value_enum, default_value = "network-only")]
    policy: PolicyArg,
}

impl OperationArgs {
    fn document(&self) -> anyhow::Result<String> {
        match self.document.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read operation document from {path}")),
            None => Ok(self.document.clone()),
        }
    }

    fn build(&self, constructor: fn(String) -> Operation) -> anyhow::Result<Operation> {
        let mut operation = constructor(self.document()?);
        if let Some(name) = &self.name {
            operation = operation.with_name(name.clone());
        }
        if let Some(variables) = &self.variables {
            operation = operation.with_variables(variables.clone());
        }
        Ok(operation)
    }
}

fn parse_variables(raw: &str) -> Result<Value, String> {
    match serde_json::from_str(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("variables must be a JSON object".to_owned()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Mutation that renews the session; enables refresh-and-retry on expiry
    #[arg(long, global = true)]
    refresh_mutation: Option<String>,

    /// JSON pointer to the new session id inside the refresh payload
    #[arg(long, global = true, default_value = "/refreshSession/sid")]
    refresh_pointer: String,
}

/// Renews the session by running a mutation through the gateway without
/// recovery and storing the session id found at `pointer`.
struct MutationRefresher {
    mutation: Operation,
    pointer: String,
    sessions: Arc<InMemorySessionProvider>,
}

#[async_trait]
impl CredentialRefresher for MutationRefresher {
    async fn refresh(&self, gateway: &RequestGateway) -> Result<(), GatewayError> {
        let payload = gateway
            .execute_unguarded(&self.mutation, CachePolicy::NetworkOnly)
            .await
            .map_err(|e| GatewayError::force_logout(e.to_string()))?;

        let session_id = payload
            .pointer(&self.pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GatewayError::force_logout(format!(
                    "refresh payload has no session id at {}",
                    self.pointer
                ))
            })?;

        self.sessions
            .set_session_id(SecretString::from(session_id.to_owned()));
        tracing::info!("session renewed");
        Ok(())
    }
}

/// Build the HTTP transport and the gateway on top of it.
pub fn connect(
    config: &GatewayConfig,
    session_id: Option<&str>,
    refresh: &RefreshArgs,
) -> anyhow::Result<RequestGateway> {
    let sessions = Arc::new(match session_id {
        Some(sid) => InMemorySessionProvider::with_session_id(sid),
        None => InMemorySessionProvider::new(),
    });

    let transport = HttpTransport::from_gateway_config(config, sessions.clone())
        .context("failed to build HTTP transport")?;

    let mut builder = RequestGateway::builder(Arc::new(transport))
        .config(config)
        .metrics(Arc::new(LoggingMetrics));

    if let Some(document) = &refresh.refresh_mutation {
        builder = builder.refresher(Arc::new(MutationRefresher {
            mutation: Operation::mutation(document.as_str()).with_name("RefreshSession"),
            pointer: refresh.refresh_pointer.clone(),
            sessions,
        }));
    }

    Ok(builder.build())
}

pub async fn query(gateway: &RequestGateway, args: &OperationArgs) -> anyhow::Result<()> {
    let operation = args.build(Operation::query)?;
    let payload = gateway.execute(&operation, args.policy.into()).await?;
    print_payload(&payload)
}

pub async fn mutate(gateway: &RequestGateway, args: &OperationArgs) -> anyhow::Result<()> {
    let operation = args.build(Operation::mutation)?;
    let payload = gateway.mutate(&operation).await?;
    print_payload(&payload)
}

/// Print every value the stream yields; the first error ends the command.
pub async fn stream(gateway: &RequestGateway, args: &OperationArgs) -> anyhow::Result<()> {
    let operation = args.build(Operation::query)?;
    let mut results = gateway.stream(operation);
    while let Some(item) = results.next().await {
        print_payload(&item?)?;
    }
    Ok(())
}

pub fn check(config: &GatewayConfig) -> anyhow::Result<()> {
    tracing::info!("checking configuration");
    let refresh = RefreshArgs {
        refresh_mutation: None,
        refresh_pointer: String::new(),
    };
    connect(config, None, &refresh)?;
    println!("Configuration is valid");
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn print_payload(payload: &Payload) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}
