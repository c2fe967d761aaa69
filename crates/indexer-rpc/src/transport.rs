use std::future::Future;

use chain_btc::network::Environment;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::IndexerError;
use crate::rpc::{RpcBatch, RpcResponse};

/// Submits one batch and yields every response to it.
///
/// Implementations return the complete response set or an error; they never
/// hand back a partial batch and never retry.
pub trait BatchTransport {
    fn submit(
        &self,
        environment: &Environment,
        batch: &RpcBatch,
    ) -> impl Future<Output = Result<Vec<RpcResponse>, IndexerError>> + Send;
}

/// Body accepted by the HTTP-to-Electrum proxy.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyCall<'a> {
    server: &'a str,
    port: u16,
    /// Each call JSON-encoded as a string.
    procedure_list: Vec<String>,
}

/// Reaches the Electrum server through the wallet proxy over HTTPS.
#[derive(Debug, Clone, Default)]
pub struct ProxyTransport {
    client: reqwest::Client,
}

impl ProxyTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing client (connection pool, timeouts, proxies).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl BatchTransport for ProxyTransport {
    async fn submit(
        &self,
        environment: &Environment,
        batch: &RpcBatch,
    ) -> Result<Vec<RpcResponse>, IndexerError> {
        let procedure_list = batch
            .calls()
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IndexerError::Transport(format!("failed to encode call: {e}")))?;
        let body = ProxyCall {
            server: &environment.electrum_server,
            port: environment.electrum_port,
            procedure_list,
        };

        let url = environment.proxy_endpoint();
        debug!(%url, calls = batch.len(), "submitting batch");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IndexerError::Http { status, body });
        }

        let items: Vec<Value> = response
            .json()
            .await
            .map_err(|e| IndexerError::Transport(format!("failed to parse proxy response: {e}")))?;

        items.into_iter().map(parse_response).collect()
    }
}

/// The proxy may hand each response back as an object or as a JSON string.
fn parse_response(item: Value) -> Result<RpcResponse, IndexerError> {
    let parsed = match item {
        Value::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    };
    parsed.map_err(|e| IndexerError::Transport(format!("malformed response: {e}")))
}
