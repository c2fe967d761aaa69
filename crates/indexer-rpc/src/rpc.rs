use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IndexerError;

pub const SERVER_VERSION: &str = "server.version";
pub const HEADERS_SUBSCRIBE: &str = "blockchain.headers.subscribe";
pub const RELAY_FEE: &str = "blockchain.relayfee";
pub const SCRIPTHASH_LISTUNSPENT: &str = "blockchain.scripthash.listunspent";
pub const TRANSACTION_GET: &str = "blockchain.transaction.get";
pub const TRANSACTION_BROADCAST: &str = "blockchain.transaction.broadcast";

/// A single JSON-RPC call within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCall {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

/// An ordered batch of calls with ids assigned sequentially from 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcBatch {
    calls: Vec<RpcCall>,
}

impl RpcBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A batch opening with the `server.version` handshake (id 1).
    pub fn with_handshake(protocol_version: &str) -> Self {
        let mut batch = Self::new();
        batch.push(
            SERVER_VERSION,
            vec![Value::from(protocol_version), Value::from(protocol_version)],
        );
        batch
    }

    /// Append a call and return the id assigned to it.
    pub fn push(&mut self, method: &str, params: Vec<Value>) -> u64 {
        let id = self.calls.len() as u64 + 1;
        self.calls.push(RpcCall {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        });
        id
    }

    pub fn calls(&self) -> &[RpcCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// One response of a batch; exactly one of `result`/`error` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: Value) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Human readable form of the error member, if any.
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(Value::Null) => None,
            Some(Value::Object(obj)) => Some(
                obj.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
            ),
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Results of a completed batch, keyed by call id.
#[derive(Debug, Clone, Default)]
pub struct ResponseMap {
    results: BTreeMap<u64, Value>,
}

impl ResponseMap {
    /// Correlate `responses` with `batch`.
    ///
    /// Any error response fails the whole batch, as does a duplicate id, an
    /// id the batch never issued, or a call left unanswered.
    pub fn for_batch(batch: &RpcBatch, responses: Vec<RpcResponse>) -> Result<Self, IndexerError> {
        let mut results = BTreeMap::new();
        for response in responses {
            if let Some(message) = response.error_message() {
                return Err(IndexerError::Rpc {
                    id: response.id,
                    message,
                });
            }
            if response.id == 0 || response.id > batch.len() as u64 {
                return Err(IndexerError::UnknownResponse { id: response.id });
            }
            let result = response.result.unwrap_or(Value::Null);
            if results.insert(response.id, result).is_some() {
                return Err(IndexerError::DuplicateResponse(response.id));
            }
        }
        if let Some(call) = batch.calls().iter().find(|call| !results.contains_key(&call.id)) {
            return Err(IndexerError::MissingResponse(call.id));
        }
        Ok(Self { results })
    }

    pub fn get(&self, id: u64) -> Result<&Value, IndexerError> {
        self.results.get(&id).ok_or(IndexerError::MissingResponse(id))
    }

    /// Deserialize the result of call `id`.
    pub fn decode<T: DeserializeOwned>(&self, id: u64) -> Result<T, IndexerError> {
        let value = self.get(id)?.clone();
        serde_json::from_value(value).map_err(|e| IndexerError::UnexpectedResult {
            id,
            reason: e.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
