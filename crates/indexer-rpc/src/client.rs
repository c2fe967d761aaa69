//! Indexer operations built on one batched round trip each: UTXO discovery,
//! previous-transaction fetch and broadcast.

use std::str::FromStr;

use chain_btc::address::script_hash_of;
use chain_btc::network::Environment;
use chain_btc::utxo::{confirmations_at, Derived, UnspentOutput};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::IndexerError;
use crate::rpc::{
    ResponseMap, RpcBatch, RpcResponse, HEADERS_SUBSCRIBE, RELAY_FEE, SCRIPTHASH_LISTUNSPENT,
    TRANSACTION_BROADCAST, TRANSACTION_GET,
};
use crate::transport::BatchTransport;

const TIP_ID: u64 = 2;
const RELAY_FEE_ID: u64 = 3;
/// Id of the first per-address `listunspent` call in a discovery batch.
const FIRST_ADDRESS_ID: u64 = 4;
/// Id of the first `transaction.get` call in a raw fetch batch.
const FIRST_RAW_TX_ID: u64 = 2;

/// Result of UTXO discovery.
#[derive(Debug, Clone)]
pub struct UnspentSet {
    /// Minimum relay fee reported by the server, in BTC per kvB.
    pub minimum_relay_fee: Decimal,
    pub tip_height: i64,
    /// Confirmed outputs, grouped in input address order.
    pub utxos: Vec<UnspentOutput>,
}

#[derive(Debug, Deserialize)]
struct HeaderTip {
    height: i64,
}

#[derive(Debug, Deserialize)]
struct ListUnspentEntry {
    tx_hash: String,
    tx_pos: u32,
    height: i64,
    value: u64,
}

/// Indexer operations, one batched round trip each.
#[derive(Debug, Clone)]
pub struct IndexerClient<T> {
    transport: T,
}

impl<T: BatchTransport> IndexerClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn round_trip(&self, environment: &Environment, batch: &RpcBatch) -> Result<ResponseMap, IndexerError> {
        let responses = self.transport.submit(environment, batch).await?;
        ResponseMap::for_batch(batch, responses)
    }

    /// Discover the confirmed outputs of `derived` addresses together with
    /// the chain tip and the server's minimum relay fee.
    pub async fn load_unspent(
        &self,
        derived: &[Derived],
        environment: &Environment,
    ) -> Result<UnspentSet, IndexerError> {
        let mut batch = RpcBatch::with_handshake(&environment.electrum_protocol);
        batch.push(HEADERS_SUBSCRIBE, vec![]);
        batch.push(RELAY_FEE, vec![]);
        for entry in derived {
            let script_hash = script_hash_of(&entry.address, environment.network)?;
            batch.push(SCRIPTHASH_LISTUNSPENT, vec![Value::from(script_hash)]);
        }

        let responses = self.round_trip(environment, &batch).await?;

        let tip_height = responses.decode::<HeaderTip>(TIP_ID)?.height;
        let minimum_relay_fee = decimal_result(&responses, RELAY_FEE_ID)?;

        let mut utxos = Vec::new();
        let mut unconfirmed = 0usize;
        for (id, entry) in (FIRST_ADDRESS_ID..).zip(derived) {
            for item in responses.decode::<Vec<ListUnspentEntry>>(id)? {
                let mut utxo = UnspentOutput::new(item.tx_hash, item.tx_pos, item.value, item.height, entry.clone());
                utxo.confirmations = confirmations_at(tip_height, item.height);
                if utxo.confirmations == 0 {
                    unconfirmed += 1;
                    continue;
                }
                utxos.push(utxo);
            }
        }

        if unconfirmed > 0 {
            warn!(unconfirmed, "skipping outputs without confirmations");
        }
        info!(
            addresses = derived.len(),
            utxos = utxos.len(),
            tip_height,
            "unspent outputs loaded"
        );

        Ok(UnspentSet {
            minimum_relay_fee,
            tip_height,
            utxos,
        })
    }

    /// Fetch the full previous transaction (hex) of every UTXO, aligned with
    /// the input list.
    pub async fn fetch_raw_transactions(
        &self,
        utxos: &[UnspentOutput],
        environment: &Environment,
    ) -> Result<Vec<String>, IndexerError> {
        let mut batch = RpcBatch::with_handshake(&environment.electrum_protocol);
        for utxo in utxos {
            batch.push(TRANSACTION_GET, vec![Value::from(utxo.txid.as_str())]);
        }

        let responses = self.round_trip(environment, &batch).await?;

        let raw = (FIRST_RAW_TX_ID..)
            .take(utxos.len())
            .map(|id| responses.decode::<String>(id))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = raw.len(), "raw transactions fetched");
        Ok(raw)
    }

    /// Fetch and attach the previous transaction of every UTXO.
    pub async fn attach_raw_transactions(
        &self,
        utxos: &mut [UnspentOutput],
        environment: &Environment,
    ) -> Result<(), IndexerError> {
        let raw = self.fetch_raw_transactions(utxos, environment).await?;
        for (utxo, raw_tx) in utxos.iter_mut().zip(raw) {
            utxo.raw_tx = Some(raw_tx);
        }
        Ok(())
    }

    /// Submit a signed transaction. The raw response batch is returned
    /// as received.
    pub async fn broadcast(
        &self,
        transaction_hex: &str,
        environment: &Environment,
    ) -> Result<Vec<RpcResponse>, IndexerError> {
        let mut batch = RpcBatch::with_handshake(&environment.electrum_protocol);
        batch.push(TRANSACTION_BROADCAST, vec![Value::from(transaction_hex)]);

        let responses = self.transport.submit(environment, &batch).await?;
        info!(responses = responses.len(), "transaction submitted for broadcast");
        Ok(responses)
    }
}

/// Read a numeric result as an exact decimal.
fn decimal_result(responses: &ResponseMap, id: u64) -> Result<Decimal, IndexerError> {
    let unexpected = |reason: String| IndexerError::UnexpectedResult { id, reason };
    match responses.get(id)? {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(|e| unexpected(format!("{text} is not a decimal: {e}")))
        }
        Value::String(text) => Decimal::from_str(text).map_err(|e| unexpected(e.to_string())),
        other => Err(unexpected(format!("expected a number, got {other}"))),
    }
}
