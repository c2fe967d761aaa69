//! Cross-crate tests driving the whole send pipeline:
//! discover UTXOs -> fetch raw transactions -> derive keys, build, sign ->
//! broadcast, against an in-memory indexer that answers every batch in
//! reverse order.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize_hex, serialize_hex};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use indexer_rpc::rpc::{RpcBatch, RpcResponse};
use indexer_rpc::IndexerError;
use rust_decimal_macros::dec;
use send_core::*;
use serde_json::{json, Value};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// BIP-84 account 0 extended public key for the test mnemonic.
const BIP84_ZPUB: &str = "zpub6rFR7y4Q2AijBEqTUquhVz398htDFrtymD9xYYfG1m4wAcvPhXNfE3EfH1r1ADqtfSdVCToUG868RvUUkgDKf31mGDtKsAYz2oz2AGutZYs";
const BIP84_ADDRESS_0: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

/// Secret key 1, compressed, and its P2PKH address.
const KEY_ONE_WIF: &str = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";
const KEY_ONE_P2PKH: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";

const RECIPIENT: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
const TIP: i64 = 800_010;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory Electrum server.
#[derive(Default)]
struct MockIndexer {
    unspent: HashMap<String, Vec<Value>>,
    raw: HashMap<String, String>,
    broadcasts: Mutex<Vec<String>>,
}

impl MockIndexer {
    /// Register `tx` and mark its output `vout` as unspent, confirmed at `height`.
    fn fund(&mut self, address: &str, tx: &Transaction, vout: u32, height: i64) {
        let txid = tx.compute_txid().to_string();
        let script_hash = script_hash_of(address, BtcNetwork::Mainnet).unwrap();
        self.unspent.entry(script_hash).or_default().push(json!({
            "tx_hash": txid,
            "tx_pos": vout,
            "height": height,
            "value": tx.output[vout as usize].value.to_sat(),
        }));
        self.raw.insert(txid, serialize_hex(tx));
    }

    fn answer(&self, method: &str, params: &[Value]) -> Result<Value, Value> {
        let param = params.first().and_then(Value::as_str).unwrap_or_default();
        match method {
            "server.version" => Ok(json!(["MockX 1.0", "1.4"])),
            "blockchain.headers.subscribe" => Ok(json!({"height": TIP, "hex": ""})),
            "blockchain.relayfee" => Ok(json!(0.00001)),
            "blockchain.scripthash.listunspent" => {
                Ok(Value::Array(self.unspent.get(param).cloned().unwrap_or_default()))
            }
            "blockchain.transaction.get" => self
                .raw
                .get(param)
                .map(|hex| json!(hex))
                .ok_or_else(|| json!({"code": 2, "message": "unknown transaction"})),
            "blockchain.transaction.broadcast" => {
                let tx: Transaction = deserialize_hex(param)
                    .map_err(|e| json!({"code": 1, "message": e.to_string()}))?;
                self.broadcasts.lock().unwrap().push(param.to_string());
                Ok(json!(tx.compute_txid().to_string()))
            }
            other => Err(json!({"code": -32601, "message": format!("unknown method {other}")})),
        }
    }
}

impl BatchTransport for MockIndexer {
    async fn submit(
        &self,
        _environment: &Environment,
        batch: &RpcBatch,
    ) -> Result<Vec<RpcResponse>, IndexerError> {
        Ok(batch
            .calls()
            .iter()
            .rev()
            .map(|call| match self.answer(&call.method, &call.params) {
                Ok(result) => RpcResponse::ok(call.id, result),
                Err(error) => RpcResponse::err(call.id, error),
            })
            .collect())
    }
}

fn funding_tx(address: &str, value_sat: u64, salt: u8) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_str(&format!("{salt:02x}").repeat(32)).unwrap(), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value_sat),
            script_pubkey: chain_btc::address::script_pubkey_for(address, BtcNetwork::Mainnet).unwrap(),
        }],
    }
}

/// Fee for spending `utxos` into `outputs` outputs at the fastest qualifying
/// tier, floored by the indexer's relay fee.
fn fee_for(utxos: &[UnspentOutput], outputs: usize, relay_fee: rust_decimal::Decimal) -> u64 {
    let tiers = [FeeTier::new(12, 35), FeeTier::new(5, 120)];
    let tier_rate = select_fee(30, &tiers).unwrap().rate_sat_vbyte;
    let rate = tier_rate.max(chain_btc::fee::relay_fee_sat_vbyte(relay_fee).unwrap());
    let purposes: Vec<ScriptPurpose> = utxos.iter().map(UnspentOutput::purpose).collect();
    chain_btc::fee::estimate_fee(&purposes, outputs, rate)
}

#[tokio::test]
async fn seed_phrase_send_end_to_end() {
    init_tracing();
    let mut indexer = MockIndexer::default();
    let first = funding_tx(BIP84_ADDRESS_0, 60_000, 0x01);
    let second = funding_tx(BIP84_ADDRESS_0, 40_000, 0x02);
    indexer.fund(BIP84_ADDRESS_0, &first, 0, 800_000);
    indexer.fund(BIP84_ADDRESS_0, &second, 0, 0);
    let client = IndexerClient::new(indexer);
    let environment = Environment::mainnet();

    let wallet = vec![Derived::new(BIP84_ADDRESS_0, "m/84'/0'/0'/0/0").unwrap()];
    let set = client.load_unspent(&wallet, &environment).await.unwrap();
    assert_eq!(set.tip_height, TIP);
    assert_eq!(set.minimum_relay_fee, dec!(0.00001));
    assert_eq!(set.utxos.len(), 1, "mempool output must be skipped");
    assert_eq!(set.utxos[0].confirmations, 11);
    assert_eq!(sum_values(&set.utxos), dec!(0.0006));

    let mut utxos = set.utxos;
    client.attach_raw_transactions(&mut utxos, &environment).await.unwrap();
    assert!(utxos.iter().all(|u| u.raw_tx.is_some()));

    let send = Output::new(RECIPIENT, dec!(0.0002));
    let fee = fee_for(&utxos, 2, set.minimum_relay_fee);
    let change_sat = 60_000 - 20_000 - fee;
    let change = Output::new(BIP84_ADDRESS_0, sat_to_btc(change_sat));

    let signed = create_mnemonic_transaction(
        TEST_MNEMONIC,
        None,
        Some(BIP84_ZPUB),
        &[send],
        Some(&change),
        &utxos,
        BtcNetwork::Mainnet,
    )
    .unwrap();
    assert_eq!(signed.fee_sat, fee);

    let parsed: Transaction = deserialize_hex(&signed.hex()).unwrap();
    assert_eq!(parsed.input.len(), 1);
    assert_eq!(parsed.input[0].previous_output.txid, first.compute_txid());
    assert_eq!(parsed.input[0].witness.len(), 2);
    assert_eq!(parsed.output.len(), 2);
    assert_eq!(parsed.output[0].value, Amount::from_sat(20_000));
    assert_eq!(parsed.output[1].value, Amount::from_sat(change_sat));

    let responses = client.broadcast(&signed.hex(), &environment).await.unwrap();
    let accepted = responses.iter().find(|r| r.id == 2).unwrap();
    assert_eq!(accepted.result, Some(json!(signed.txid)));
    assert_eq!(client.transport().broadcasts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn wif_legacy_send_end_to_end() {
    init_tracing();
    let mut indexer = MockIndexer::default();
    let funding = funding_tx(KEY_ONE_P2PKH, 30_000, 0x03);
    indexer.fund(KEY_ONE_P2PKH, &funding, 0, 799_500);
    let client = IndexerClient::new(indexer);
    let environment = Environment::mainnet();

    let wallet = vec![Derived::new(KEY_ONE_P2PKH, "m/44'/0'/0'/0/0").unwrap()];
    let mut utxos = client.load_unspent(&wallet, &environment).await.unwrap().utxos;
    client.attach_raw_transactions(&mut utxos, &environment).await.unwrap();

    let fee = fee_for(&utxos, 1, dec!(0.00001));
    let send = Output::new(RECIPIENT, sat_to_btc(30_000 - fee));
    let zero_change = Output::new(KEY_ONE_P2PKH, dec!(0));

    let signed = create_wif_transaction(
        &[send],
        Some(&zero_change),
        &utxos,
        KEY_ONE_WIF,
        None,
        BtcNetwork::Mainnet,
    )
    .unwrap();

    let parsed: Transaction = deserialize_hex(&signed.hex()).unwrap();
    assert_eq!(parsed.output.len(), 1, "zero change is omitted");
    assert!(!parsed.input[0].script_sig.is_empty());
    assert!(parsed.input[0].witness.is_empty());
    assert_eq!(signed.fee_sat, fee);

    let responses = client.broadcast(&signed.hex(), &environment).await.unwrap();
    assert!(responses.iter().all(|r| r.error.is_none()));
}

#[tokio::test]
async fn legacy_spend_without_raw_transaction_is_refused() {
    let mut indexer = MockIndexer::default();
    let funding = funding_tx(KEY_ONE_P2PKH, 30_000, 0x04);
    indexer.fund(KEY_ONE_P2PKH, &funding, 0, 799_500);
    let client = IndexerClient::new(indexer);

    let wallet = vec![Derived::new(KEY_ONE_P2PKH, "m/44'/0'/0'/0/0").unwrap()];
    let utxos = client.load_unspent(&wallet, &Environment::mainnet()).await.unwrap().utxos;

    let err = create_wif_transaction(
        &[Output::new(RECIPIENT, dec!(0.0001))],
        None,
        &utxos,
        KEY_ONE_WIF,
        None,
        BtcNetwork::Mainnet,
    )
    .unwrap_err();
    assert!(err.to_string().contains("raw"), "unexpected error: {err}");
}

#[tokio::test]
async fn seed_for_another_wallet_is_rejected() {
    let mut indexer = MockIndexer::default();
    indexer.fund(BIP84_ADDRESS_0, &funding_tx(BIP84_ADDRESS_0, 10_000, 0x05), 0, 800_000);
    let client = IndexerClient::new(indexer);

    let wallet = vec![Derived::new(BIP84_ADDRESS_0, "m/84'/0'/0'/0/0").unwrap()];
    let utxos = client.load_unspent(&wallet, &Environment::mainnet()).await.unwrap().utxos;

    let err = create_mnemonic_transaction(
        TEST_MNEMONIC,
        Some("not the wallet passphrase"),
        Some(BIP84_ZPUB),
        &[Output::new(RECIPIENT, dec!(0.00005))],
        None,
        &utxos,
        BtcNetwork::Mainnet,
    )
    .unwrap_err();
    assert!(matches!(err, send_core::error::WalletError::XpubMismatch { .. }));
}

#[tokio::test]
async fn unknown_transaction_aborts_raw_fetch() {
    let client = IndexerClient::new(MockIndexer::default());
    let derived = Derived::new(BIP84_ADDRESS_0, "m/84'/0'/0'/0/0").unwrap();
    let mut utxos = vec![UnspentOutput::new("ee".repeat(32), 0, 1_000, 10, derived)];

    let err = client
        .attach_raw_transactions(&mut utxos, &Environment::mainnet())
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::Rpc { id: 2, .. }));
    assert!(utxos[0].raw_tx.is_none());
}
