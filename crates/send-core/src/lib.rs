//! Bitcoin send pipeline: key material and the two transaction entry points.
//!
//! Keys come either from a BIP-39 seed phrase (one BIP-32 derivation per
//! UTXO, checked against the account xpub) or from a single WIF key bound
//! to every UTXO. Both paths hand off to
//! [`chain_btc::transaction::build_transaction`].

pub mod error;
pub mod hd_derivation;
pub mod mnemonic;
pub mod private_key;

use std::collections::HashMap;

use bitcoin::secp256k1::Secp256k1;
use bitcoin::PrivateKey;
use chain_btc::address::{
    pubkey_to_p2pkh_address, pubkey_to_p2sh_p2wpkh_address, pubkey_to_p2wpkh_address, script_pubkey_for,
};
use tracing::info;
use zeroize::Zeroize;

use error::WalletError;

pub use chain_btc::address::{is_valid_address, script_hash_of};
pub use chain_btc::amount::{btc_to_sat, sat_to_btc, sum_values};
pub use chain_btc::fee::{select_fee, FeeTier};
pub use chain_btc::network::{BtcNetwork, Environment};
pub use chain_btc::transaction::{build_transaction, SignedBtcTx};
pub use chain_btc::utxo::{Derived, Output, ScriptPurpose, UnspentOutput};
pub use hd_derivation::derive_signing_key;
pub use indexer_rpc::{BatchTransport, IndexerClient, ProxyTransport, UnspentSet};
pub use mnemonic::{mnemonic_to_seed, validate_mnemonic};
pub use private_key::signing_key_from_wif;

/// Build and sign a transaction whose keys are derived from a seed phrase.
///
/// Each UTXO's key comes from its own derivation path. When `account_xpub`
/// is given, every path is checked against it before any signing happens.
pub fn create_mnemonic_transaction(
    mnemonic_phrase: &str,
    passphrase: Option<&str>,
    account_xpub: Option<&str>,
    outputs: &[Output],
    change: Option<&Output>,
    utxos: &[UnspentOutput],
    network: BtcNetwork,
) -> Result<SignedBtcTx, WalletError> {
    let mut seed = mnemonic::mnemonic_to_seed(mnemonic_phrase, passphrase.unwrap_or_default())?;
    let bound = bind_derived_keys(&seed, account_xpub, utxos, network);
    seed.zeroize();

    let signed = build_transaction(outputs, change, &bound?, network)?;
    info!(txid = %signed.txid, inputs = utxos.len(), "seed phrase transaction built");
    Ok(signed)
}

/// Build and sign a transaction spending UTXOs that all belong to the
/// address of one WIF-encoded key.
pub fn create_wif_transaction(
    outputs: &[Output],
    change: Option<&Output>,
    utxos: &[UnspentOutput],
    wif: &str,
    passphrase: Option<&str>,
    network: BtcNetwork,
) -> Result<SignedBtcTx, WalletError> {
    let key = private_key::signing_key_from_wif(wif, passphrase, network)?;

    let bound = utxos
        .iter()
        .map(|utxo| {
            ensure_key_controls(&key, &utxo.derived, network)
                .map_err(WalletError::InvalidPrivateKey)?;
            Ok(utxo.clone().with_signing_key(key))
        })
        .collect::<Result<Vec<_>, WalletError>>()?;

    let signed = build_transaction(outputs, change, &bound, network)?;
    info!(txid = %signed.txid, inputs = utxos.len(), "private key transaction built");
    Ok(signed)
}

fn bind_derived_keys(
    seed: &[u8],
    account_xpub: Option<&str>,
    utxos: &[UnspentOutput],
    network: BtcNetwork,
) -> Result<Vec<UnspentOutput>, WalletError> {
    let mut keys: HashMap<&str, PrivateKey> = HashMap::new();
    let mut bound = Vec::with_capacity(utxos.len());
    for utxo in utxos {
        let path = utxo.derived.path.as_str();
        let key = match keys.get(path) {
            Some(key) => *key,
            None => {
                let key = hd_derivation::derive_signing_key(seed, account_xpub, path, network)?;
                keys.insert(path, key);
                key
            }
        };
        ensure_key_controls(&key, &utxo.derived, network).map_err(WalletError::DerivationFailed)?;
        bound.push(utxo.clone().with_signing_key(key));
    }
    Ok(bound)
}

/// Check that `key` locks the same script as the derived address it is
/// about to sign for.
fn ensure_key_controls(key: &PrivateKey, derived: &Derived, network: BtcNetwork) -> Result<(), String> {
    let public_key = key.public_key(&Secp256k1::signing_only());
    let key_address = match derived.purpose {
        ScriptPurpose::Legacy => pubkey_to_p2pkh_address(&public_key.to_bytes(), network),
        ScriptPurpose::WrappedSegwit if public_key.compressed => {
            pubkey_to_p2sh_p2wpkh_address(&public_key.inner.serialize(), network)
        }
        ScriptPurpose::NativeSegwit if public_key.compressed => {
            pubkey_to_p2wpkh_address(&public_key.inner.serialize(), network)
        }
        _ => return Err(format!("uncompressed key cannot sign for {}", derived.address)),
    }
    .map_err(|e| e.to_string())?;

    let expected = script_pubkey_for(&derived.address, network).map_err(|e| e.to_string())?;
    let actual = script_pubkey_for(&key_address, network).map_err(|e| e.to_string())?;
    if expected != actual {
        return Err(format!("key for {} does not control {}", derived.path, derived.address));
    }
    Ok(())
}
