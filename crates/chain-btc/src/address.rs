use bitcoin::address::{Address, NetworkUnchecked};
use bitcoin::script::ScriptBuf;
use bitcoin::{CompressedPublicKey, PublicKey};
use sha2::{Digest, Sha256};

use crate::error::BtcError;
use crate::network::BtcNetwork;

/// Derive a P2WPKH (native SegWit bech32) address from a compressed public key.
///
/// Takes a 33-byte compressed secp256k1 public key and returns a bech32 address
/// string: `bc1...` for mainnet, `tb1...` for testnet/signet.
pub fn pubkey_to_p2wpkh_address(
    pubkey_bytes: &[u8; 33],
    network: BtcNetwork,
) -> Result<String, BtcError> {
    let compressed_pk = parse_compressed(pubkey_bytes)?;
    let address = Address::p2wpkh(&compressed_pk, network.to_bitcoin_network());
    Ok(address.to_string())
}

/// Derive a P2SH-wrapped P2WPKH address (`3...` on mainnet, `2...` on testnet).
pub fn pubkey_to_p2sh_p2wpkh_address(
    pubkey_bytes: &[u8; 33],
    network: BtcNetwork,
) -> Result<String, BtcError> {
    let compressed_pk = parse_compressed(pubkey_bytes)?;
    let address = Address::p2shwpkh(&compressed_pk, network.to_bitcoin_network());
    Ok(address.to_string())
}

/// Derive a legacy P2PKH address. Accepts compressed or uncompressed keys.
pub fn pubkey_to_p2pkh_address(pubkey_bytes: &[u8], network: BtcNetwork) -> Result<String, BtcError> {
    let public_key = PublicKey::from_slice(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse public key: {e}"))
    })?;
    let address = Address::p2pkh(public_key.pubkey_hash(), network.to_bitcoin_network());
    Ok(address.to_string())
}

fn parse_compressed(pubkey_bytes: &[u8; 33]) -> Result<CompressedPublicKey, BtcError> {
    CompressedPublicKey::from_slice(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
    })
}

/// Parse an address and require that it belongs to `network`.
pub fn parse_address(address: &str, network: BtcNetwork) -> Result<Address, BtcError> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("{address}: {e}")))?
        .require_network(network.to_bitcoin_network())
        .map_err(|e| BtcError::InvalidAddress(format!("{address}: {e}")))
}

/// Derive the locking script (scriptPubKey) paying to `address`.
pub fn script_pubkey_for(address: &str, network: BtcNetwork) -> Result<ScriptBuf, BtcError> {
    Ok(parse_address(address, network)?.script_pubkey())
}

/// Returns `true` if a locking script can be derived from `address` under
/// `network`. Parse failures of any kind yield `false`.
pub fn is_valid_address(address: &str, network: BtcNetwork) -> bool {
    script_pubkey_for(address, network).is_ok()
}

/// Electrum lookup key for an address: SHA-256 of the locking script with
/// the digest bytes reversed, hex encoded.
pub fn script_hash_of(address: &str, network: BtcNetwork) -> Result<String, BtcError> {
    let script = script_pubkey_for(address, network)?;
    let mut digest: [u8; 32] = Sha256::digest(script.as_bytes()).into();
    digest.reverse();
    Ok(hex::encode(digest))
}
