use bitcoin::{NetworkKind, PrivateKey};
use chain_btc::network::BtcNetwork;

use crate::error::WalletError;

/// Prefix of BIP-38 passphrase-protected keys.
const BIP38_PREFIX: &str = "6P";

/// Import a WIF-encoded private key for `network`.
///
/// Passphrase-protected (BIP-38) keys are not supported; they are rejected
/// whether or not a passphrase is supplied.
pub fn signing_key_from_wif(
    wif: &str,
    passphrase: Option<&str>,
    network: BtcNetwork,
) -> Result<PrivateKey, WalletError> {
    let wif = wif.trim();
    if wif.starts_with(BIP38_PREFIX) {
        return Err(WalletError::InvalidPrivateKey(
            "BIP-38 encrypted keys are not supported".into(),
        ));
    }
    if passphrase.is_some_and(|p| !p.is_empty()) {
        return Err(WalletError::InvalidPrivateKey(
            "a passphrase only applies to encrypted keys".into(),
        ));
    }

    let key = PrivateKey::from_wif(wif)
        .map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))?;

    let expected = NetworkKind::from(network.to_bitcoin_network());
    if key.network != expected {
        return Err(WalletError::InvalidPrivateKey(format!(
            "key is for {:?}, wallet is on {network}",
            key.network
        )));
    }
    Ok(key)
}
