use bip32::{ChildNumber, DerivationPath, XPrv};
use bitcoin::PrivateKey;
use chain_btc::network::BtcNetwork;
use tracing::debug;
use zeroize::Zeroize;

use crate::error::WalletError;

/// Depth of the account node: m/purpose'/coin_type'/account'
const ACCOUNT_DEPTH: usize = 3;

/// Serialized extended key: version(4) depth(1) fingerprint(4) child(4)
/// chain_code(32) key(33).
const EXTENDED_KEY_LEN: usize = 78;
const CHAIN_CODE_RANGE: std::ops::Range<usize> = 13..45;
const PUBLIC_KEY_RANGE: std::ops::Range<usize> = 45..78;

/// Chain code and compressed public key of an account-level extended key.
struct AccountNode {
    chain_code: [u8; 32],
    public_key: [u8; 33],
}

/// Decode a base58check extended public key. Any version prefix is accepted
/// (xpub, ypub, zpub, tpub, upub, vpub).
fn decode_account_xpub(xpub: &str) -> Result<AccountNode, WalletError> {
    let bytes = bs58::decode(xpub.trim())
        .with_check(None)
        .into_vec()
        .map_err(|e| WalletError::DerivationFailed(format!("invalid extended public key: {e}")))?;

    if bytes.len() != EXTENDED_KEY_LEN {
        return Err(WalletError::DerivationFailed(format!(
            "extended public key has {} bytes, expected {EXTENDED_KEY_LEN}",
            bytes.len()
        )));
    }

    let mut chain_code = [0u8; 32];
    let mut public_key = [0u8; 33];
    chain_code.copy_from_slice(&bytes[CHAIN_CODE_RANGE]);
    public_key.copy_from_slice(&bytes[PUBLIC_KEY_RANGE]);
    Ok(AccountNode {
        chain_code,
        public_key,
    })
}

/// Derive the signing key at `path` from a BIP-39 seed.
///
/// When `account_xpub` is given, the account node on the way down
/// (`m/purpose'/coin_type'/account'`) must have the same chain code and
/// public key, otherwise the seed belongs to another wallet and
/// [`WalletError::XpubMismatch`] is returned.
pub fn derive_signing_key(
    seed: &[u8],
    account_xpub: Option<&str>,
    path: &str,
    network: BtcNetwork,
) -> Result<PrivateKey, WalletError> {
    let derivation_path: DerivationPath = path
        .parse()
        .map_err(|e: bip32::Error| WalletError::DerivationFailed(format!("{path}: {e}")))?;
    let children: Vec<ChildNumber> = derivation_path.iter().collect();

    let expected = account_xpub.map(decode_account_xpub).transpose()?;
    if expected.is_some() && children.len() < ACCOUNT_DEPTH {
        return Err(WalletError::DerivationFailed(format!(
            "{path} does not reach an account node"
        )));
    }

    let mut xprv = XPrv::new(seed).map_err(|e| WalletError::DerivationFailed(e.to_string()))?;
    for (depth, child) in children.into_iter().enumerate() {
        xprv = xprv
            .derive_child(child)
            .map_err(|e| WalletError::DerivationFailed(format!("{path}: {e}")))?;

        if depth + 1 == ACCOUNT_DEPTH {
            if let Some(node) = &expected {
                let chain_code_matches = xprv.attrs().chain_code == node.chain_code;
                let public_key_matches = xprv.public_key().to_bytes() == node.public_key;
                if !(chain_code_matches && public_key_matches) {
                    return Err(WalletError::XpubMismatch {
                        path: account_path(path),
                    });
                }
            }
        }
    }

    let mut private_key_bytes: [u8; 32] = xprv.to_bytes().into();
    let key = PrivateKey::from_slice(&private_key_bytes, network.to_bitcoin_network())
        .map_err(|e| WalletError::DerivationFailed(e.to_string()));
    private_key_bytes.zeroize();

    debug!(path, checked_xpub = expected.is_some(), "signing key derived");
    key
}

fn account_path(path: &str) -> String {
    path.split('/')
        .take(ACCOUNT_DEPTH + 1)
        .collect::<Vec<_>>()
        .join("/")
}
