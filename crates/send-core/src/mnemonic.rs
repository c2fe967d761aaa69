use bip39::{Language, Mnemonic};

use crate::error::WalletError;

/// Validate a mnemonic phrase
pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, phrase).is_ok()
}

/// Derive seed bytes from mnemonic + optional passphrase.
/// Returns 64-byte seed. Caller MUST zeroize the returned seed when done.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<Vec<u8>, WalletError> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

    let seed = mnemonic.to_seed(passphrase);
    Ok(seed.to_vec())
}
