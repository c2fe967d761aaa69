use thiserror::Error;

/// Bitcoin chain operation errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("incompatible script purpose: {0}")]
    IncompatiblePurpose(u32),

    #[error("no signing key bound to utxo {txid}:{vout}")]
    MissingSigningKey { txid: String, vout: u32 },

    #[error("raw transaction required for utxo {txid}:{vout}")]
    MissingRawTransaction { txid: String, vout: u32 },

    #[error("raw transaction {actual} does not match utxo {expected}:{vout}")]
    RawTransactionMismatch {
        expected: String,
        actual: String,
        vout: u32,
    },

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("signature validation failed for input {input_index}: {reason}")]
    SignatureValidation { input_index: usize, reason: String },
}
