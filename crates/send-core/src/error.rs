use chain_btc::error::BtcError;
use indexer_rpc::IndexerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Extended public key does not match account {path}")]
    XpubMismatch { path: String },

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Indexer: {0}")]
    Indexer(#[from] IndexerError),

    #[error("Transaction build failed: {0}")]
    TransactionFailed(String),
}

impl From<BtcError> for WalletError {
    fn from(e: BtcError) -> Self {
        WalletError::TransactionFailed(format!("BTC: {e}"))
    }
}
