use chain_btc::error::BtcError;
use thiserror::Error;

/// Errors raised while talking to the Electrum indexer.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("proxy returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("call {id} failed: {message}")]
    Rpc { id: u64, message: String },

    #[error("no response for call {0}")]
    MissingResponse(u64),

    #[error("duplicate response for call {0}")]
    DuplicateResponse(u64),

    #[error("response {id} has no matching call")]
    UnknownResponse { id: u64 },

    #[error("unexpected result for call {id}: {reason}")]
    UnexpectedResult { id: u64, reason: String },

    #[error(transparent)]
    Btc(#[from] BtcError),
}
