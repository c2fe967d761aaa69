//! Electrum indexer access for the send pipeline.
//!
//! Calls are grouped into one batch per logical operation and submitted
//! through a [`transport::BatchTransport`]. Responses are correlated to their
//! calls strictly by id through [`rpc::ResponseMap`], whatever order the
//! transport delivers them in.

pub mod client;
pub mod error;
pub mod fees;
pub mod rpc;
pub mod transport;

pub use client::{IndexerClient, UnspentSet};
pub use error::IndexerError;
pub use transport::{BatchTransport, ProxyTransport};
