//! Bitcoin chain support for the send pipeline.
//!
//! Provides exact amount conversion, address and script classification,
//! fee tier selection, the UTXO model, and PSBT-based transaction building
//! and signing for legacy, wrapped SegWit, and native SegWit inputs.

pub mod address;
pub mod amount;
pub mod error;
pub mod fee;
pub mod network;
pub mod transaction;
pub mod utxo;
