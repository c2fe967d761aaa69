//! Fee tiers, tier selection and vsize-based fee estimation.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::SATS_PER_BTC;
use crate::error::BtcError;
use crate::utxo::ScriptPurpose;

/// Tiers confirming within this many minutes qualify for selection.
pub const QUALIFYING_MAX_MINUTES: u32 = 60;

/// Estimated virtual size of a P2PKH input (in vbytes).
const P2PKH_INPUT_VBYTES: u64 = 148;

/// Estimated virtual size of a P2SH-P2WPKH input (in vbytes).
const P2SH_P2WPKH_INPUT_VBYTES: u64 = 91;

/// Estimated virtual size of a P2WPKH input (in vbytes).
/// Breakdown: 41 bytes non-witness + ~27 witness bytes / 4 = ~68 vbytes per input.
const P2WPKH_INPUT_VBYTES: u64 = 68;

/// Estimated virtual size of any output (in vbytes).
const OUTPUT_VBYTES: u64 = 31;

/// Fixed transaction overhead (in vbytes): version + locktime + segwit marker/flag + counts.
const TX_OVERHEAD_VBYTES: u64 = 11;

/// A fee rate and the longest expected wait for a transaction paying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTier {
    pub rate_sat_vbyte: u64,
    pub max_minutes: u32,
}

impl FeeTier {
    pub fn new(rate_sat_vbyte: u64, max_minutes: u32) -> Self {
        Self {
            rate_sat_vbyte,
            max_minutes,
        }
    }
}

/// One bucket of the bitcoinfees list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeListEntry {
    pub min_fee: u64,
    pub max_fee: u64,
    #[serde(default)]
    pub min_minutes: u32,
    pub max_minutes: u32,
}

/// Body of the bitcoinfees list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FeeList {
    pub fees: Vec<FeeListEntry>,
}

impl From<&FeeListEntry> for FeeTier {
    /// The upper bound of a bucket is taken as its rate.
    fn from(entry: &FeeListEntry) -> Self {
        FeeTier::new(entry.max_fee, entry.max_minutes)
    }
}

impl FeeList {
    pub fn tiers(&self) -> Vec<FeeTier> {
        self.fees.iter().map(FeeTier::from).collect()
    }
}

/// Pick the first tier that confirms within the hour.
///
/// `target_minutes` is accepted for API compatibility but is not consulted:
/// the qualifying bound is always [`QUALIFYING_MAX_MINUTES`]. Callers relying
/// on a different target get the same answer.
pub fn select_fee(target_minutes: u32, tiers: &[FeeTier]) -> Option<&FeeTier> {
    let _ = target_minutes;
    tiers
        .iter()
        .find(|tier| tier.max_minutes < QUALIFYING_MAX_MINUTES)
}

fn input_vbytes(purpose: ScriptPurpose) -> u64 {
    match purpose {
        ScriptPurpose::Legacy => P2PKH_INPUT_VBYTES,
        ScriptPurpose::WrappedSegwit => P2SH_P2WPKH_INPUT_VBYTES,
        ScriptPurpose::NativeSegwit => P2WPKH_INPUT_VBYTES,
    }
}

/// Estimate the fee for spending inputs of the given purposes into
/// `num_outputs` outputs.
pub fn estimate_fee(input_purposes: &[ScriptPurpose], num_outputs: usize, fee_rate_sat_vbyte: u64) -> u64 {
    let inputs: u64 = input_purposes.iter().copied().map(input_vbytes).sum();
    let vsize = TX_OVERHEAD_VBYTES + inputs + (num_outputs as u64 * OUTPUT_VBYTES);
    vsize * fee_rate_sat_vbyte
}

/// Convert the indexer's minimum relay fee (BTC per kvB) to whole sat/vB,
/// rounding up. Negative or unrepresentable rates are rejected.
pub fn relay_fee_sat_vbyte(min_relay_fee_btc_per_kvb: Decimal) -> Result<u64, BtcError> {
    let invalid = || {
        BtcError::InvalidAmount(format!(
            "relay fee {min_relay_fee_btc_per_kvb} BTC/kvB is out of range"
        ))
    };
    if min_relay_fee_btc_per_kvb.is_sign_negative() && !min_relay_fee_btc_per_kvb.is_zero() {
        return Err(invalid());
    }
    let sat_per_vbyte = min_relay_fee_btc_per_kvb
        .checked_mul(Decimal::from(SATS_PER_BTC))
        .and_then(|sat_per_kvb| sat_per_kvb.checked_div(Decimal::from(1000)))
        .ok_or_else(invalid)?;
    sat_per_vbyte.ceil().to_u64().ok_or_else(invalid)
}
