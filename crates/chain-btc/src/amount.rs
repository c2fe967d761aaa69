//! Exact conversion between BTC and satoshis.
//!
//! All arithmetic goes through `rust_decimal`; no binary floating point ever
//! touches a value that ends up in a transaction.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::BtcError;
use crate::utxo::UnspentOutput;

/// Satoshis per bitcoin.
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Decimal places of one satoshi expressed in BTC.
const BTC_SCALE: u32 = 8;

/// Maximum number of satoshis that can ever exist.
pub const MAX_MONEY_SAT: u64 = 21_000_000 * SATS_PER_BTC;

/// Convert satoshis to an exact BTC amount.
pub fn sat_to_btc(sat: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(sat), BTC_SCALE)
}

/// Convert an exact BTC amount to satoshis.
///
/// Fails on negative amounts, amounts with sub-satoshi precision and amounts
/// above the money supply.
pub fn btc_to_sat(btc: Decimal) -> Result<u64, BtcError> {
    if btc.is_sign_negative() && !btc.is_zero() {
        return Err(BtcError::InvalidAmount(format!("negative amount: {btc}")));
    }
    let sats = btc
        .checked_mul(Decimal::from(SATS_PER_BTC))
        .ok_or_else(|| BtcError::InvalidAmount(format!("amount overflows: {btc}")))?;
    if !sats.fract().is_zero() {
        return Err(BtcError::InvalidAmount(format!(
            "amount has sub-satoshi precision: {btc}"
        )));
    }
    let sats = sats
        .to_u64()
        .ok_or_else(|| BtcError::InvalidAmount(format!("amount out of range: {btc}")))?;
    if sats > MAX_MONEY_SAT {
        return Err(BtcError::InvalidAmount(format!(
            "amount exceeds money supply: {btc}"
        )));
    }
    Ok(sats)
}

/// Exact BTC balance of a set of outputs.
pub fn sum_values(utxos: &[UnspentOutput]) -> Decimal {
    utxos
        .iter()
        .fold(Decimal::ZERO, |balance, utxo| balance + sat_to_btc(utxo.value_sat))
}
