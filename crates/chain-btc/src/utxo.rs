use bitcoin::PrivateKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount;
use crate::error::BtcError;

/// Input-locking strategy a UTXO requires, named after the BIP that defines
/// the derivation path of its owning address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ScriptPurpose {
    /// BIP-44, P2PKH.
    Legacy,
    /// BIP-49, P2SH-P2WPKH.
    WrappedSegwit,
    /// BIP-84, P2WPKH.
    NativeSegwit,
}

impl ScriptPurpose {
    pub fn tag(self) -> u32 {
        match self {
            ScriptPurpose::Legacy => 44,
            ScriptPurpose::WrappedSegwit => 49,
            ScriptPurpose::NativeSegwit => 84,
        }
    }

    /// Read the purpose from the first component of a path such as
    /// `m/84'/0'/0'/0/3`.
    pub fn from_derivation_path(path: &str) -> Result<Self, BtcError> {
        let component = path
            .strip_prefix("m/")
            .and_then(|rest| rest.split('/').next())
            .ok_or_else(|| BtcError::TransactionBuildError(format!("malformed derivation path: {path}")))?;
        let digits = component.trim_end_matches(['\'', 'h']);
        let tag: u32 = digits
            .parse()
            .map_err(|e| BtcError::TransactionBuildError(format!("malformed derivation path {path}: {e}")))?;
        Self::try_from(tag)
    }
}

impl TryFrom<u32> for ScriptPurpose {
    type Error = BtcError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            44 => Ok(ScriptPurpose::Legacy),
            49 => Ok(ScriptPurpose::WrappedSegwit),
            84 => Ok(ScriptPurpose::NativeSegwit),
            other => Err(BtcError::IncompatiblePurpose(other)),
        }
    }
}

impl From<ScriptPurpose> for u32 {
    fn from(purpose: ScriptPurpose) -> Self {
        purpose.tag()
    }
}

impl std::fmt::Display for ScriptPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptPurpose::Legacy => write!(f, "legacy"),
            ScriptPurpose::WrappedSegwit => write!(f, "wrapped-segwit"),
            ScriptPurpose::NativeSegwit => write!(f, "native-segwit"),
        }
    }
}

/// A wallet address together with the derivation metadata that produced it.
///
/// Deserialization reads the purpose from `path`; an explicit `purpose`
/// field must agree with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DerivedRecord")]
pub struct Derived {
    pub address: String,
    pub purpose: ScriptPurpose,
    /// Full BIP-32 path, e.g. `m/84'/0'/0'/0/3`.
    pub path: String,
}

impl Derived {
    /// Build derivation metadata, taking the purpose from the path.
    pub fn new(address: impl Into<String>, path: impl Into<String>) -> Result<Self, BtcError> {
        let path = path.into();
        let purpose = ScriptPurpose::from_derivation_path(&path)?;
        Ok(Self {
            address: address.into(),
            purpose,
            path,
        })
    }
}

#[derive(Deserialize)]
struct DerivedRecord {
    address: String,
    #[serde(default)]
    purpose: Option<ScriptPurpose>,
    path: String,
}

impl TryFrom<DerivedRecord> for Derived {
    type Error = BtcError;

    fn try_from(record: DerivedRecord) -> Result<Self, Self::Error> {
        let derived = Derived::new(record.address, record.path)?;
        match record.purpose {
            Some(purpose) if purpose != derived.purpose => Err(BtcError::TransactionBuildError(format!(
                "purpose {} contradicts derivation path {}",
                purpose.tag(),
                derived.path
            ))),
            _ => Ok(derived),
        }
    }
}

/// A spendable output discovered through the indexer.
#[derive(Debug, Clone)]
pub struct UnspentOutput {
    /// Transaction ID as a hex string (big-endian / display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub value_sat: u64,
    /// Confirmation height, 0 (or negative) while in the mempool.
    pub height: i64,
    pub confirmations: u64,
    pub derived: Derived,
    /// Key bound by the signing step.
    pub signing_key: Option<PrivateKey>,
    /// Hex of the full previous transaction, attached by the raw fetch.
    pub raw_tx: Option<String>,
}

impl UnspentOutput {
    pub fn new(txid: impl Into<String>, vout: u32, value_sat: u64, height: i64, derived: Derived) -> Self {
        Self {
            txid: txid.into(),
            vout,
            value_sat,
            height,
            confirmations: 0,
            derived,
            signing_key: None,
            raw_tx: None,
        }
    }

    pub fn purpose(&self) -> ScriptPurpose {
        self.derived.purpose
    }

    pub fn outpoint_label(&self) -> String {
        format!("{}:{}", self.txid, self.vout)
    }

    pub fn with_signing_key(mut self, key: PrivateKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn with_raw_tx(mut self, raw_tx: impl Into<String>) -> Self {
        self.raw_tx = Some(raw_tx.into());
        self
    }
}

/// Confirmation count of an output mined at `height` with the chain tip at
/// `tip`. Unmined outputs and outputs above the tip have none.
pub fn confirmations_at(tip: i64, height: i64) -> u64 {
    if height > 0 {
        u64::try_from(tip - height + 1).unwrap_or(0)
    } else {
        0
    }
}

/// A requested payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub destination: String,
    /// Amount in BTC.
    pub amount: Decimal,
}

impl Output {
    pub fn new(destination: impl Into<String>, amount: Decimal) -> Self {
        Self {
            destination: destination.into(),
            amount,
        }
    }

    pub fn amount_sat(&self) -> Result<u64, BtcError> {
        amount::btc_to_sat(self.amount)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}
