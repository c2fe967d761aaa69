use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::psbt::{self, Psbt};
use bitcoin::script::{Builder, PushBytesBuf, ScriptBuf};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, CompressedPublicKey, NetworkKind, OutPoint, PrivateKey, PublicKey, Sequence, Transaction, TxIn,
    TxOut, Txid, Witness,
};
use tracing::{debug, info, warn};

use crate::address::script_pubkey_for;
use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::utxo::{Output, ScriptPurpose, UnspentOutput};

/// A signed, finalized Bitcoin transaction ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedBtcTx {
    pub tx: Transaction,
    /// Consensus-serialized transaction bytes.
    pub raw_tx: Vec<u8>,
    /// Transaction ID in display order.
    pub txid: String,
    /// Inputs minus outputs, in satoshis.
    pub fee_sat: u64,
}

impl SignedBtcTx {
    /// Hex encoding of the wire format, as sent to the indexer.
    pub fn hex(&self) -> String {
        hex::encode(&self.raw_tx)
    }
}

/// One input awaiting signature, in the position it occupies in the
/// transaction.
struct PendingInput<'a> {
    utxo: &'a UnspentOutput,
    key: &'a PrivateKey,
    public_key: PublicKey,
    /// Locking script of the output being spent.
    spent_script: ScriptBuf,
    psbt_input: psbt::Input,
}

/// Build, sign, validate and finalize a transaction spending `utxos`.
///
/// Every UTXO must carry a bound signing key; legacy UTXOs must also carry
/// the raw previous transaction. Inputs appear in the order of `utxos` and
/// are signed in that order. A change output of zero is left out.
pub fn build_transaction(
    outputs: &[Output],
    change: Option<&Output>,
    utxos: &[UnspentOutput],
    network: BtcNetwork,
) -> Result<SignedBtcTx, BtcError> {
    if utxos.is_empty() {
        return Err(BtcError::TransactionBuildError("no UTXOs to spend".into()));
    }

    let secp = Secp256k1::new();

    let pending = utxos
        .iter()
        .map(|utxo| prepare_input(utxo, network, &secp))
        .collect::<Result<Vec<_>, _>>()?;

    let mut tx_outputs = Vec::with_capacity(outputs.len() + 1);
    for output in outputs {
        tx_outputs.push(to_tx_out(output, network)?);
    }
    match change {
        Some(change) if !change.is_zero() => tx_outputs.push(to_tx_out(change, network)?),
        Some(change) => {
            warn!(destination = %change.destination, "zero change output omitted");
        }
        None => {}
    }
    if tx_outputs.is_empty() {
        return Err(BtcError::TransactionBuildError("no outputs to pay".into()));
    }

    let mut inputs = Vec::with_capacity(pending.len());
    for input in &pending {
        let txid = Txid::from_str(&input.utxo.txid)
            .map_err(|e| BtcError::TransactionBuildError(format!("invalid txid {}: {e}", input.utxo.txid)))?;
        inputs.push(TxIn {
            previous_output: OutPoint::new(txid, input.utxo.vout),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        });
    }

    let unsigned = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: tx_outputs,
    };

    let mut psbt = Psbt::from_unsigned_tx(unsigned)
        .map_err(|e| BtcError::TransactionBuildError(format!("psbt creation failed: {e}")))?;
    for (slot, input) in psbt.inputs.iter_mut().zip(&pending) {
        *slot = input.psbt_input.clone();
    }

    sign_inputs(&mut psbt, &pending, &secp)?;
    finalize_inputs(&mut psbt, &pending)?;

    let fee_sat = psbt
        .fee()
        .map_err(|e| BtcError::TransactionBuildError(format!("fee computation failed: {e}")))?
        .to_sat();
    let tx = psbt
        .extract_tx()
        .map_err(|e| BtcError::TransactionBuildError(format!("extraction failed: {e}")))?;
    let raw_tx = bitcoin::consensus::serialize(&tx);
    let txid = tx.compute_txid().to_string();

    info!(%txid, inputs = tx.input.len(), outputs = tx.output.len(), fee_sat, "transaction built");

    Ok(SignedBtcTx {
        tx,
        raw_tx,
        txid,
        fee_sat,
    })
}

/// Resolve a UTXO into PSBT input data according to its script purpose.
fn prepare_input<'a>(
    utxo: &'a UnspentOutput,
    network: BtcNetwork,
    secp: &Secp256k1<All>,
) -> Result<PendingInput<'a>, BtcError> {
    let key = utxo.signing_key.as_ref().ok_or_else(|| BtcError::MissingSigningKey {
        txid: utxo.txid.clone(),
        vout: utxo.vout,
    })?;
    if key.network != NetworkKind::from(network.to_bitcoin_network()) {
        return Err(BtcError::InvalidPrivateKey(format!(
            "key for {} is not a {network} key",
            utxo.outpoint_label()
        )));
    }
    let public_key = key.public_key(secp);
    let value = Amount::from_sat(utxo.value_sat);
    let previous_tx = utxo.raw_tx.as_deref().map(|raw| decode_previous_tx(utxo, raw)).transpose()?;

    let mut psbt_input = psbt::Input::default();
    let spent_script = match utxo.purpose() {
        ScriptPurpose::NativeSegwit => {
            let script = match &previous_tx {
                Some(prev) => spent_output(utxo, prev)?.script_pubkey.clone(),
                None => ScriptBuf::new_p2wpkh(&compressed(utxo, public_key)?.wpubkey_hash()),
            };
            psbt_input.witness_utxo = Some(TxOut {
                value,
                script_pubkey: script.clone(),
            });
            script
        }
        ScriptPurpose::WrappedSegwit => {
            let redeem_script = ScriptBuf::new_p2wpkh(&compressed(utxo, public_key)?.wpubkey_hash());
            let script = match &previous_tx {
                Some(prev) => spent_output(utxo, prev)?.script_pubkey.clone(),
                None => ScriptBuf::new_p2sh(&redeem_script.script_hash()),
            };
            psbt_input.witness_utxo = Some(TxOut {
                value,
                script_pubkey: script.clone(),
            });
            psbt_input.redeem_script = Some(redeem_script);
            script
        }
        ScriptPurpose::Legacy => {
            let prev = previous_tx.ok_or_else(|| BtcError::MissingRawTransaction {
                txid: utxo.txid.clone(),
                vout: utxo.vout,
            })?;
            let script = spent_output(utxo, &prev)?.script_pubkey.clone();
            psbt_input.non_witness_utxo = Some(prev);
            script
        }
    };

    debug!(
        utxo = %utxo.outpoint_label(),
        purpose = %utxo.purpose(),
        value_sat = utxo.value_sat,
        "input prepared"
    );

    Ok(PendingInput {
        utxo,
        key,
        public_key,
        spent_script,
        psbt_input,
    })
}

fn decode_previous_tx(utxo: &UnspentOutput, raw: &str) -> Result<Transaction, BtcError> {
    let bytes = hex::decode(raw).map_err(|e| {
        BtcError::TransactionBuildError(format!("raw transaction for {} is not hex: {e}", utxo.outpoint_label()))
    })?;
    let tx: Transaction = bitcoin::consensus::deserialize(&bytes).map_err(|e| {
        BtcError::TransactionBuildError(format!("raw transaction for {} does not decode: {e}", utxo.outpoint_label()))
    })?;
    let actual = tx.compute_txid().to_string();
    if !actual.eq_ignore_ascii_case(&utxo.txid) {
        return Err(BtcError::RawTransactionMismatch {
            expected: utxo.txid.clone(),
            actual,
            vout: utxo.vout,
        });
    }
    Ok(tx)
}

fn spent_output<'t>(utxo: &UnspentOutput, prev: &'t Transaction) -> Result<&'t TxOut, BtcError> {
    prev.output.get(utxo.vout as usize).ok_or_else(|| {
        BtcError::TransactionBuildError(format!(
            "previous transaction {} has no output {}",
            utxo.txid, utxo.vout
        ))
    })
}

fn compressed(utxo: &UnspentOutput, public_key: PublicKey) -> Result<CompressedPublicKey, BtcError> {
    CompressedPublicKey::try_from(public_key).map_err(|e| {
        BtcError::InvalidPublicKey(format!("{} requires a compressed key: {e}", utxo.outpoint_label()))
    })
}

fn to_tx_out(output: &Output, network: BtcNetwork) -> Result<TxOut, BtcError> {
    Ok(TxOut {
        value: Amount::from_sat(output.amount_sat()?),
        script_pubkey: script_pubkey_for(&output.destination, network)?,
    })
}

/// Locking script the bound key is able to satisfy for `purpose`.
fn expected_script(pending: &PendingInput<'_>) -> Result<ScriptBuf, BtcError> {
    Ok(match pending.utxo.purpose() {
        ScriptPurpose::Legacy => ScriptBuf::new_p2pkh(&pending.public_key.pubkey_hash()),
        ScriptPurpose::WrappedSegwit => {
            let redeem = ScriptBuf::new_p2wpkh(&compressed(pending.utxo, pending.public_key)?.wpubkey_hash());
            ScriptBuf::new_p2sh(&redeem.script_hash())
        }
        ScriptPurpose::NativeSegwit => {
            ScriptBuf::new_p2wpkh(&compressed(pending.utxo, pending.public_key)?.wpubkey_hash())
        }
    })
}

/// Sign every input in order, validating each signature before moving on.
fn sign_inputs(psbt: &mut Psbt, pending: &[PendingInput<'_>], secp: &Secp256k1<All>) -> Result<(), BtcError> {
    let unsigned = psbt.unsigned_tx.clone();
    let mut cache = SighashCache::new(&unsigned);

    for (input_index, input) in pending.iter().enumerate() {
        let (msg, sighash_type) = psbt
            .sighash_ecdsa(input_index, &mut cache)
            .map_err(|e| BtcError::SigningError(format!("sighash for input {input_index} failed: {e}")))?;

        let signature = secp.sign_ecdsa(&msg, &input.key.inner);

        if expected_script(input)? != input.spent_script {
            return Err(BtcError::SignatureValidation {
                input_index,
                reason: format!(
                    "signing key does not control locking script {}",
                    input.spent_script.to_hex_string()
                ),
            });
        }
        secp.verify_ecdsa(&msg, &signature, &input.public_key.inner)
            .map_err(|e| BtcError::SignatureValidation {
                input_index,
                reason: e.to_string(),
            })?;

        psbt.inputs[input_index].partial_sigs.insert(
            input.public_key,
            bitcoin::ecdsa::Signature {
                signature,
                sighash_type,
            },
        );
        debug!(input_index, utxo = %input.utxo.outpoint_label(), "input signed and validated");
    }
    Ok(())
}

/// Produce the final scriptSig / witness for every signed input.
fn finalize_inputs(psbt: &mut Psbt, pending: &[PendingInput<'_>]) -> Result<(), BtcError> {
    for (input_index, input) in pending.iter().enumerate() {
        let psbt_input = &mut psbt.inputs[input_index];
        let signature = *psbt_input.partial_sigs.get(&input.public_key).ok_or_else(|| {
            BtcError::SigningError(format!("input {input_index} has no signature to finalize"))
        })?;
        let sig_push = PushBytesBuf::try_from(signature.to_vec())
            .map_err(|e| BtcError::SigningError(format!("signature push for input {input_index}: {e}")))?;

        match input.utxo.purpose() {
            ScriptPurpose::Legacy => {
                psbt_input.final_script_sig = Some(
                    Builder::new()
                        .push_slice(sig_push)
                        .push_key(&input.public_key)
                        .into_script(),
                );
            }
            ScriptPurpose::WrappedSegwit => {
                let redeem = psbt_input.redeem_script.as_ref().ok_or_else(|| {
                    BtcError::SigningError(format!("input {input_index} lost its redeem script"))
                })?;
                let redeem_push = PushBytesBuf::try_from(redeem.to_bytes())
                    .map_err(|e| BtcError::SigningError(format!("redeem script push for input {input_index}: {e}")))?;
                psbt_input.final_script_sig = Some(Builder::new().push_slice(redeem_push).into_script());
                psbt_input.final_script_witness = Some(p2wpkh_witness(&signature, &input.public_key));
            }
            ScriptPurpose::NativeSegwit => {
                psbt_input.final_script_witness = Some(p2wpkh_witness(&signature, &input.public_key));
            }
        }

        psbt_input.partial_sigs.clear();
        psbt_input.sighash_type = None;
        psbt_input.redeem_script = None;
        psbt_input.witness_script = None;
        psbt_input.bip32_derivation.clear();
    }
    Ok(())
}

/// Build witness: [signature, pubkey].
fn p2wpkh_witness(signature: &bitcoin::ecdsa::Signature, public_key: &PublicKey) -> Witness {
    let mut witness = Witness::new();
    witness.push(signature.to_vec());
    witness.push(public_key.to_bytes());
    witness
}
