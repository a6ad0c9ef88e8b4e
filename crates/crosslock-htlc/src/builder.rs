use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use thiserror::Error;

use crosslock_crypto::hash::hash256;

use crate::script::{opcodes, ScriptBuilder};
use crate::tx::{OutPoint, Transaction, TxError, TxIn, TxOut, SEQUENCE_FINAL, SEQUENCE_LOCKTIME, SIGHASH_ALL};

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("insufficient funds: need {need}, have {have}")]
    InsufficientFunds { need: u64, have: u64 },
    #[error("output below dust limit: {0}")]
    DustOutput(u64),
    #[error("signing failed")]
    Signing,
    #[error("malformed WIF private key")]
    BadWif,
    #[error(transparent)]
    Tx(#[from] TxError),
}

/// A spendable output as reported by `listunspent`, values already in
/// smallest units.
#[derive(Debug, Clone)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

// ── Lock ─────────────────────────────────────────────────────────────────────

/// Build the (unsigned) lock transaction: greedy coin selection over the
/// maker's UTXOs, `amount` to the P2SH HTLC output, change back to the
/// maker, fixed fee. The node wallet signs these ordinary inputs via
/// `signrawtransaction`.
pub fn build_lock_tx(
    utxos: &[Utxo],
    htlc_script_pubkey: Vec<u8>,
    amount: u64,
    fee: u64,
    dust_limit: u64,
    change_script_pubkey: Vec<u8>,
) -> Result<Transaction, BuilderError> {
    if amount < dust_limit {
        return Err(BuilderError::DustOutput(amount));
    }
    let need = amount + fee;
    let mut selected = Vec::new();
    let mut total = 0u64;
    for utxo in utxos {
        selected.push(utxo.clone());
        total += utxo.value;
        if total >= need {
            break;
        }
    }
    if total < need {
        return Err(BuilderError::InsufficientFunds { need, have: total });
    }

    let inputs = selected
        .iter()
        .map(|u| {
            Ok(TxIn {
                prevout: OutPoint::from_rpc(&u.txid, u.vout)?,
                script_sig: Vec::new(),
                sequence: SEQUENCE_FINAL,
            })
        })
        .collect::<Result<Vec<_>, TxError>>()?;

    let mut outputs = vec![TxOut { value: amount, script_pubkey: htlc_script_pubkey }];
    let change = total - need;
    if change > dust_limit {
        outputs.push(TxOut { value: change, script_pubkey: change_script_pubkey });
    }
    // Sub-dust change is silently folded into the fee.

    Ok(Transaction::new(inputs, outputs, 0))
}

// ── Claim / refund ───────────────────────────────────────────────────────────

/// DER signature with the sighash-type byte appended, low-S normalized.
fn sign_input(
    tx: &Transaction,
    input_index: usize,
    redeem_script: &[u8],
    key: &SigningKey,
) -> Result<Vec<u8>, BuilderError> {
    let digest = tx.sighash_all(input_index, redeem_script)?;
    let sig: Signature = key.sign_prehash(&digest).map_err(|_| BuilderError::Signing)?;
    let sig = sig.normalize_s().unwrap_or(sig);
    let mut der = sig.to_der().as_bytes().to_vec();
    der.push(SIGHASH_ALL as u8);
    Ok(der)
}

fn compressed_pubkey(key: &SigningKey) -> Vec<u8> {
    key.verifying_key().to_encoded_point(true).as_bytes().to_vec()
}

/// Build and sign the claim transaction spending the HTLC output through the
/// preimage branch. scriptSig: `<sig> <taker_pub> <S> OP_TRUE <redeem>`.
pub fn build_claim_tx(
    lock_txid: &str,
    lock_vout: u32,
    locked_value: u64,
    fee: u64,
    redeem_script: &[u8],
    secret: &[u8],
    taker_key: &SigningKey,
    dest_script_pubkey: Vec<u8>,
) -> Result<Transaction, BuilderError> {
    let value = locked_value
        .checked_sub(fee)
        .ok_or(BuilderError::InsufficientFunds { need: fee, have: locked_value })?;

    let mut tx = Transaction::new(
        vec![TxIn {
            prevout: OutPoint::from_rpc(lock_txid, lock_vout)?,
            script_sig: Vec::new(),
            sequence: SEQUENCE_FINAL,
        }],
        vec![TxOut { value, script_pubkey: dest_script_pubkey }],
        0,
    );

    let sig = sign_input(&tx, 0, redeem_script, taker_key)?;
    tx.inputs[0].script_sig = ScriptBuilder::new()
        .push_data(&sig)
        .push_data(&compressed_pubkey(taker_key))
        .push_data(secret)
        .push_opcode(opcodes::OP_1)
        .push_data(redeem_script)
        .into_bytes();
    Ok(tx)
}

/// Build and sign the refund transaction through the timeout branch.
/// scriptSig: `<sig> <maker_pub> OP_FALSE <redeem>`; nLockTime carries the
/// timelock and the input sequence is non-final so CLTV is enforced.
pub fn build_refund_tx(
    lock_txid: &str,
    lock_vout: u32,
    locked_value: u64,
    fee: u64,
    redeem_script: &[u8],
    locktime: u32,
    maker_key: &SigningKey,
    dest_script_pubkey: Vec<u8>,
) -> Result<Transaction, BuilderError> {
    let value = locked_value
        .checked_sub(fee)
        .ok_or(BuilderError::InsufficientFunds { need: fee, have: locked_value })?;

    let mut tx = Transaction::new(
        vec![TxIn {
            prevout: OutPoint::from_rpc(lock_txid, lock_vout)?,
            script_sig: Vec::new(),
            sequence: SEQUENCE_LOCKTIME,
        }],
        vec![TxOut { value, script_pubkey: dest_script_pubkey }],
        locktime,
    );

    let sig = sign_input(&tx, 0, redeem_script, maker_key)?;
    tx.inputs[0].script_sig = ScriptBuilder::new()
        .push_data(&sig)
        .push_data(&compressed_pubkey(maker_key))
        .push_opcode(opcodes::OP_0)
        .push_data(redeem_script)
        .into_bytes();
    Ok(tx)
}

// ── WIF ──────────────────────────────────────────────────────────────────────

/// Decode a `dumpprivkey`-style WIF into a secp256k1 signing key.
pub fn decode_wif(wif: &str) -> Result<SigningKey, BuilderError> {
    let raw = bs58::decode(wif).into_vec().map_err(|_| BuilderError::BadWif)?;
    if raw.len() < 37 {
        return Err(BuilderError::BadWif);
    }
    let (payload, checksum) = raw.split_at(raw.len() - 4);
    if hash256(payload)[..4] != *checksum {
        return Err(BuilderError::BadWif);
    }
    // version byte || 32-byte key || optional 0x01 compressed marker
    let key_bytes = match payload.len() {
        33 => &payload[1..33],
        34 if payload[33] == 0x01 => &payload[1..33],
        _ => return Err(BuilderError::BadWif),
    };
    SigningKey::from_slice(key_bytes).map_err(|_| BuilderError::BadWif)
}
