use crosslock_crypto::hash::hash256;
use thiserror::Error;

/// Sighash type appended to every signature and to the sighash preimage.
pub const SIGHASH_ALL: u32 = 0x01;

/// Final sequence; claims use it so locktime is ignored.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Non-final sequence; refunds use it so nLockTime is enforced.
pub const SEQUENCE_LOCKTIME: u32 = 0xffff_fffe;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("invalid txid hex: {0}")]
    BadTxid(String),
    #[error("input index {0} out of range")]
    InputIndex(usize),
}

// ── Model ────────────────────────────────────────────────────────────────────

/// Reference to a previous output. `txid` is kept in internal byte order
/// (i.e. already reversed from the RPC display hex).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    /// Build from the display-order hex an RPC returns.
    pub fn from_rpc(txid_hex: &str, vout: u32) -> Result<Self, TxError> {
        let mut bytes: Vec<u8> =
            hex::decode(txid_hex).map_err(|_| TxError::BadTxid(txid_hex.into()))?;
        if bytes.len() != 32 {
            return Err(TxError::BadTxid(txid_hex.into()));
        }
        bytes.reverse();
        let mut txid = [0u8; 32];
        txid.copy_from_slice(&bytes);
        Ok(Self { txid, vout })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// Legacy (pre-segwit) transaction, version 1, serialized little-endian per
/// the consensus rules so a stock node accepts it unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>, lock_time: u32) -> Self {
        Self { version: 1, inputs, outputs, lock_time }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size_hint());
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(&input.prevout.txid);
            buf.extend_from_slice(&input.prevout.vout.to_le_bytes());
            write_varint(&mut buf, input.script_sig.len() as u64);
            buf.extend_from_slice(&input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut buf, output.script_pubkey.len() as u64);
            buf.extend_from_slice(&output.script_pubkey);
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Display-order txid (reversed HASH256 of the serialization).
    pub fn txid(&self) -> String {
        let mut digest = hash256(&self.serialize());
        digest.reverse();
        hex::encode(digest)
    }

    /// Legacy SIGHASH_ALL digest for `input_index` spending a P2SH output:
    /// every scriptSig is cleared, the signed input's is replaced by the
    /// redeem script, and the 4-byte hash type is appended before HASH256.
    pub fn sighash_all(
        &self,
        input_index: usize,
        redeem_script: &[u8],
    ) -> Result<[u8; 32], TxError> {
        if input_index >= self.inputs.len() {
            return Err(TxError::InputIndex(input_index));
        }
        let mut copy = self.clone();
        for input in &mut copy.inputs {
            input.script_sig.clear();
        }
        copy.inputs[input_index].script_sig = redeem_script.to_vec();

        let mut preimage = copy.serialize();
        preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
        Ok(hash256(&preimage))
    }

    fn size_hint(&self) -> usize {
        10 + self.inputs.iter().map(|i| 41 + i.script_sig.len()).sum::<usize>()
            + self.outputs.iter().map(|o| 9 + o.script_pubkey.len()).sum::<usize>()
    }
}

/// Bitcoin-style CompactSize.
fn write_varint(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}
