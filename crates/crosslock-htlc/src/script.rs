use crosslock_crypto::hash::{hash160, hash256};

/// Script opcodes used by the HTLC redeem script and its spends.
pub mod opcodes {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const OP_IF: u8 = 0x63;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_DROP: u8 = 0x75;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_RIPEMD160: u8 = 0xa6;
    pub const OP_SHA256: u8 = 0xa8;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
}
use opcodes::*;

// ── ScriptBuilder ────────────────────────────────────────────────────────────

/// Incremental script assembler with the standard push-selection rules:
/// direct push below 0x4c, OP_PUSHDATA1 below 0x100, OP_PUSHDATA2 up to
/// 0xffff. Larger pushes do not occur in this protocol.
#[derive(Default)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_opcode(mut self, op: u8) -> Self {
        self.bytes.push(op);
        self
    }

    pub fn push_data(mut self, data: &[u8]) -> Self {
        let len = data.len();
        assert!(len <= 0xffff, "push exceeds OP_PUSHDATA2 range");
        if len < OP_PUSHDATA1 as usize {
            self.bytes.push(len as u8);
        } else if len <= 0xff {
            self.bytes.push(OP_PUSHDATA1);
            self.bytes.push(len as u8);
        } else {
            self.bytes.push(OP_PUSHDATA2);
            self.bytes.extend_from_slice(&(len as u16).to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        self
    }

    /// Minimal CScriptNum push for non-negative integers (locktimes).
    pub fn push_int(mut self, value: i64) -> Self {
        assert!(value >= 0, "script numbers here are non-negative");
        if value == 0 {
            self.bytes.push(OP_0);
            return self;
        }
        if (1..=16).contains(&value) {
            self.bytes.push(OP_1 + (value as u8 - 1));
            return self;
        }
        let mut le = Vec::new();
        let mut v = value as u64;
        while v > 0 {
            le.push((v & 0xff) as u8);
            v >>= 8;
        }
        // A set high bit would read as a negative CScriptNum.
        if le.last().map_or(false, |b| b & 0x80 != 0) {
            le.push(0x00);
        }
        self.push_data(&le)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// ── HTLC redeem script ───────────────────────────────────────────────────────

/// The swap redeem script:
///
/// ```text
/// IF
///     SHA256 RIPEMD160 <h160> EQUALVERIFY
///     DUP HASH160 <taker_pkh> EQUALVERIFY CHECKSIG
/// ELSE
///     <locktime> CHECKLOCKTIMEVERIFY DROP
///     DUP HASH160 <maker_pkh> EQUALVERIFY CHECKSIG
/// ENDIF
/// ```
///
/// The IF branch recomputes HASH160 of the revealed preimage on-stack, so
/// the script commits to `h160` while the preimage itself stays 32 bytes.
pub fn htlc_redeem_script(
    h160: &[u8; 20],
    taker_pkh: &[u8; 20],
    maker_pkh: &[u8; 20],
    locktime: i64,
) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_IF)
        .push_opcode(OP_SHA256)
        .push_opcode(OP_RIPEMD160)
        .push_data(h160)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_data(taker_pkh)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ELSE)
        .push_int(locktime)
        .push_opcode(OP_CHECKLOCKTIMEVERIFY)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_data(maker_pkh)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .into_bytes()
}

/// P2PKH output script: `OP_DUP OP_HASH160 <pkh> OP_EQUALVERIFY OP_CHECKSIG`.
/// Claim and refund transactions pay out through this shape.
pub fn p2pkh_script_pubkey(pkh: &[u8; 20]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_data(pkh)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_bytes()
}

/// P2SH output script: `OP_HASH160 <hash160(redeem)> OP_EQUAL`.
pub fn p2sh_script_pubkey(redeem_script: &[u8]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_HASH160)
        .push_data(&hash160(redeem_script))
        .push_opcode(OP_EQUAL)
        .into_bytes()
}

/// Base58Check P2SH address for a redeem script. The version byte is
/// chain-specific (0xc4 on the common testnets, 0x05 on mainnet-like nets).
pub fn p2sh_address(redeem_script: &[u8], version: u8) -> String {
    let mut payload = Vec::with_capacity(25);
    payload.push(version);
    payload.extend_from_slice(&hash160(redeem_script));
    let checksum = hash256(&payload);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_push_below_0x4c() {
        let s = ScriptBuilder::new().push_data(&[0xaa; 0x4b]).into_bytes();
        assert_eq!(s[0], 0x4b);
        assert_eq!(s.len(), 1 + 0x4b);
    }

    #[test]
    fn pushdata1_selected_for_medium_pushes() {
        let s = ScriptBuilder::new().push_data(&[0xaa; 0x4c]).into_bytes();
        assert_eq!(s[0], OP_PUSHDATA1);
        assert_eq!(s[1], 0x4c);

        let s = ScriptBuilder::new().push_data(&[0xbb; 0xff]).into_bytes();
        assert_eq!(s[0], OP_PUSHDATA1);
        assert_eq!(s[1], 0xff);
    }

    #[test]
    fn pushdata2_selected_for_large_pushes() {
        let s = ScriptBuilder::new().push_data(&[0xcc; 0x100]).into_bytes();
        assert_eq!(s[0], OP_PUSHDATA2);
        assert_eq!(&s[1..3], &[0x00, 0x01]); // 256 little-endian
    }

    #[test]
    fn small_ints_use_op_n() {
        assert_eq!(ScriptBuilder::new().push_int(0).into_bytes(), vec![OP_0]);
        assert_eq!(ScriptBuilder::new().push_int(1).into_bytes(), vec![OP_1]);
        assert_eq!(ScriptBuilder::new().push_int(16).into_bytes(), vec![OP_16]);
    }

    #[test]
    fn locktime_int_is_minimal_little_endian() {
        // 500_000 = 0x07a120 → pushed as 20 a1 07.
        let s = ScriptBuilder::new().push_int(500_000).into_bytes();
        assert_eq!(s, vec![0x03, 0x20, 0xa1, 0x07]);
    }

    #[test]
    fn high_bit_gets_padding_byte() {
        // 0x80 alone would read as negative; expect a 0x00 pad.
        let s = ScriptBuilder::new().push_int(0x80).into_bytes();
        assert_eq!(s, vec![0x02, 0x80, 0x00]);
    }

    #[test]
    fn redeem_script_structure() {
        let script = htlc_redeem_script(&[0x11; 20], &[0x22; 20], &[0x33; 20], 500_000);
        assert_eq!(script[0], OP_IF);
        assert_eq!(*script.last().unwrap(), OP_ENDIF);
        // Both pubkey hashes and the hash lock appear as 20-byte pushes.
        let count_20_pushes = script.windows(1).filter(|w| w[0] == 20).count();
        assert!(count_20_pushes >= 3);
    }

    #[test]
    fn p2sh_script_pubkey_shape() {
        let redeem = htlc_redeem_script(&[0x11; 20], &[0x22; 20], &[0x33; 20], 100);
        let spk = p2sh_script_pubkey(&redeem);
        assert_eq!(spk.len(), 23);
        assert_eq!(spk[0], OP_HASH160);
        assert_eq!(spk[1], 20);
        assert_eq!(spk[22], OP_EQUAL);
    }

    #[test]
    fn p2sh_address_round_trips_base58check() {
        let redeem = htlc_redeem_script(&[0x11; 20], &[0x22; 20], &[0x33; 20], 100);
        let addr = p2sh_address(&redeem, 0xc4);
        let decoded = bs58::decode(&addr).into_vec().unwrap();
        assert_eq!(decoded.len(), 25);
        assert_eq!(decoded[0], 0xc4);
        let checksum = hash256(&decoded[..21]);
        assert_eq!(&decoded[21..], &checksum[..4]);
    }
}
