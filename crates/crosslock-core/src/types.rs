use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in the asset's smallest unit.
pub type Amount = u64;

/// Price in contract-chain smallest units per one UTXO-chain smallest unit,
/// integer-scaled. Totals are computed in u128 to avoid overflow.
pub type Price = u64;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

// ── Username ─────────────────────────────────────────────────────────────────

/// Registered identity name. Unique per node cluster; never mutated.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Username(pub String);

impl Username {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Username({})", self.0)
    }
}

// ── PeerTag ──────────────────────────────────────────────────────────────────

/// Transport-derived peer identifier (libp2p PeerId rendered as base58).
/// Opaque to the domain layer; immutable for the lifetime of the peer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerTag(pub String);

impl PeerTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl From<String> for PeerTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PeerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerTag({})", self.short())
    }
}

// ── OrderId ──────────────────────────────────────────────────────────────────

/// Order identifier: `ord-<unix_millis>-<4 hex>`. Millis prefix keeps ids
/// roughly monotonic; the random suffix breaks same-millisecond collisions.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: u16 = rand::thread_rng().gen();
        Self(format!("ord-{millis}-{suffix:04x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderId({})", self.0)
    }
}

// ── ProposalId ───────────────────────────────────────────────────────────────

/// Proposal identifier: `<order_id>/p-<8 hex>`. Embedding the order id as a
/// prefix lets per-order listings run as a plain prefix scan.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(pub String);

impl ProposalId {
    pub fn derive(order_id: &OrderId) -> Self {
        let suffix: u32 = rand::thread_rng().gen();
        Self(format!("{}/p-{suffix:08x}", order_id.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The order id embedded in this proposal id, if well-formed.
    pub fn order_prefix(&self) -> Option<OrderId> {
        self.0
            .rsplit_once("/p-")
            .map(|(order, _)| OrderId(order.to_string()))
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProposalId({})", self.0)
    }
}

// ── HashLock ─────────────────────────────────────────────────────────────────

/// Dual hash commitment over one shared preimage S:
/// `h160 = RIPEMD160(SHA256(S))` locks the UTXO-chain script and
/// `h256 = SHA256(S)` keys the contract-chain HTLC record.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashLock {
    #[serde(with = "serde_hex")]
    pub h160: [u8; 20],
    #[serde(with = "serde_hex")]
    pub h256: [u8; 32],
}

impl HashLock {
    pub fn h160_hex(&self) -> String {
        hex::encode(self.h160)
    }

    pub fn h256_hex(&self) -> String {
        hex::encode(self.h256)
    }
}

impl fmt::Debug for HashLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashLock(h160={}…)", &self.h160_hex()[..8])
    }
}

// ── Serde helpers ────────────────────────────────────────────────────────────

/// Fixed-size byte arrays as lowercase hex strings on the wire.
pub mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        de: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(de)?;
        let v = hex::decode(&s).map_err(serde::de::Error::custom)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {N} bytes")))
    }
}

/// Variable-length byte strings as lowercase hex strings on the wire.
pub mod serde_hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_id_embeds_order_prefix() {
        let order = OrderId::generate();
        let proposal = ProposalId::derive(&order);
        assert_eq!(proposal.order_prefix(), Some(order));
    }

    #[test]
    fn order_ids_are_unique() {
        let a = OrderId::generate();
        let b = OrderId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_lock_round_trips_as_hex_json() {
        let hl = HashLock { h160: [0xab; 20], h256: [0xcd; 32] };
        let json = serde_json::to_string(&hl).unwrap();
        assert!(json.contains(&"ab".repeat(20)));
        let back: HashLock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hl);
    }
}
