use serde::{Deserialize, Serialize};

use crosslock_core::constants::UTXO_SECS_PER_BLOCK;
use crosslock_core::types::Timestamp;
use crosslock_core::CrosslockError;

/// Which side of the swap this node plays for a given proposal. The maker
/// locks the UTXO leg and claims the contract leg first, revealing the
/// preimage; the taker does the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapRole {
    Maker,
    Taker,
}

// ── Deadline ─────────────────────────────────────────────────────────────────

/// An absolute settlement deadline in unix seconds. Contract timelocks are
/// already absolute seconds; UTXO block-height locks are translated with the
/// estimated block interval so both sides of the margin invariant compare in
/// one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Deadline(pub Timestamp);

impl Deadline {
    pub fn from_unix(secs: Timestamp) -> Self {
        Self(secs)
    }

    /// Translate a block-height lock into wall-clock seconds.
    pub fn from_utxo_height(height: u64, current_height: u64, now: Timestamp) -> Self {
        let blocks_left = height.saturating_sub(current_height) as i64;
        Self(now + blocks_left * UTXO_SECS_PER_BLOCK)
    }

    pub fn reached(&self, now: Timestamp) -> bool {
        now >= self.0
    }

    pub fn secs(&self) -> Timestamp {
        self.0
    }
}

/// Enforce `t_contract + margin <= t_utxo`: a preimage revealed on the
/// contract chain must leave the taker room to spend it on the UTXO chain
/// before the maker's refund opens.
pub fn validate_timelocks(
    contract: Deadline,
    utxo: Deadline,
    margin_secs: i64,
) -> Result<(), CrosslockError> {
    if contract.0 + margin_secs > utxo.0 {
        return Err(CrosslockError::TimelockMarginViolated { margin: margin_secs });
    }
    Ok(())
}

// ── Artifacts ────────────────────────────────────────────────────────────────

/// The UTXO-chain leg of a swap as tracked by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtxoArtifact {
    /// Redeem script committing to the hash lock, both pubkey hashes and
    /// the timelock, hex.
    pub redeem_script: String,
    /// P2SH address funds are locked to.
    pub p2sh_address: String,
    pub deadline: Deadline,
    pub lock_txid: Option<String>,
    pub claim_txid: Option<String>,
    pub refund_txid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_invariant_enforced() {
        // 12h contract, 24h utxo, 70min margin: fine.
        let t0 = 1_700_000_000;
        assert!(validate_timelocks(
            Deadline::from_unix(t0 + 43_200),
            Deadline::from_unix(t0 + 86_400),
            4_200,
        )
        .is_ok());

        // Equal deadlines violate any positive margin.
        assert!(matches!(
            validate_timelocks(
                Deadline::from_unix(t0 + 86_400),
                Deadline::from_unix(t0 + 86_400),
                4_200,
            ),
            Err(CrosslockError::TimelockMarginViolated { margin: 4_200 })
        ));
    }

    #[test]
    fn exact_margin_boundary_is_accepted() {
        let t0 = 0;
        assert!(validate_timelocks(
            Deadline::from_unix(t0 + 10_000),
            Deadline::from_unix(t0 + 14_200),
            4_200,
        )
        .is_ok());
    }

    #[test]
    fn height_deadlines_normalize_to_seconds() {
        let now = 1_700_000_000;
        // 144 blocks ahead at 600s each = 24h.
        let deadline = Deadline::from_utxo_height(1_144, 1_000, now);
        assert_eq!(deadline.secs(), now + 86_400);
        // A height already passed clamps to now.
        assert_eq!(Deadline::from_utxo_height(900, 1_000, now).secs(), now);
    }

    #[test]
    fn reached_is_inclusive() {
        let d = Deadline::from_unix(100);
        assert!(!d.reached(99));
        assert!(d.reached(100));
        assert!(d.reached(101));
    }
}
