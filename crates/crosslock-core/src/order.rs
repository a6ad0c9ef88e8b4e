use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrosslockError;
use crate::types::{serde_hex_vec, Amount, HashLock, OrderId, PeerTag, Price, ProposalId, Timestamp};

// ── OrderType ────────────────────────────────────────────────────────────────

/// Side of the order from the maker's perspective on the UTXO-chain asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Buy,
    Sell,
}

/// Settlement-asset tag on the contract chain (e.g. "SOL", "STRK", "USDC").
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetTag(pub String);

impl AssetTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetTag {
    fn from(s: &str) -> Self {
        Self(s.to_uppercase())
    }
}

impl fmt::Display for AssetTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AssetTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetTag({})", self.0)
    }
}

// ── OrderAnnouncement ────────────────────────────────────────────────────────

/// Publicly gossiped order. Prices and amounts stay private; only the side,
/// asset and maker are visible. `sealed_details` carries ECIES-sealed
/// `OrderDetails` when the order targets a specific taker. `commitment` is
/// reserved for future range proofs over the private terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAnnouncement {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub asset: AssetTag,
    pub maker_peer: PeerTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed_details: Option<SealedBlob>,
    #[serde(with = "serde_hex_vec")]
    pub commitment: Vec<u8>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Opaque ECIES ciphertext, hex on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedBlob(#[serde(with = "serde_hex_vec")] pub Vec<u8>);

impl OrderAnnouncement {
    pub fn new(
        order_id: OrderId,
        order_type: OrderType,
        asset: AssetTag,
        maker_peer: PeerTag,
        created_at: Timestamp,
        expires_at: Timestamp,
    ) -> Result<Self, CrosslockError> {
        if expires_at <= created_at {
            return Err(CrosslockError::ExpiryBeforeCreation);
        }
        Ok(Self {
            order_id,
            order_type,
            asset,
            maker_peer,
            sealed_details: None,
            commitment: Vec::new(),
            created_at,
            expires_at,
        })
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

// ── OrderDetails ─────────────────────────────────────────────────────────────

/// Private counterpart of an announcement, revealed to interested takers over
/// a sealed directed stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub amount: Amount,
    pub min_price: Price,
    pub max_price: Price,
    pub asset: AssetTag,
}

impl OrderDetails {
    pub fn validate(&self) -> Result<(), CrosslockError> {
        if self.amount == 0 {
            return Err(CrosslockError::ZeroAmount);
        }
        if self.min_price == 0 {
            return Err(CrosslockError::ZeroPrice);
        }
        if self.min_price > self.max_price {
            return Err(CrosslockError::PriceBoundsInverted {
                min: self.min_price,
                max: self.max_price,
            });
        }
        Ok(())
    }
}

// ── SettlementState ──────────────────────────────────────────────────────────

/// Position of an accepted proposal in the two-chain HTLC sequence.
///
/// Forward path: Ready → MakerLocked → BothLocked → MakerClaimed → Complete.
/// Refund branches are reachable only through timelock expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    Ready,
    MakerLocked,
    BothLocked,
    MakerClaimed,
    Complete,
    RefundedMaker,
    RefundedTaker,
}

impl SettlementState {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_advance_to(self, next: SettlementState) -> bool {
        use SettlementState::*;
        matches!(
            (self, next),
            (Ready, MakerLocked)
                | (MakerLocked, BothLocked)
                | (BothLocked, MakerClaimed)
                | (MakerClaimed, Complete)
                // Maker refund: own lock expired before the swap completed.
                | (MakerLocked, RefundedMaker)
                | (BothLocked, RefundedMaker)
                // Taker refund: contract lock expired while the maker stalled.
                | (BothLocked, RefundedTaker)
                | (MakerClaimed, RefundedTaker)
        )
    }

    pub fn is_terminal(self) -> bool {
        use SettlementState::*;
        matches!(self, Complete | RefundedMaker | RefundedTaker)
    }

    pub fn as_str(self) -> &'static str {
        use SettlementState::*;
        match self {
            Ready => "ready",
            MakerLocked => "maker_locked",
            BothLocked => "both_locked",
            MakerClaimed => "maker_claimed",
            Complete => "complete",
            RefundedMaker => "refunded_maker",
            RefundedTaker => "refunded_taker",
        }
    }
}

impl fmt::Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SettlementState {
    type Err = CrosslockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use SettlementState::*;
        Ok(match s {
            "ready" => Ready,
            "maker_locked" => MakerLocked,
            "both_locked" => BothLocked,
            "maker_claimed" => MakerClaimed,
            "complete" => Complete,
            "refunded_maker" => RefundedMaker,
            "refunded_taker" => RefundedTaker,
            other => return Err(CrosslockError::Serialization(format!(
                "unknown settlement state: {other}"
            ))),
        })
    }
}

// ── Proposal ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A taker's bid on an order, as tracked by both sides.
///
/// Invariants: `settlement` is set iff `status` is Accepted; `hash_lock` is
/// set once the coordinator binds a secret; Rejected is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: ProposalId,
    pub order_id: OrderId,
    pub proposer_peer: PeerTag,
    pub price: Price,
    pub amount: Amount,
    pub status: ProposalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_lock: Option<HashLock>,
    pub created_at: Timestamp,
}

impl Proposal {
    pub fn new(
        proposal_id: ProposalId,
        order_id: OrderId,
        proposer_peer: PeerTag,
        price: Price,
        amount: Amount,
        created_at: Timestamp,
    ) -> Result<Self, CrosslockError> {
        if amount == 0 {
            return Err(CrosslockError::ZeroAmount);
        }
        if price == 0 {
            return Err(CrosslockError::ZeroPrice);
        }
        Ok(Self {
            proposal_id,
            order_id,
            proposer_peer,
            price,
            amount,
            status: ProposalStatus::Pending,
            settlement: None,
            hash_lock: None,
            created_at,
        })
    }

    /// Transition Pending → Accepted, binding the hash lock and entering the
    /// settlement machine at `ready`.
    pub fn accept(&mut self, hash_lock: HashLock) -> Result<(), CrosslockError> {
        match self.status {
            ProposalStatus::Pending => {
                self.status = ProposalStatus::Accepted;
                self.settlement = Some(SettlementState::Ready);
                self.hash_lock = Some(hash_lock);
                Ok(())
            }
            // Idempotent when the same hash arrives again; conflicting hashes
            // are a protocol error.
            ProposalStatus::Accepted => {
                if self.hash_lock == Some(hash_lock) {
                    Ok(())
                } else {
                    Err(CrosslockError::AcceptanceHashConflict)
                }
            }
            ProposalStatus::Rejected => Err(CrosslockError::ProposalRejected),
        }
    }

    pub fn reject(&mut self) -> Result<(), CrosslockError> {
        match self.status {
            ProposalStatus::Pending => {
                self.status = ProposalStatus::Rejected;
                self.settlement = None;
                Ok(())
            }
            ProposalStatus::Rejected => Ok(()),
            ProposalStatus::Accepted => Err(CrosslockError::ProposalNotPending),
        }
    }

    /// Advance the settlement machine, enforcing legal transitions.
    pub fn advance_settlement(&mut self, next: SettlementState) -> Result<(), CrosslockError> {
        if self.status != ProposalStatus::Accepted {
            return Err(CrosslockError::ProposalNotAccepted);
        }
        let current = self.settlement.unwrap_or(SettlementState::Ready);
        if current == next {
            return Ok(());
        }
        if !current.can_advance_to(next) {
            return Err(CrosslockError::InvalidSettlementTransition {
                from: current.as_str(),
                to: next.as_str(),
            });
        }
        self.settlement = Some(next);
        Ok(())
    }

    /// Contract-chain units owed for this proposal: amount × price.
    pub fn total_contract_units(&self) -> u128 {
        self.amount as u128 * self.price as u128
    }
}

// ── Wire bodies ──────────────────────────────────────────────────────────────

/// Terms sent by a proposer. Carried sealed to the maker whenever the maker's
/// key is cached; otherwise broadcast signed-plain as a logged degradation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalTerms {
    pub proposal_id: ProposalId,
    pub order_id: OrderId,
    pub price: Price,
    pub amount: Amount,
    pub timestamp: Timestamp,
}

/// Acceptance body: the concrete shape of what the maker seals back to the
/// proposer. Status is an enum end to end; the hash binding rides along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceNotice {
    pub proposal_id: ProposalId,
    pub order_id: OrderId,
    pub price: Price,
    pub amount: Amount,
    pub status: ProposalStatus,
    pub timestamp: Timestamp,
    pub hash_lock: HashLock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionNotice {
    pub proposal_id: ProposalId,
    pub order_id: OrderId,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderId, PeerTag, ProposalId};

    fn sample_proposal() -> Proposal {
        let order = OrderId("ord-1-0000".into());
        Proposal::new(
            ProposalId::derive(&order),
            order,
            PeerTag("12D3KooWTestPeer".into()),
            110_000_000,
            10_000,
            1_700_000_000,
        )
        .unwrap()
    }

    fn sample_lock() -> HashLock {
        HashLock { h160: [1; 20], h256: [2; 32] }
    }

    #[test]
    fn zero_amount_rejected() {
        let order = OrderId("ord-1-0000".into());
        let err = Proposal::new(
            ProposalId::derive(&order),
            order,
            PeerTag("p".into()),
            1,
            0,
            0,
        );
        assert!(matches!(err, Err(CrosslockError::ZeroAmount)));
    }

    #[test]
    fn accept_binds_hash_and_enters_ready() {
        let mut p = sample_proposal();
        p.accept(sample_lock()).unwrap();
        assert_eq!(p.status, ProposalStatus::Accepted);
        assert_eq!(p.settlement, Some(SettlementState::Ready));
        assert_eq!(p.hash_lock, Some(sample_lock()));
    }

    #[test]
    fn duplicate_accept_is_idempotent_but_conflict_fails() {
        let mut p = sample_proposal();
        p.accept(sample_lock()).unwrap();
        assert!(p.accept(sample_lock()).is_ok());
        let other = HashLock { h160: [9; 20], h256: [9; 32] };
        assert!(matches!(
            p.accept(other),
            Err(CrosslockError::AcceptanceHashConflict)
        ));
    }

    #[test]
    fn rejected_is_terminal() {
        let mut p = sample_proposal();
        p.reject().unwrap();
        assert!(matches!(
            p.accept(sample_lock()),
            Err(CrosslockError::ProposalRejected)
        ));
    }

    #[test]
    fn settlement_follows_happy_path() {
        let mut p = sample_proposal();
        p.accept(sample_lock()).unwrap();
        for next in [
            SettlementState::MakerLocked,
            SettlementState::BothLocked,
            SettlementState::MakerClaimed,
            SettlementState::Complete,
        ] {
            p.advance_settlement(next).unwrap();
        }
        assert_eq!(p.settlement, Some(SettlementState::Complete));
    }

    #[test]
    fn settlement_rejects_skips() {
        let mut p = sample_proposal();
        p.accept(sample_lock()).unwrap();
        assert!(p.advance_settlement(SettlementState::MakerClaimed).is_err());
    }

    #[test]
    fn refund_branches_only_from_locked_states() {
        assert!(SettlementState::MakerLocked.can_advance_to(SettlementState::RefundedMaker));
        assert!(SettlementState::BothLocked.can_advance_to(SettlementState::RefundedTaker));
        assert!(!SettlementState::Ready.can_advance_to(SettlementState::RefundedMaker));
        assert!(!SettlementState::Complete.can_advance_to(SettlementState::RefundedTaker));
    }

    #[test]
    fn details_bounds() {
        let mut d = OrderDetails {
            order_id: OrderId("ord-1-0000".into()),
            order_type: OrderType::Sell,
            amount: 1,
            min_price: 5,
            max_price: 5,
            asset: AssetTag::from("SOL"),
        };
        assert!(d.validate().is_ok(), "min == max is accepted");
        d.min_price = 6;
        assert!(matches!(
            d.validate(),
            Err(CrosslockError::PriceBoundsInverted { .. })
        ));
    }

    #[test]
    fn total_contract_units_uses_wide_multiply() {
        let mut p = sample_proposal();
        p.amount = u64::MAX;
        p.price = 2;
        assert_eq!(p.total_contract_units(), u64::MAX as u128 * 2);
    }
}
