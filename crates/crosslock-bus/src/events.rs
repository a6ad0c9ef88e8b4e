use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crosslock_core::order::{AssetTag, SettlementState};
use crosslock_core::types::{Amount, OrderId, PeerTag, Price, ProposalId, Timestamp};

// ── Subjects ─────────────────────────────────────────────────────────────────

pub fn request_subject(proposal_id: &ProposalId) -> String {
    format!("settlement.request.{proposal_id}")
}

pub fn status_subject(proposal_id: &ProposalId) -> String {
    format!("settlement.status.{proposal_id}")
}

pub fn chain_subject(chain: &str, proposal_id: &ProposalId) -> String {
    format!("settlement.chain.{chain}.{proposal_id}")
}

/// Prefix matched by the chain-event subscriber.
pub const CHAIN_SUBJECT_PREFIX: &str = "settlement.chain.";

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Which side of the swap performed the action being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapSide {
    Maker,
    Taker,
}

/// Published on `settlement.request.<proposal_id>` when a proposal is
/// accepted. `timestamp` is unix seconds; `published_at` is the
/// human-facing ISO-8601 copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub proposal_id: ProposalId,
    pub order_id: OrderId,
    pub maker_id: PeerTag,
    pub taker_id: PeerTag,
    pub amount: Amount,
    pub price: Price,
    pub asset: AssetTag,
    pub settlement_chain: String,
    pub timestamp: Timestamp,
    pub published_at: DateTime<Utc>,
}

/// Published on `settlement.status.<proposal_id>` at each state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementUpdate {
    pub proposal_id: ProposalId,
    pub state: SettlementState,
    pub actor: SwapSide,
    pub timestamp: Timestamp,
    pub published_at: DateTime<Utc>,
}

/// What happened on-chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainEventKind {
    /// Funds confirmed in an HTLC. For UTXO-chain locks the watcher also
    /// reports the redeem script and output index so the counterparty can
    /// assemble its claim without further exchange.
    Locked {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        redeem_script_hex: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vout: Option<u32>,
    },
    /// A claim reveals the preimage; the counterparty needs it to claim the
    /// other leg.
    Claimed { preimage_hex: String },
    Refunded,
}

/// Ingested from `settlement.chain.<chain>.<proposal_id>` to advance the
/// coordinator state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub proposal_id: ProposalId,
    pub chain: String,
    #[serde(flatten)]
    pub kind: ChainEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    pub timestamp: Timestamp,
}
