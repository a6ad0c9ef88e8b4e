//! crosslock-core
//!
//! Shared domain model for Crosslock nodes: identifiers, orders, proposals,
//! settlement states, wire envelopes and the protocol error taxonomy.
//!
//! Everything here is transport- and chain-agnostic. The negotiation engine,
//! swap coordinator and adapters all speak in these types.

pub mod constants;
pub mod envelope;
pub mod error;
pub mod order;
pub mod types;

pub use envelope::{
    Envelope, OrderRequest, Payload, PlainEnvelope, SealedAcceptance, SealedOrderDetails,
    SealedProposal, SignedEnvelope,
};
pub use error::CrosslockError;
pub use order::{
    AcceptanceNotice, AssetTag, OrderAnnouncement, OrderDetails, OrderType, Proposal,
    ProposalStatus, ProposalTerms, RejectionNotice, SealedBlob, SettlementState,
};
pub use types::{Amount, HashLock, OrderId, PeerTag, Price, ProposalId, Timestamp, Username};
