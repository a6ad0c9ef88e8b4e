//! crosslock-engine
//!
//! The per-node negotiation engine: a single-writer task owning all orders,
//! proposals, order details and the peer-key cache. Network events,
//! front-end commands, settlement advances and chain events all funnel into
//! one input queue, so observable state transitions are exactly the order
//! events arrive. Nothing here takes a lock on negotiation state.

pub mod engine;
pub mod peer_keys;
pub mod state;

pub use engine::{
    CoordinatorHandle, Engine, EngineCommand, EngineHandle, EngineInput, NullCoordinator,
};
pub use peer_keys::{KeyObservation, PeerKeyCache};
pub use state::NegotiationState;
