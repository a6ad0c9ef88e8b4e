//! crosslock-coordinator
//!
//! The per-proposal swap coordinator. Given an accepted proposal it owns the
//! secret lifecycle, binds one preimage to both chains' hash commitments,
//! drives the lock → claim sequence with asymmetric timelocks, and falls
//! into the refund branch on its own once a deadline passes. It talks to the
//! engine only by sending settlement advances onto the engine input queue.

pub mod coordinator;
pub mod secret;
pub mod swap;

pub use coordinator::{Coordinator, CoordinatorConfig, SwapStatus};
pub use secret::{bind_secret, generate_secret, verify_binding};
pub use swap::{validate_timelocks, Deadline, SwapRole, UtxoArtifact};
