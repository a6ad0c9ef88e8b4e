//! crosslock-identity
//!
//! Durable identity storage and in-memory authentication for a Crosslock
//! node. Identities are one JSON file per user with the private scalar
//! sealed under a password-derived key; sessions live only in process
//! memory; the wallet-mapping file records per-user settlement addresses
//! and cumulative funding.

pub mod session;
pub mod store;
pub mod wallet;

pub use session::{Session, SessionManager};
pub use store::{IdentityRecord, IdentityStore};
pub use wallet::{WalletEntry, WalletStore};
