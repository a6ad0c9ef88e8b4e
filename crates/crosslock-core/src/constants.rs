//! ─── Crosslock Protocol Constants ───────────────────────────────────────────
//!
//! Defaults shared across the workspace. Timelocks and the safety margin are
//! the canonical 24h/12h asymmetric pair: the contract-chain lock must expire
//! strictly before the UTXO-chain lock so a preimage revealed on the contract
//! chain can always still be used on the UTXO chain.

// ── Sessions ─────────────────────────────────────────────────────────────────

/// Login session time-to-live in seconds (24 hours).
pub const SESSION_TTL_SECS: i64 = 86_400;

/// Interval between expired-session sweeps.
pub const SESSION_SWEEP_SECS: u64 = 60;

// ── Timelocks ────────────────────────────────────────────────────────────────

/// UTXO-chain HTLC timelock measured from lock time (24 hours).
pub const UTXO_TIMELOCK_SECS: i64 = 86_400;

/// Contract-chain HTLC timelock measured from lock time (12 hours).
pub const CONTRACT_TIMELOCK_SECS: i64 = 43_200;

/// Safety margin Δ: one hour of contract-chain block time plus one
/// UTXO-chain confirmation window. `t_contract + DELTA <= t_utxo` must hold.
pub const TIMELOCK_MARGIN_SECS: i64 = 3_600 + 600;

/// Estimated UTXO-chain seconds per block, used to translate block-height
/// timelocks into absolute deadlines.
pub const UTXO_SECS_PER_BLOCK: i64 = 600;

// ── Orders ───────────────────────────────────────────────────────────────────

/// Default order lifetime from announcement to expiry (1 hour).
pub const ORDER_TTL_SECS: i64 = 3_600;

// ── UTXO-chain fees ──────────────────────────────────────────────────────────

/// Fixed fee in smallest units attached to every built transaction.
pub const UTXO_FIXED_FEE: u64 = 10_000;

/// Outputs below this value are rejected as dust.
pub const UTXO_DUST_LIMIT: u64 = 546;

// ── Networking ───────────────────────────────────────────────────────────────

/// Maximum outbound dial attempts per peer.
pub const DIAL_RETRY_MAX: u32 = 4;

/// Linear backoff step between dial attempts, in seconds.
pub const DIAL_BACKOFF_SECS: u64 = 2;

/// Maximum directed-stream frame size (4-byte length prefix bound).
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Gossip topic carrying order announcements and requests.
pub const GOSSIP_TOPIC: &str = "crosslock-orders/1";

// ── Wallet mapping ───────────────────────────────────────────────────────────

/// Cumulative funding cap per user, in whole asset units.
pub const WALLET_FUNDING_CAP: u64 = 100;

// ── Settlement bus ───────────────────────────────────────────────────────────

/// Constant reconnect backoff for the bus client, in seconds.
pub const BUS_RECONNECT_SECS: u64 = 2;

/// Bounded publish buffer while the bus is unreachable.
pub const BUS_BUFFER_DEPTH: usize = 256;
