use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrosslockError {
    // ── Input / validation ───────────────────────────────────────────────────
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("price must be greater than zero")]
    ZeroPrice,

    #[error("min price {min} exceeds max price {max}")]
    PriceBoundsInverted { min: u64, max: u64 },

    #[error("expiry must be after creation time")]
    ExpiryBeforeCreation,

    #[error("unknown username: {0}")]
    UnknownUsername(String),

    #[error("unknown order: {0}")]
    UnknownOrder(String),

    #[error("unknown proposal: {0}")]
    UnknownProposal(String),

    #[error("order has expired")]
    OrderExpired,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    // ── Authentication ───────────────────────────────────────────────────────
    /// Uniform text for wrong password, unknown user, and missing or expired
    /// sessions, so callers cannot probe which identities exist.
    #[error("authentication failed")]
    AuthFailed,

    #[error("identity already exists: {0}")]
    IdentityExists(String),

    // ── Crypto ───────────────────────────────────────────────────────────────
    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed public key")]
    MalformedKey,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("malformed ciphertext")]
    MalformedCiphertext,

    #[error("hash binding does not match preimage")]
    HashBindingMismatch,

    // ── Proposal state ───────────────────────────────────────────────────────
    #[error("proposal is not pending")]
    ProposalNotPending,

    #[error("proposal is not accepted")]
    ProposalNotAccepted,

    #[error("proposal already rejected")]
    ProposalRejected,

    #[error("invalid settlement transition: {from} -> {to}")]
    InvalidSettlementTransition { from: &'static str, to: &'static str },

    #[error("acceptance hash conflicts with already-bound hash")]
    AcceptanceHashConflict,

    // ── Timelocks ────────────────────────────────────────────────────────────
    #[error("contract timelock too close to utxo timelock: need margin of {margin}s")]
    TimelockMarginViolated { margin: i64 },

    #[error("timelock not yet reached (deadline {deadline})")]
    TimelockNotReached { deadline: i64 },

    // ── Transport ────────────────────────────────────────────────────────────
    #[error("no cached public key for peer {0}")]
    NoPeerKey(String),

    #[error("dial failed after {attempts} attempts: {peer}")]
    DialFailed { peer: String, attempts: u32 },

    #[error("frame exceeds maximum size: {got} bytes")]
    FrameTooLarge { got: usize },

    #[error("network command channel closed")]
    NetworkClosed,

    // ── Chain adapters ───────────────────────────────────────────────────────
    #[error("chain rpc error: {0}")]
    ChainRpc(String),

    #[error("insufficient funds: need {need}, have {have}")]
    InsufficientFunds { need: u64, have: u64 },

    #[error("output below dust limit: {0}")]
    DustOutput(u64),

    #[error("htlc record already exists for this hash")]
    DuplicateHash,

    #[error("htlc timeout is in the past")]
    PastTimeout,

    #[error("preimage does not match hash")]
    BadPreimage,

    #[error("htlc already claimed or refunded")]
    AlreadyFinalized,

    #[error("refund caller is not the htlc sender")]
    NotSender,

    // ── Wallet mapping ───────────────────────────────────────────────────────
    #[error("funding cap reached: {cap} units")]
    FundingCapReached { cap: u64 },

    // ── Bus ──────────────────────────────────────────────────────────────────
    #[error("settlement bus unavailable")]
    BusUnavailable,

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for CrosslockError {
    fn from(e: serde_json::Error) -> Self {
        CrosslockError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for CrosslockError {
    fn from(e: std::io::Error) -> Self {
        CrosslockError::Storage(e.to_string())
    }
}
