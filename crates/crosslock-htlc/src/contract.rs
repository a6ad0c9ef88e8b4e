use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crosslock_crypto::hash::sha256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("htlc record already exists for this hash")]
    DuplicateHash,
    #[error("timeout is in the past")]
    PastTimeout,
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("preimage does not hash to the record key")]
    BadPreimage,
    #[error("record already claimed or refunded")]
    AlreadyFinalized,
    #[error("refund caller is not the sender")]
    NotSender,
    #[error("timelock not yet reached")]
    TimelockNotReached,
    #[error("unknown hash")]
    UnknownHash,
    #[error("contract rpc error: {0}")]
    Rpc(String),
}

/// Projection of one HTLC record as the contract stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtlcRecord {
    /// SHA-256 commitment keying the record, hex.
    pub hash: String,
    pub sender: String,
    pub recipient: String,
    pub amount: u128,
    /// Absolute unix-seconds timeout.
    pub timeout: i64,
    pub claimed: bool,
    pub refunded: bool,
    /// Revealed preimage after a successful claim, hex.
    pub preimage: Option<String>,
}

impl HtlcRecord {
    pub fn finalized(&self) -> bool {
        self.claimed || self.refunded
    }
}

/// The contract-chain HTLC surface: the four methods the deployed contract
/// exports, keyed by the SHA-256 hash of the shared preimage.
#[async_trait]
pub trait ContractHtlc: Send + Sync {
    /// Debit `sender` and create a record. Fails on duplicate hash, past
    /// timeout or zero amount.
    async fn lock(
        &self,
        hash: [u8; 32],
        sender: &str,
        recipient: &str,
        timeout: i64,
        amount: u128,
    ) -> Result<(), ContractError>;

    /// Reveal the preimage and pay the recipient.
    async fn claim(&self, hash: [u8; 32], preimage: &[u8]) -> Result<(), ContractError>;

    /// Return funds to the sender after the timeout.
    async fn refund(&self, hash: [u8; 32], caller: &str) -> Result<(), ContractError>;

    /// Read-only state projection.
    async fn get(&self, hash: [u8; 32]) -> Result<Option<HtlcRecord>, ContractError>;
}

// ── In-memory reference implementation ───────────────────────────────────────

/// Reference HTLC enforcing the contract semantics in-process. Used for
/// devnet runs without a deployed contract, and by the test suites. The
/// clock is injectable so timeout branches are testable without sleeping.
pub struct MemoryContractHtlc {
    records: Mutex<HashMap<[u8; 32], HtlcRecord>>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl MemoryContractHtlc {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
        }
    }

    pub fn with_clock(clock: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        Self { records: Mutex::new(HashMap::new()), clock }
    }
}

impl Default for MemoryContractHtlc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContractHtlc for MemoryContractHtlc {
    async fn lock(
        &self,
        hash: [u8; 32],
        sender: &str,
        recipient: &str,
        timeout: i64,
        amount: u128,
    ) -> Result<(), ContractError> {
        if amount == 0 {
            return Err(ContractError::ZeroAmount);
        }
        if timeout <= (self.clock)() {
            return Err(ContractError::PastTimeout);
        }
        let mut records = self.records.lock().await;
        if records.contains_key(&hash) {
            return Err(ContractError::DuplicateHash);
        }
        records.insert(
            hash,
            HtlcRecord {
                hash: hex::encode(hash),
                sender: sender.to_string(),
                recipient: recipient.to_string(),
                amount,
                timeout,
                claimed: false,
                refunded: false,
                preimage: None,
            },
        );
        Ok(())
    }

    async fn claim(&self, hash: [u8; 32], preimage: &[u8]) -> Result<(), ContractError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&hash).ok_or(ContractError::UnknownHash)?;
        if record.finalized() {
            return Err(ContractError::AlreadyFinalized);
        }
        // The contract's native hash of the preimage must equal the key.
        if sha256(preimage) != hash {
            return Err(ContractError::BadPreimage);
        }
        record.claimed = true;
        record.preimage = Some(hex::encode(preimage));
        Ok(())
    }

    async fn refund(&self, hash: [u8; 32], caller: &str) -> Result<(), ContractError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&hash).ok_or(ContractError::UnknownHash)?;
        if record.sender != caller {
            return Err(ContractError::NotSender);
        }
        if record.finalized() {
            return Err(ContractError::AlreadyFinalized);
        }
        if (self.clock)() < record.timeout {
            return Err(ContractError::TimelockNotReached);
        }
        record.refunded = true;
        Ok(())
    }

    async fn get(&self, hash: [u8; 32]) -> Result<Option<HtlcRecord>, ContractError> {
        Ok(self.records.lock().await.get(&hash).cloned())
    }
}

// ── JSON-RPC adapter ─────────────────────────────────────────────────────────

/// Adapter for a deployed HTLC contract fronted by a JSON-RPC gateway
/// exposing `htlc_lock` / `htlc_claim` / `htlc_refund` / `htlc_get`.
pub struct RpcContractHtlc {
    url: String,
    client: reqwest::Client,
}

impl RpcContractHtlc {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string(), client: reqwest::Client::new() }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ContractError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ContractError::Rpc(e.to_string()))?;
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ContractError::Rpc(e.to_string()))?;
        if let Some(err) = json.get("error") {
            if !err.is_null() {
                return Err(map_contract_error(err));
            }
        }
        Ok(json.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

/// Translate the gateway's error codes back into the adapter taxonomy.
fn map_contract_error(err: &serde_json::Value) -> ContractError {
    match err.get("message").and_then(|m| m.as_str()) {
        Some("duplicate_hash") => ContractError::DuplicateHash,
        Some("past_timeout") => ContractError::PastTimeout,
        Some("zero_amount") => ContractError::ZeroAmount,
        Some("bad_preimage") => ContractError::BadPreimage,
        Some("already_finalized") => ContractError::AlreadyFinalized,
        Some("not_sender") => ContractError::NotSender,
        Some("timelock_not_reached") => ContractError::TimelockNotReached,
        _ => ContractError::Rpc(err.to_string()),
    }
}

#[async_trait]
impl ContractHtlc for RpcContractHtlc {
    async fn lock(
        &self,
        hash: [u8; 32],
        sender: &str,
        recipient: &str,
        timeout: i64,
        amount: u128,
    ) -> Result<(), ContractError> {
        self.call(
            "htlc_lock",
            json!([hex::encode(hash), sender, recipient, timeout, amount.to_string()]),
        )
        .await
        .map(|_| ())
    }

    async fn claim(&self, hash: [u8; 32], preimage: &[u8]) -> Result<(), ContractError> {
        self.call("htlc_claim", json!([hex::encode(hash), hex::encode(preimage)]))
            .await
            .map(|_| ())
    }

    async fn refund(&self, hash: [u8; 32], caller: &str) -> Result<(), ContractError> {
        self.call("htlc_refund", json!([hex::encode(hash), caller]))
            .await
            .map(|_| ())
    }

    async fn get(&self, hash: [u8; 32]) -> Result<Option<HtlcRecord>, ContractError> {
        let result = self.call("htlc_get", json!([hex::encode(hash)])).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| ContractError::Rpc(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn fixed_clock(start: i64) -> (Arc<AtomicI64>, Arc<dyn Fn() -> i64 + Send + Sync>) {
        let time = Arc::new(AtomicI64::new(start));
        let t = Arc::clone(&time);
        (time, Arc::new(move || t.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn lock_claim_credits_recipient_exactly() {
        let (_, clock) = fixed_clock(1_000);
        let htlc = MemoryContractHtlc::with_clock(clock);
        let secret = b"atomic_swap_secret_42";
        let hash = sha256(secret);

        htlc.lock(hash, "maker", "taker", 2_000, 1_100_000_000_000).await.unwrap();
        htlc.claim(hash, secret).await.unwrap();

        let record = htlc.get(hash).await.unwrap().unwrap();
        assert!(record.claimed);
        assert_eq!(record.amount, 1_100_000_000_000);
        assert_eq!(record.preimage, Some(hex::encode(secret)));
    }

    #[tokio::test]
    async fn duplicate_lock_rejected() {
        let (_, clock) = fixed_clock(1_000);
        let htlc = MemoryContractHtlc::with_clock(clock);
        let hash = sha256(b"s");
        htlc.lock(hash, "a", "b", 2_000, 1).await.unwrap();
        assert_eq!(
            htlc.lock(hash, "a", "b", 2_000, 1).await,
            Err(ContractError::DuplicateHash)
        );
    }

    #[tokio::test]
    async fn past_timeout_and_zero_amount_rejected() {
        let (_, clock) = fixed_clock(1_000);
        let htlc = MemoryContractHtlc::with_clock(clock);
        assert_eq!(
            htlc.lock(sha256(b"x"), "a", "b", 999, 1).await,
            Err(ContractError::PastTimeout)
        );
        assert_eq!(
            htlc.lock(sha256(b"y"), "a", "b", 2_000, 0).await,
            Err(ContractError::ZeroAmount)
        );
    }

    #[tokio::test]
    async fn bad_preimage_rejected() {
        let (_, clock) = fixed_clock(1_000);
        let htlc = MemoryContractHtlc::with_clock(clock);
        let hash = sha256(b"right");
        htlc.lock(hash, "a", "b", 2_000, 1).await.unwrap();
        assert_eq!(
            htlc.claim(hash, b"wrong").await,
            Err(ContractError::BadPreimage)
        );
    }

    #[tokio::test]
    async fn refund_gated_on_sender_and_timeout() {
        let (time, clock) = fixed_clock(1_000);
        let htlc = MemoryContractHtlc::with_clock(clock);
        let hash = sha256(b"s");
        htlc.lock(hash, "maker", "taker", 2_000, 5).await.unwrap();

        assert_eq!(
            htlc.refund(hash, "taker").await,
            Err(ContractError::NotSender)
        );
        assert_eq!(
            htlc.refund(hash, "maker").await,
            Err(ContractError::TimelockNotReached)
        );

        time.store(2_000, Ordering::SeqCst);
        htlc.refund(hash, "maker").await.unwrap();
        assert!(htlc.get(hash).await.unwrap().unwrap().refunded);
    }

    #[tokio::test]
    async fn claim_after_refund_rejected() {
        let (time, clock) = fixed_clock(1_000);
        let htlc = MemoryContractHtlc::with_clock(clock);
        let secret = b"s";
        let hash = sha256(secret);
        htlc.lock(hash, "maker", "taker", 2_000, 5).await.unwrap();
        time.store(3_000, Ordering::SeqCst);
        htlc.refund(hash, "maker").await.unwrap();
        assert_eq!(
            htlc.claim(hash, secret).await,
            Err(ContractError::AlreadyFinalized)
        );
    }
}
