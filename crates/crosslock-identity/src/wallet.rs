use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crosslock_core::constants::WALLET_FUNDING_CAP;
use crosslock_core::types::Username;
use crosslock_core::CrosslockError;

/// Per-user wallet mapping: settlement address per chain plus cumulative
/// funding bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletEntry {
    /// chain tag ("utxo", "sol", "strk", …) → address string.
    pub addresses: HashMap<String, String>,
    /// Total funded so far, in whole asset units.
    pub total_funded: u64,
    pub funding_count: u32,
}

/// One JSON dictionary file keyed by username, guarded by an async mutex.
/// Load-modify-rename per mutation keeps writers serialized and readers
/// torn-free.
pub struct WalletStore {
    path: PathBuf,
    cap: u64,
    lock: Mutex<()>,
}

impl WalletStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cap: WALLET_FUNDING_CAP,
            lock: Mutex::new(()),
        }
    }

    pub fn with_cap(path: impl AsRef<Path>, cap: u64) -> Self {
        Self { path: path.as_ref().to_path_buf(), cap, lock: Mutex::new(()) }
    }

    fn read_all(&self) -> Result<HashMap<String, WalletEntry>, CrosslockError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn write_all(&self, map: &HashMap<String, WalletEntry>) -> Result<(), CrosslockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub async fn get(&self, username: &Username) -> Result<Option<WalletEntry>, CrosslockError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all()?.get(username.as_str()).cloned())
    }

    /// Record (or replace) a settlement address for a chain.
    pub async fn set_address(
        &self,
        username: &Username,
        chain: &str,
        address: &str,
    ) -> Result<(), CrosslockError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_all()?;
        let entry = map.entry(username.as_str().to_string()).or_default();
        entry.addresses.insert(chain.to_string(), address.to_string());
        self.write_all(&map)
    }

    /// Record a funding event, enforcing the cumulative cap.
    pub async fn fund(&self, username: &Username, units: u64) -> Result<(), CrosslockError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_all()?;
        let entry = map.entry(username.as_str().to_string()).or_default();
        let new_total = entry.total_funded.saturating_add(units);
        if new_total > self.cap {
            return Err(CrosslockError::FundingCapReached { cap: self.cap });
        }
        entry.total_funded = new_total;
        entry.funding_count += 1;
        self.write_all(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "crosslock_wallet_{}_{}.json",
            tag,
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn addresses_and_funding_round_trip() {
        let path = temp_path("roundtrip");
        let _ = fs::remove_file(&path);
        let store = WalletStore::open(&path);
        let alice = Username::from("alice");

        store.set_address(&alice, "utxo", "t1abc").await.unwrap();
        store.set_address(&alice, "sol", "So1xyz").await.unwrap();
        store.fund(&alice, 10).await.unwrap();
        store.fund(&alice, 5).await.unwrap();

        let entry = store.get(&alice).await.unwrap().unwrap();
        assert_eq!(entry.addresses["utxo"], "t1abc");
        assert_eq!(entry.total_funded, 15);
        assert_eq!(entry.funding_count, 2);
    }

    #[tokio::test]
    async fn funding_cap_is_enforced() {
        let path = temp_path("cap");
        let _ = fs::remove_file(&path);
        let store = WalletStore::with_cap(&path, 100);
        let bob = Username::from("bob");

        store.fund(&bob, 100).await.unwrap();
        assert!(matches!(
            store.fund(&bob, 1).await,
            Err(CrosslockError::FundingCapReached { cap: 100 })
        ));
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);
        let store = WalletStore::open(&path);
        assert!(store.get(&Username::from("ghost")).await.unwrap().is_none());
    }
}
