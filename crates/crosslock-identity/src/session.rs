use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crosslock_core::constants::{SESSION_SWEEP_SECS, SESSION_TTL_SECS};
use crosslock_core::types::{Timestamp, Username};
use crosslock_core::CrosslockError;
use crosslock_crypto::Keypair;

use crate::store::IdentityStore;

/// A live login. Holds the unsealed keypair for the session's lifetime;
/// never persisted.
pub struct Session {
    pub id: String,
    pub username: Username,
    pub keypair: Keypair,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

/// In-memory session table. Lock windows are short (map insert/lookup), so a
/// plain mutex is fine here; all heavy work (Argon2, file IO) happens before
/// the lock is taken.
pub struct SessionManager {
    ttl_secs: i64,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new(ttl_secs: i64) -> Self {
        Self { ttl_secs, sessions: Mutex::new(HashMap::new()) }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(SESSION_TTL_SECS)
    }

    /// Password login. Unknown user and wrong password collapse into the
    /// same `AuthFailed` so the API is not a username oracle.
    pub fn login(
        &self,
        store: &IdentityStore,
        username: &Username,
        password: &str,
    ) -> Result<String, CrosslockError> {
        let keypair = store
            .unseal(username, password)
            .map_err(|_| CrosslockError::AuthFailed)?;

        let mut id_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut id_bytes);
        let id = hex::encode(id_bytes);

        let now = chrono::Utc::now().timestamp();
        let session = Session {
            id: id.clone(),
            username: username.clone(),
            keypair,
            created_at: now,
            expires_at: now + self.ttl_secs,
        };

        self.sessions
            .lock()
            .expect("session table poisoned")
            .insert(id.clone(), session);
        debug!(user = %username, "session created");
        Ok(id)
    }

    /// Resolve a session id to its username. Expired and unknown sessions
    /// fail identically.
    pub fn whoami(&self, session_id: &str) -> Result<Username, CrosslockError> {
        let now = chrono::Utc::now().timestamp();
        let table = self.sessions.lock().expect("session table poisoned");
        match table.get(session_id) {
            Some(s) if s.expires_at > now => Ok(s.username.clone()),
            _ => Err(CrosslockError::AuthFailed),
        }
    }

    /// Borrow the session keypair under the table lock, cloning it out.
    pub fn keypair(&self, session_id: &str) -> Result<Keypair, CrosslockError> {
        let now = chrono::Utc::now().timestamp();
        let table = self.sessions.lock().expect("session table poisoned");
        match table.get(session_id) {
            Some(s) if s.expires_at > now => Ok(s.keypair.clone()),
            _ => Err(CrosslockError::AuthFailed),
        }
    }

    pub fn logout(&self, session_id: &str) -> Result<(), CrosslockError> {
        self.sessions
            .lock()
            .expect("session table poisoned")
            .remove(session_id)
            .map(|_| ())
            .ok_or(CrosslockError::AuthFailed)
    }

    /// Drop every session past its expiry. Returns how many were evicted.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let mut table = self.sessions.lock().expect("session table poisoned");
        let before = table.len();
        table.retain(|_, s| s.expires_at > now);
        before - table.len()
    }

    /// Background eviction task.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(SESSION_SWEEP_SECS));
            loop {
                ticker.tick().await;
                let evicted = self.sweep(chrono::Utc::now().timestamp());
                if evicted > 0 {
                    debug!(evicted, "expired sessions swept");
                }
            }
        })
    }
}
