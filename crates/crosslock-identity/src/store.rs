use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crosslock_core::types::Username;
use crosslock_core::CrosslockError;
use crosslock_crypto::seal::{seal_private_key, unseal_private_key, SealedKey};
use crosslock_crypto::Keypair;

/// On-disk identity record, one JSON file per user. Public coordinates,
/// salt and sealed scalar are written together in a single atomic rename so
/// the pairing can never be observed half-updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub username: Username,
    /// Uncompressed SEC1 public key, hex (0x04 || X || Y).
    pub public_key: String,
    /// 32-byte Argon2 salt, hex.
    pub salt: String,
    /// Nonce-prefixed AEAD blob over the private scalar, hex.
    pub sealed: String,
    pub created_at: i64,
}

impl IdentityRecord {
    pub fn public_key_bytes(&self) -> Result<[u8; 65], CrosslockError> {
        let v = hex::decode(&self.public_key)
            .map_err(|_| CrosslockError::MalformedKey)?;
        v.try_into().map_err(|_| CrosslockError::MalformedKey)
    }
}

/// File-backed identity store rooted at an owner-only directory.
pub struct IdentityStore {
    root: PathBuf,
}

impl IdentityStore {
    /// Open (creating if needed) the store directory with owner-only access.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CrosslockError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&root, fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self { root })
    }

    fn path_for(&self, username: &Username) -> PathBuf {
        self.root.join(format!("{}.id.json", username.as_str()))
    }

    /// Create a new identity: generate a P-256 keypair, seal the scalar
    /// under `password`, persist atomically. Refuses to overwrite.
    pub fn register(
        &self,
        username: &Username,
        password: &str,
    ) -> Result<Keypair, CrosslockError> {
        let path = self.path_for(username);
        if path.exists() {
            return Err(CrosslockError::IdentityExists(username.to_string()));
        }

        let keypair = Keypair::generate();
        let scalar = keypair.scalar_bytes();
        let sealed = seal_private_key(scalar.as_ref(), password)
            .map_err(|e| CrosslockError::Storage(e.to_string()))?;

        let record = IdentityRecord {
            username: username.clone(),
            public_key: hex::encode(keypair.public_key_bytes()),
            salt: hex::encode(sealed.salt),
            sealed: hex::encode(&sealed.blob),
            created_at: chrono::Utc::now().timestamp(),
        };
        self.write_atomic(&path, &record)?;
        Ok(keypair)
    }

    /// Load a record; unknown users surface as `AuthFailed` at the login
    /// edge, but the store itself reports the specific miss.
    pub fn load(&self, username: &Username) -> Result<IdentityRecord, CrosslockError> {
        let path = self.path_for(username);
        if !path.exists() {
            return Err(CrosslockError::UnknownUsername(username.to_string()));
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Unseal the private scalar and reconstruct the keypair.
    pub fn unseal(
        &self,
        username: &Username,
        password: &str,
    ) -> Result<Keypair, CrosslockError> {
        let record = self.load(username)?;
        let salt: [u8; 32] = hex::decode(&record.salt)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| CrosslockError::Storage("corrupt salt".into()))?;
        let blob = hex::decode(&record.sealed)
            .map_err(|_| CrosslockError::Storage("corrupt sealed blob".into()))?;

        let scalar = unseal_private_key(&SealedKey { salt, blob }, password)
            .map_err(|_| CrosslockError::AuthFailed)?;
        let keypair = Keypair::from_scalar_bytes(&scalar)
            .map_err(|_| CrosslockError::Storage("corrupt scalar".into()))?;

        // The sealed scalar must still match the stored public key.
        if hex::encode(keypair.public_key_bytes()) != record.public_key {
            return Err(CrosslockError::Storage("public key mismatch".into()));
        }
        Ok(keypair)
    }

    pub fn lookup_public_key(&self, username: &Username) -> Result<[u8; 65], CrosslockError> {
        self.load(username)?.public_key_bytes()
    }

    /// Remove an identity file (rollback after failed wallet provisioning).
    pub fn delete(&self, username: &Username) -> Result<(), CrosslockError> {
        let path = self.path_for(username);
        if !path.exists() {
            return Err(CrosslockError::UnknownUsername(username.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    pub fn exists(&self, username: &Username) -> bool {
        self.path_for(username).exists()
    }

    /// Write via temp file + rename so readers never see a torn record.
    fn write_atomic(&self, path: &Path, record: &IdentityRecord) -> Result<(), CrosslockError> {
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
