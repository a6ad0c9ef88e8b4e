use rand::RngCore;
use zeroize::Zeroizing;

use crosslock_core::types::HashLock;
use crosslock_core::CrosslockError;
use crosslock_crypto::{hash160, sha256};

/// Generate a fresh 32-byte preimage from the OS CSPRNG. The accepting side
/// calls this once per swap; the bytes never leave process memory unwiped.
pub fn generate_secret() -> Zeroizing<[u8; 32]> {
    let mut secret = Zeroizing::new([0u8; 32]);
    rand::thread_rng().fill_bytes(secret.as_mut());
    secret
}

/// Dual hash commitment over one preimage: HASH160 locks the UTXO script,
/// SHA-256 keys the contract record.
pub fn bind_secret(secret: &[u8]) -> HashLock {
    HashLock { h160: hash160(secret), h256: sha256(secret) }
}

/// Both commitments must come from the same preimage or the coordinator
/// refuses to advance.
pub fn verify_binding(secret: &[u8], lock: &HashLock) -> Result<(), CrosslockError> {
    if bind_secret(secret) != *lock {
        return Err(CrosslockError::HashBindingMismatch);
    }
    Ok(())
}
