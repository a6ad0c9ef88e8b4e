use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealError {
    #[error("wrong password")]
    WrongPassword,
    #[error("malformed sealed blob")]
    MalformedBlob,
    #[error("key derivation failed")]
    KdfFailed,
}

/// A sealed private scalar as persisted to the identity file: the KDF salt
/// and the AEAD blob (nonce prepended to ciphertext).
#[derive(Debug, Clone, PartialEq)]
pub struct SealedKey {
    pub salt: [u8; SALT_LEN],
    pub blob: Vec<u8>,
}

/// Stretch `password` with Argon2id under `salt` into an AEAD key.
fn stretch(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, SealError> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, key.as_mut())
        .map_err(|_| SealError::KdfFailed)?;
    Ok(key)
}

/// Seal a private scalar under a password. A fresh 32-byte salt and 12-byte
/// nonce are drawn per call; the nonce is prepended to the ciphertext.
pub fn seal_private_key(scalar: &[u8], password: &str) -> Result<SealedKey, SealError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = stretch(password, &salt)?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let aead = ChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
    let ciphertext = aead
        .encrypt(Nonce::from_slice(&nonce), scalar)
        .map_err(|_| SealError::KdfFailed)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(SealedKey { salt, blob })
}

/// Unseal a private scalar. A wrong password surfaces as the AEAD tag
/// failing, reported uniformly as `WrongPassword`.
pub fn unseal_private_key(
    sealed: &SealedKey,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, SealError> {
    if sealed.blob.len() < NONCE_LEN + TAG_LEN {
        return Err(SealError::MalformedBlob);
    }
    let (nonce, ciphertext) = sealed.blob.split_at(NONCE_LEN);
    let key = stretch(password, &sealed.salt)?;

    let aead = ChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
    let plaintext = aead
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SealError::WrongPassword)?;
    Ok(Zeroizing::new(plaintext))
}
