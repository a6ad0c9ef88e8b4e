use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed public key")]
    MalformedKey,
    #[error("malformed DER signature")]
    MalformedDer,
}

/// Sign `message` with a P-256 key. RFC 6979 deterministic nonces, so
/// identical inputs produce identical signatures. Output is DER.
pub fn sign(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let sig: Signature = key.sign(message);
    sig.to_der().as_bytes().to_vec()
}

/// Verify a DER signature against a 65-byte uncompressed SEC1 public key.
pub fn verify(public_key: &[u8], message: &[u8], der: &[u8]) -> Result<(), SignatureError> {
    let vk = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|_| SignatureError::MalformedKey)?;
    let sig = Signature::from_der(der).map_err(|_| SignatureError::MalformedDer)?;
    vk.verify(message, &sig)
        .map_err(|_| SignatureError::InvalidSignature)
}
