use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::ecdsa::SignatureError;

/// A Crosslock identity keypair: P-256 signing key with its uncompressed
/// public encoding. The secret scalar lives inside the `SigningKey`, which
/// zeroizes on drop; exported copies are wrapped in `Zeroizing`.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh P-256 keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self { signing: SigningKey::random(&mut OsRng) }
    }

    /// Restore a keypair from a raw 32-byte scalar (e.g. after unsealing).
    pub fn from_scalar_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let signing = SigningKey::from_slice(bytes).map_err(|_| SignatureError::MalformedKey)?;
        Ok(Self { signing })
    }

    /// 65-byte uncompressed SEC1 public key (0x04 || X || Y).
    pub fn public_key_bytes(&self) -> [u8; 65] {
        let point = self.signing.verifying_key().to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Raw secret scalar, for sealing to disk. Wiped when dropped.
    pub fn scalar_bytes(&self) -> Zeroizing<[u8; 32]> {
        let bytes = self.signing.to_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Zeroizing::new(out)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing.verifying_key()
    }

    /// Sign `message`, returning a DER-encoded ECDSA signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        crate::ecdsa::sign(&self.signing, message)
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self { signing: self.signing.clone() }
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pk = self.public_key_bytes();
        write!(f, "Keypair(pub={}…)", hex::encode(&pk[..5]))
    }
}
