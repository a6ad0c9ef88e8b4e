use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;

/// Serialized layout: `ephemeral_pub(65) || nonce(12) || ciphertext+tag`.
const EPHEMERAL_LEN: usize = 65;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Domain-separation label for the KDF.
const KDF_INFO: &[u8] = b"crosslock-ecies-v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EciesError {
    #[error("malformed recipient public key")]
    MalformedKey,
    #[error("malformed ciphertext")]
    MalformedCiphertext,
    #[error("authentication failed")]
    AuthFailed,
}

/// Split an ECDH shared secret into an AEAD key and nonce via HKDF-SHA256.
fn derive_key_nonce(shared: &[u8]) -> ([u8; 32], [u8; 12]) {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut okm = [0u8; 44];
    hk.expand(KDF_INFO, &mut okm)
        .expect("44 bytes is a valid HKDF-SHA256 output length");
    let mut key = [0u8; 32];
    let mut nonce = [0u8; 12];
    key.copy_from_slice(&okm[..32]);
    nonce.copy_from_slice(&okm[32..]);
    (key, nonce)
}

/// Encrypt `plaintext` so only the holder of the private key matching
/// `recipient_pub` (65-byte uncompressed SEC1) can read it.
///
/// A fresh ephemeral keypair per call means the derived nonce is never
/// reused under the same key.
pub fn ecies_encrypt(recipient_pub: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EciesError> {
    let recipient =
        PublicKey::from_sec1_bytes(recipient_pub).map_err(|_| EciesError::MalformedKey)?;

    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let ephemeral_pub = ephemeral.public_key().to_encoded_point(false);

    let shared = ephemeral.diffie_hellman(&recipient);
    let (key, nonce) = derive_key_nonce(shared.raw_secret_bytes());

    let aead = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = aead
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| EciesError::AuthFailed)?;

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open an ECIES blob with the recipient's signing key.
pub fn ecies_decrypt(private: &SigningKey, sealed: &[u8]) -> Result<Vec<u8>, EciesError> {
    if sealed.len() < EPHEMERAL_LEN + NONCE_LEN + TAG_LEN {
        return Err(EciesError::MalformedCiphertext);
    }
    let (eph_bytes, rest) = sealed.split_at(EPHEMERAL_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let ephemeral =
        PublicKey::from_sec1_bytes(eph_bytes).map_err(|_| EciesError::MalformedCiphertext)?;

    let shared = p256::ecdh::diffie_hellman(
        private.as_nonzero_scalar(),
        ephemeral.as_affine(),
    );
    let (key, _) = derive_key_nonce(shared.raw_secret_bytes());

    let aead = ChaCha20Poly1305::new(Key::from_slice(&key));
    aead.decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| EciesError::AuthFailed)
}
