//! crosslock-crypto
//!
//! Cryptographic primitives for Crosslock nodes: P-256 ECDSA identities,
//! ECIES directed encryption, password-based private-key sealing, and the
//! hash functions shared with the HTLC layer.
//!
//! All public keys cross module boundaries as 65-byte uncompressed SEC1
//! encodings; signatures are DER.

pub mod ecdsa;
pub mod ecies;
pub mod hash;
pub mod keys;
pub mod seal;

pub use ecdsa::{sign, verify, SignatureError};
pub use ecies::{ecies_decrypt, ecies_encrypt, EciesError};
pub use hash::{hash160, hash256, sha256};
pub use keys::Keypair;
pub use seal::{seal_private_key, unseal_private_key, SealError, SealedKey};
