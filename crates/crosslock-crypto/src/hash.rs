use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// HASH160: RIPEMD160(SHA256(x)). Locks the UTXO-chain HTLC branch and
/// derives pubkey hashes for the script.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(Sha256::digest(data)));
    out
}

/// HASH256: SHA256(SHA256(x)). UTXO-chain txids and sighashes.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(Sha256::digest(data)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fixed vectors so a dependency bump that changes behaviour is caught.
    #[test]
    fn sha256_empty_vector() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash160_is_ripemd_of_sha() {
        use ripemd::Ripemd160;
        use sha2::Digest;
        let expected = Ripemd160::digest(sha256(b"preimage"));
        assert_eq!(hash160(b"preimage")[..], expected[..]);
        assert_eq!(hash160(b"preimage").len(), 20);
    }

    #[test]
    fn hash256_is_double_sha() {
        let once = sha256(b"crosslock");
        assert_eq!(hash256(b"crosslock"), sha256(&once));
    }

    #[test]
    fn swap_secret_binding_vector() {
        // The canonical demo secret used by the end-to-end scenario.
        let h160 = hash160(b"atomic_swap_secret_42");
        assert_eq!(h160.len(), 20);
        let h256 = sha256(b"atomic_swap_secret_42");
        assert_ne!(&h256[..20], &h160[..]);
    }
}
