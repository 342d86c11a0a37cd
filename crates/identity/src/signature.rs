//! Single-key signature checks
use ring::signature::{UnparsedPublicKey, ECDSA_P256_SHA256_FIXED, ED25519};

use cast_chain::{AccountKey, HashAlgorithm, SignatureAlgorithm};
use cast_common::{Error, Result};

/// Length of an uncompressed P-256 point without the SEC1 `0x04` prefix
const RAW_P256_KEY_LEN: usize = 64;

/// Verify a hex-encoded signature over `message` with an account key
pub fn verify_with_key(key: &AccountKey, message: &[u8], signature_hex: &str) -> Result<()> {
    let public_key = hex::decode(key.public_key.trim_start_matches("0x"))
        .map_err(|e| Error::invalid_signature(format!("key {} is not hex: {}", key.index, e)))?;
    let signature = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| Error::invalid_signature(format!("signature is not hex: {}", e)))?;

    let verified = match (key.sign_algo, key.hash_algo) {
        (SignatureAlgorithm::EcdsaP256, HashAlgorithm::Sha2_256) => {
            let sec1 = if public_key.len() == RAW_P256_KEY_LEN {
                let mut sec1 = Vec::with_capacity(RAW_P256_KEY_LEN + 1);
                sec1.push(0x04);
                sec1.extend_from_slice(&public_key);
                sec1
            } else {
                public_key
            };
            UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, sec1).verify(message, &signature)
        }
        (SignatureAlgorithm::Ed25519, _) => {
            UnparsedPublicKey::new(&ED25519, public_key).verify(message, &signature)
        }
        (sign_algo, hash_algo) => {
            return Err(Error::invalid_signature(format!(
                "unsupported key algorithm {:?}/{:?} on key {}",
                sign_algo, hash_algo, key.index
            )))
        }
    };

    verified.map_err(|_| {
        Error::invalid_signature(format!("signature does not verify with key {}", key.index))
    })
}
