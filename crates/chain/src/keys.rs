//! Account key model
//!
//! Key weights are fixed-point thousandths: a weight of `1000` is one full
//! signing unit and an account's signing threshold is `1000`. Comparisons are
//! plain integer comparisons.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Fixed-point key weight in thousandths
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyWeight(u32);

impl KeyWeight {
    pub const ZERO: KeyWeight = KeyWeight(0);
    /// Weight required to authorize an account
    pub const THRESHOLD: KeyWeight = KeyWeight(1000);

    pub const fn from_thousandths(thousandths: u32) -> Self {
        Self(thousandths)
    }

    pub fn thousandths(&self) -> u32 {
        self.0
    }

    pub fn meets(&self, threshold: KeyWeight) -> bool {
        self.0 >= threshold.0
    }
}

impl Add for KeyWeight {
    type Output = KeyWeight;

    fn add(self, rhs: KeyWeight) -> KeyWeight {
        KeyWeight(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for KeyWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

/// Signature algorithm of an account key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "ECDSA_P256")]
    EcdsaP256,
    #[serde(rename = "ECDSA_secp256k1")]
    EcdsaSecp256k1,
    #[serde(rename = "ED25519")]
    Ed25519,
}

/// Hash algorithm of an account key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA2_256")]
    Sha2_256,
    #[serde(rename = "SHA3_256")]
    Sha3_256,
}

/// A key registered on an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKey {
    /// Position of the key on the account
    pub index: u32,
    /// Hex-encoded public key
    pub public_key: String,
    pub weight: KeyWeight,
    pub sign_algo: SignatureAlgorithm,
    pub hash_algo: HashAlgorithm,
    pub revoked: bool,
}
