//! Signing helpers for tests
//!
//! Generates real key pairs so that tests exercise the same verification path
//! as production requests.

use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING,
};

use cast_chain::{AccountKey, HashAlgorithm, KeyWeight, MemoryChain, SignatureAlgorithm};
use cast_common::config::IdentityConfig;
use cast_common::{Address, AuthProof, CompositeSignature, ProposalId, Voucher, VoucherAction};

use crate::message;

/// A key pair with the weight it carries on its account
pub enum TestKey {
    P256 { pair: EcdsaKeyPair, weight: KeyWeight },
    Ed25519 { pair: Ed25519KeyPair, weight: KeyWeight },
}

impl TestKey {
    pub fn p256(weight: KeyWeight) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .expect("generate p256 key");
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
            .expect("parse p256 key");
        TestKey::P256 { pair, weight }
    }

    pub fn ed25519(weight: KeyWeight) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("generate ed25519 key");
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("parse ed25519 key");
        TestKey::Ed25519 { pair, weight }
    }

    /// The on-chain record for this key at `index`
    pub fn account_key(&self, index: u32) -> AccountKey {
        match self {
            TestKey::P256 { pair, weight } => AccountKey {
                index,
                // Stored without the SEC1 prefix, as the chain reports it
                public_key: hex::encode(&pair.public_key().as_ref()[1..]),
                weight: *weight,
                sign_algo: SignatureAlgorithm::EcdsaP256,
                hash_algo: HashAlgorithm::Sha2_256,
                revoked: false,
            },
            TestKey::Ed25519 { pair, weight } => AccountKey {
                index,
                public_key: hex::encode(pair.public_key().as_ref()),
                weight: *weight,
                sign_algo: SignatureAlgorithm::Ed25519,
                hash_algo: HashAlgorithm::Sha2_256,
                revoked: false,
            },
        }
    }

    /// Hex signature over raw bytes
    pub fn sign_bytes(&self, bytes: &[u8]) -> String {
        match self {
            TestKey::P256 { pair, .. } => {
                let rng = SystemRandom::new();
                hex::encode(pair.sign(&rng, bytes).expect("p256 sign").as_ref())
            }
            TestKey::Ed25519 { pair, .. } => hex::encode(pair.sign(bytes).as_ref()),
        }
    }
}

/// An account with one or more keys
pub struct TestAccount {
    pub address: Address,
    keys: Vec<TestKey>,
    tag: [u8; message::DOMAIN_TAG_LEN],
}

impl TestAccount {
    /// One P-256 key per weight, in thousandths
    pub fn new(address: &str, weights: &[u32]) -> Self {
        Self {
            address: Address::parse(address).expect("test address"),
            keys: weights
                .iter()
                .map(|w| TestKey::p256(KeyWeight::from_thousandths(*w)))
                .collect(),
            tag: message::domain_tag(&IdentityConfig::default().user_domain_tag),
        }
    }

    /// An account with a single full-weight key
    pub fn single(address: &str) -> Self {
        Self::new(address, &[KeyWeight::THRESHOLD.thousandths()])
    }

    pub fn with_key(mut self, key: TestKey) -> Self {
        self.keys.push(key);
        self
    }

    pub fn account_keys(&self) -> Vec<AccountKey> {
        self.keys
            .iter()
            .enumerate()
            .map(|(i, key)| key.account_key(i as u32))
            .collect()
    }

    /// Publish this account's keys on a memory chain
    pub async fn register(&self, chain: &MemoryChain) {
        chain.set_account_keys(&self.address, self.account_keys()).await;
    }

    /// Sign `message` with every key
    pub fn sign(&self, message: &str) -> Vec<CompositeSignature> {
        let ids: Vec<u32> = (0..self.keys.len() as u32).collect();
        self.sign_with(&ids, message)
    }

    /// Sign `message` with the keys at `key_ids`
    pub fn sign_with(&self, key_ids: &[u32], message: &str) -> Vec<CompositeSignature> {
        let bytes = message::signed_bytes(&self.tag, message);
        key_ids
            .iter()
            .map(|id| CompositeSignature {
                addr: self.address.clone(),
                key_id: *id,
                signature: self.keys[*id as usize].sign_bytes(&bytes),
            })
            .collect()
    }

    pub fn vote_proof(&self, proposal_id: ProposalId, choice: &str, timestamp: u64) -> AuthProof {
        AuthProof::Signatures {
            timestamp,
            composite_signatures: self.sign(&message::vote_message(proposal_id, choice, timestamp)),
        }
    }

    pub fn timestamp_proof(&self, timestamp: u64) -> AuthProof {
        AuthProof::Signatures {
            timestamp,
            composite_signatures: self.sign(&message::timestamp_message(timestamp)),
        }
    }

    /// A voucher signed by this account acting for `on_behalf_of`
    pub fn voucher(&self, on_behalf_of: &Address, action: VoucherAction, timestamp: u64) -> Voucher {
        let mut voucher = Voucher {
            signer: self.address.clone(),
            on_behalf_of: on_behalf_of.clone(),
            action,
            timestamp,
            payload: String::new(),
            composite_signatures: vec![],
        };
        voucher.payload = message::voucher_payload(&voucher);
        voucher.composite_signatures = self.sign(&voucher.payload);
        voucher
    }
}
