//! Composite signature and voucher verification

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use cast_chain::{ChainError, ChainSnapshotClient, KeyWeight};
use cast_common::config::IdentityConfig;
use cast_common::{Address, AuthProof, Clock, CompositeSignature, Error, Result, Voucher, VoucherAction};

use crate::message::{self, DOMAIN_TAG_LEN};
use crate::signature::verify_with_key;

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// The address the request acts for
    pub addr: Address,
    /// Total weight of the keys that signed
    pub signing_weight: KeyWeight,
    /// Voucher signer, when the request came through a delegate
    pub delegate: Option<Address>,
}

impl Verification {
    /// The address whose roles authorize the action
    pub fn actor(&self) -> &Address {
        self.delegate.as_ref().unwrap_or(&self.addr)
    }
}

/// Proves that requests originate from the address they claim
pub struct IdentityVerifier {
    chain: Arc<dyn ChainSnapshotClient>,
    clock: Arc<dyn Clock>,
    window_ms: u64,
    domain_tag: [u8; DOMAIN_TAG_LEN],
    threshold: KeyWeight,
}

impl IdentityVerifier {
    pub fn new(
        config: &IdentityConfig,
        chain: Arc<dyn ChainSnapshotClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chain,
            clock,
            window_ms: config.timestamp_window_secs.saturating_mul(1000),
            domain_tag: message::domain_tag(&config.user_domain_tag),
            threshold: KeyWeight::THRESHOLD,
        }
    }

    /// Verify that `signatures` over `message` prove control of `claimed`
    pub async fn verify(
        &self,
        claimed: &Address,
        timestamp: u64,
        signatures: &[CompositeSignature],
        message: &str,
    ) -> Result<Verification> {
        self.check_timestamp(timestamp)?;

        if signatures.is_empty() {
            return Err(Error::invalid_signature("no signatures provided"));
        }

        let keys = self.chain.get_account_keys(claimed).await.map_err(|e| match e {
            ChainError::NotFound(_) => {
                Error::invalid_signature(format!("account {} has no keys", claimed))
            }
            other => Error::from(other),
        })?;

        let signed = message::signed_bytes(&self.domain_tag, message);
        let mut seen = HashSet::new();
        let mut total = KeyWeight::ZERO;

        for sig in signatures {
            if &sig.addr != claimed {
                return Err(Error::invalid_signature(format!(
                    "signature from {} does not belong to {}",
                    sig.addr, claimed
                )));
            }

            let key = keys
                .iter()
                .find(|k| k.index == sig.key_id)
                .ok_or_else(|| Error::invalid_signature(format!("unknown key {}", sig.key_id)))?;
            if key.revoked {
                return Err(Error::invalid_signature(format!("key {} is revoked", key.index)));
            }

            verify_with_key(key, &signed, &sig.signature)?;

            // A key counts once, however many times it signed
            if seen.insert(key.index) {
                total = total + key.weight;
            }
        }

        if !total.meets(self.threshold) {
            warn!("Signatures for {} carry weight {} of {}", claimed, total, self.threshold);
            return Err(Error::InsufficientKeyWeight {
                have: total.thousandths(),
                required: self.threshold.thousandths(),
            });
        }

        debug!("Verified {} with key weight {}", claimed, total);
        Ok(Verification {
            addr: claimed.clone(),
            signing_weight: total,
            delegate: None,
        })
    }

    /// Verify a voucher presented on behalf of `claimed` for `requested`
    pub async fn verify_voucher(
        &self,
        claimed: &Address,
        voucher: &Voucher,
        requested: &VoucherAction,
    ) -> Result<Verification> {
        if voucher.payload != message::voucher_payload(voucher) {
            return Err(Error::invalid_signature("voucher payload does not match its contents"));
        }

        let signer = self
            .verify(
                &voucher.signer,
                voucher.timestamp,
                &voucher.composite_signatures,
                &voucher.payload,
            )
            .await?;

        if &voucher.on_behalf_of != claimed {
            return Err(Error::forbidden(format!(
                "voucher from {} is for {}, not {}",
                voucher.signer, voucher.on_behalf_of, claimed
            )));
        }
        if !voucher.action.covers(requested) {
            return Err(Error::forbidden(format!(
                "voucher grants {} but {} was requested",
                voucher.action, requested
            )));
        }

        debug!(
            "Voucher from {} accepted for {} acting as {}",
            voucher.signer, requested, claimed
        );
        Ok(Verification {
            addr: claimed.clone(),
            signing_weight: signer.signing_weight,
            delegate: Some(voucher.signer.clone()),
        })
    }

    /// Verify either kind of proof; `message_for` rebuilds the direct-path
    /// message from the signed timestamp
    pub async fn verify_proof<F>(
        &self,
        claimed: &Address,
        proof: &AuthProof,
        message_for: F,
        requested: &VoucherAction,
    ) -> Result<Verification>
    where
        F: FnOnce(u64) -> String,
    {
        match proof {
            AuthProof::Signatures { timestamp, composite_signatures } => {
                let message = message_for(*timestamp);
                self.verify(claimed, *timestamp, composite_signatures, &message)
                    .await
            }
            AuthProof::Voucher(voucher) => self.verify_voucher(claimed, voucher, requested).await,
        }
    }

    fn check_timestamp(&self, timestamp: u64) -> Result<()> {
        let now = self.clock.now_ms();
        if now.abs_diff(timestamp) > self.window_ms {
            return Err(Error::ExpiredTimestamp { timestamp });
        }
        Ok(())
    }
}
