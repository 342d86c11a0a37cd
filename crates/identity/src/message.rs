//! Canonical signed messages
//!
//! Clients sign `domain_tag || message` where the domain tag is the UTF-8 tag
//! right-padded with zero bytes to 32 bytes. The message strings built here
//! must be byte-identical to what the client signed.

use cast_common::{ProposalId, Voucher};

/// Length of the padded domain tag
pub const DOMAIN_TAG_LEN: usize = 32;

/// Pad a domain tag to [`DOMAIN_TAG_LEN`] bytes; longer tags are truncated
pub fn domain_tag(tag: &str) -> [u8; DOMAIN_TAG_LEN] {
    let mut padded = [0u8; DOMAIN_TAG_LEN];
    let bytes = tag.as_bytes();
    let len = bytes.len().min(DOMAIN_TAG_LEN);
    padded[..len].copy_from_slice(&bytes[..len]);
    padded
}

/// Bytes covered by a user signature
pub fn signed_bytes(tag: &[u8; DOMAIN_TAG_LEN], message: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(DOMAIN_TAG_LEN + message.len());
    bytes.extend_from_slice(tag);
    bytes.extend_from_slice(message.as_bytes());
    bytes
}

/// Message signed when casting a vote
pub fn vote_message(proposal_id: ProposalId, choice: &str, timestamp: u64) -> String {
    format!("{}:{}:{}", proposal_id, choice, timestamp)
}

/// Message signed for role-gated mutations
pub fn timestamp_message(timestamp: u64) -> String {
    timestamp.to_string()
}

/// Payload a voucher signer must have signed
pub fn voucher_payload(voucher: &Voucher) -> String {
    format!(
        "{}:{}:{}",
        voucher.on_behalf_of, voucher.action, voucher.timestamp
    )
}
