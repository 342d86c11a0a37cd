//! Identity verification for CAST
//!
//! Requests carry no session. Each one proves it comes from the address it
//! claims, either with signatures from that account's keys or with a voucher
//! signed by a delegate. Signatures are checked against the keys the chain
//! reports for the account, and their key weights must reach the account's
//! signing threshold.

pub mod message;
pub mod signature;
pub mod verifier;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use verifier::{IdentityVerifier, Verification};
