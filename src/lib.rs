//! CAST
//!
//! Vote authorization and weighted tally engine for community governance:
//! signed requests are verified against on-chain account keys, weighed with
//! a community strategy at a fixed snapshot height and recorded at most once
//! per address and proposal.

/// Module version information
pub mod version {
    /// The current version of the CAST library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

pub use cast_chain as chain;
pub use cast_common as common;
pub use cast_governance as governance;
pub use cast_identity as identity;
pub use cast_storage as storage;

pub use cast_common::{CastConfig, Configuration, Error, Result};
pub use cast_governance::GovernanceService;
