//! Chain snapshot client for CAST
//!
//! A read-only view of an external ledger: account keys, fungible and staked
//! balances, NFT holdings and script execution, each evaluated at a fixed
//! block height.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use cast_common::{Address, BlockHeight, ContractParams};

pub mod keys;
pub mod memory;
pub mod timeout;

pub use keys::{AccountKey, HashAlgorithm, KeyWeight, SignatureAlgorithm};
pub use memory::MemoryChain;
pub use timeout::TimeoutChainClient;

/// Errors returned by a chain snapshot client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// Account, block or contract does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The call did not complete in time
    #[error("Chain request timed out after {0:?}")]
    Timeout(Duration),

    /// The access node could not be reached
    #[error("Chain unavailable: {0}")]
    Unavailable(String),

    /// Script execution failed
    #[error("Script error: {0}")]
    Script(String),
}

impl ChainError {
    /// Transport-level failures that a caller may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Timeout(_) | ChainError::Unavailable(_))
    }
}

/// Result type for chain operations
pub type ChainResult<T> = Result<T, ChainError>;

impl From<ChainError> for cast_common::Error {
    fn from(err: ChainError) -> Self {
        cast_common::Error::BalanceFetchError(err.to_string())
    }
}

/// Read interface to the ledger
#[async_trait]
pub trait ChainSnapshotClient: Send + Sync + 'static {
    /// Latest sealed block height
    async fn latest_block_height(&self) -> ChainResult<BlockHeight>;

    /// Keys registered on an account
    async fn get_account_keys(&self, address: &Address) -> ChainResult<Vec<AccountKey>>;

    /// Fungible token balance at `height`
    async fn get_balance(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<Decimal>;

    /// Staked token balance at `height`
    async fn get_staked_balance(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<Decimal>;

    /// Number of NFTs held from a collection at `height`
    async fn get_nft_count(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<u64>;

    /// Run a community-supplied script for `address` and return its numeric result
    async fn execute_script(
        &self,
        script: &str,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<Decimal>;
}
