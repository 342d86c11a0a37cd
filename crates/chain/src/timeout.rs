//! Deadline enforcement for chain calls
//!
//! Elapsed deadlines surface as [`ChainError::Timeout`]. Nothing here retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::warn;

use cast_common::{Address, BlockHeight, ContractParams};

use crate::{AccountKey, ChainError, ChainResult, ChainSnapshotClient};

/// Wraps a client so that every call is bounded by `timeout`
#[derive(Clone)]
pub struct TimeoutChainClient {
    inner: Arc<dyn ChainSnapshotClient>,
    timeout: Duration,
}

impl TimeoutChainClient {
    pub fn new(inner: Arc<dyn ChainSnapshotClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, call: &str, fut: impl Future<Output = ChainResult<T>>) -> ChainResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Chain call {} timed out after {:?}", call, self.timeout);
                Err(ChainError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl ChainSnapshotClient for TimeoutChainClient {
    async fn latest_block_height(&self) -> ChainResult<BlockHeight> {
        self.bounded("latest_block_height", self.inner.latest_block_height())
            .await
    }

    async fn get_account_keys(&self, address: &Address) -> ChainResult<Vec<AccountKey>> {
        self.bounded("get_account_keys", self.inner.get_account_keys(address))
            .await
    }

    async fn get_balance(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<Decimal> {
        self.bounded("get_balance", self.inner.get_balance(address, contract, height))
            .await
    }

    async fn get_staked_balance(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<Decimal> {
        self.bounded(
            "get_staked_balance",
            self.inner.get_staked_balance(address, contract, height),
        )
        .await
    }

    async fn get_nft_count(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<u64> {
        self.bounded("get_nft_count", self.inner.get_nft_count(address, contract, height))
            .await
    }

    async fn execute_script(
        &self,
        script: &str,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<Decimal> {
        self.bounded(
            "execute_script",
            self.inner.execute_script(script, address, contract, height),
        )
        .await
    }
}
