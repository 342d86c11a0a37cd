//! In-memory ledger with per-height history
//!
//! Every value is recorded together with the height it became effective at.
//! A query at height `H` observes the most recent value recorded at or below
//! `H`, and a query above the latest height fails like an unsealed block.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use cast_common::{Address, BlockHeight, ContractParams};

use crate::{AccountKey, ChainError, ChainResult, ChainSnapshotClient};

type History<T> = BTreeMap<BlockHeight, T>;
type HoldingKey = (Address, String);

#[derive(Debug, Default)]
struct Ledger {
    latest_height: BlockHeight,
    keys: HashMap<Address, Vec<AccountKey>>,
    balances: HashMap<HoldingKey, History<Decimal>>,
    staked: HashMap<HoldingKey, History<Decimal>>,
    nfts: HashMap<HoldingKey, History<u64>>,
    scripts: HashMap<HoldingKey, History<Decimal>>,
    unavailable: bool,
    latency: Option<Duration>,
}

fn value_at<T: Copy + Default>(history: Option<&History<T>>, height: BlockHeight) -> T {
    history
        .and_then(|h| h.range(..=height).next_back())
        .map(|(_, value)| *value)
        .unwrap_or_default()
}

/// In-memory chain snapshot client
#[derive(Debug, Clone, Default)]
pub struct MemoryChain {
    ledger: Arc<RwLock<Ledger>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal blocks up to `height`
    pub async fn set_latest_height(&self, height: BlockHeight) {
        self.ledger.write().await.latest_height = height;
    }

    pub async fn set_account_keys(&self, address: &Address, keys: Vec<AccountKey>) {
        self.ledger.write().await.keys.insert(address.clone(), keys);
    }

    /// Record a fungible balance effective from `height`
    pub async fn set_balance(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
        amount: Decimal,
    ) {
        let mut ledger = self.ledger.write().await;
        ledger
            .balances
            .entry((address.clone(), contract.identifier()))
            .or_default()
            .insert(height, amount);
    }

    /// Record a staked balance effective from `height`
    pub async fn set_staked_balance(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
        amount: Decimal,
    ) {
        let mut ledger = self.ledger.write().await;
        ledger
            .staked
            .entry((address.clone(), contract.identifier()))
            .or_default()
            .insert(height, amount);
    }

    /// Record an NFT count effective from `height`
    pub async fn set_nft_count(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
        count: u64,
    ) {
        let mut ledger = self.ledger.write().await;
        ledger
            .nfts
            .entry((address.clone(), contract.identifier()))
            .or_default()
            .insert(height, count);
    }

    /// Record the result `script` returns for `address` from `height`
    pub async fn set_script_result(
        &self,
        script: &str,
        address: &Address,
        height: BlockHeight,
        result: Decimal,
    ) {
        let mut ledger = self.ledger.write().await;
        ledger
            .scripts
            .entry((address.clone(), script.to_string()))
            .or_default()
            .insert(height, result);
    }

    /// Make every call fail with `ChainError::Unavailable`
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.ledger.write().await.unavailable = unavailable;
    }

    /// Delay every call by `latency`
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.ledger.write().await.latency = latency;
    }

    /// Common preamble of every query: latency, availability and height checks
    async fn enter(&self, height: Option<BlockHeight>) -> ChainResult<()> {
        let (latency, unavailable, latest) = {
            let ledger = self.ledger.read().await;
            (ledger.latency, ledger.unavailable, ledger.latest_height)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if unavailable {
            return Err(ChainError::Unavailable("access node offline".into()));
        }
        if let Some(height) = height {
            if height > latest {
                return Err(ChainError::NotFound(format!("block {} is not sealed", height)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSnapshotClient for MemoryChain {
    async fn latest_block_height(&self) -> ChainResult<BlockHeight> {
        self.enter(None).await?;
        Ok(self.ledger.read().await.latest_height)
    }

    async fn get_account_keys(&self, address: &Address) -> ChainResult<Vec<AccountKey>> {
        self.enter(None).await?;
        let ledger = self.ledger.read().await;
        ledger
            .keys
            .get(address)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("account {}", address)))
    }

    async fn get_balance(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<Decimal> {
        self.enter(Some(height)).await?;
        let ledger = self.ledger.read().await;
        let key = (address.clone(), contract.identifier());
        let balance = value_at(ledger.balances.get(&key), height);
        debug!("Balance of {} in {} at {}: {}", address, key.1, height, balance);
        Ok(balance)
    }

    async fn get_staked_balance(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<Decimal> {
        self.enter(Some(height)).await?;
        let ledger = self.ledger.read().await;
        let key = (address.clone(), contract.identifier());
        Ok(value_at(ledger.staked.get(&key), height))
    }

    async fn get_nft_count(
        &self,
        address: &Address,
        contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<u64> {
        self.enter(Some(height)).await?;
        let ledger = self.ledger.read().await;
        let key = (address.clone(), contract.identifier());
        Ok(value_at(ledger.nfts.get(&key), height))
    }

    async fn execute_script(
        &self,
        script: &str,
        address: &Address,
        _contract: &ContractParams,
        height: BlockHeight,
    ) -> ChainResult<Decimal> {
        self.enter(Some(height)).await?;
        let ledger = self.ledger.read().await;
        let key = (address.clone(), script.to_string());
        if !ledger.scripts.keys().any(|(_, s)| s == script) {
            return Err(ChainError::Script("script is not deployed".into()));
        }
        Ok(value_at(ledger.scripts.get(&key), height))
    }
}
