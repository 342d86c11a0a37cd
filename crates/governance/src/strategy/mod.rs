//! Voting strategies
//!
//! A strategy turns an address into a voting weight at a proposal's snapshot
//! height. Strategies are looked up by name in a registry, so communities can
//! only reference strategies this engine knows about. The engine applies the
//! descriptor's balance threshold and weight cap uniformly on top of the raw
//! value each strategy reports.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use cast_chain::ChainSnapshotClient;
use cast_common::{Address, BlockHeight, Error, Result, StrategyDescriptor};

mod balance_of_nfts;
mod custom_script;
mod one_address_one_vote;
mod token_weighted;

pub use balance_of_nfts::BalanceOfNfts;
pub use custom_script::CustomScript;
pub use one_address_one_vote::OneAddressOneVote;
pub use token_weighted::{StakedTokenWeighted, TokenWeighted};

/// Everything a strategy needs to weigh one address
#[derive(Debug, Clone, Copy)]
pub struct WeightQuery<'a> {
    pub descriptor: &'a StrategyDescriptor,
    pub addr: &'a Address,
    pub block_height: BlockHeight,
}

/// A named weight computation
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Registry key
    fn name(&self) -> &'static str;

    /// Whether the descriptor's balance threshold applies to this strategy
    fn uses_threshold(&self) -> bool {
        true
    }

    /// Raw weight before threshold and cap
    async fn raw_weight(&self, chain: &dyn ChainSnapshotClient, query: WeightQuery<'_>) -> Result<Decimal>;
}

/// Registry of strategies bound to a chain client
pub struct StrategyEngine {
    chain: Arc<dyn ChainSnapshotClient>,
    strategies: HashMap<String, Arc<dyn Strategy>>,
}

impl StrategyEngine {
    /// An engine with every built-in strategy registered
    pub fn new(chain: Arc<dyn ChainSnapshotClient>) -> Self {
        let mut engine = Self::empty(chain);
        engine.register(Arc::new(OneAddressOneVote));
        engine.register(Arc::new(TokenWeighted));
        engine.register(Arc::new(StakedTokenWeighted));
        engine.register(Arc::new(BalanceOfNfts));
        engine.register(Arc::new(CustomScript));
        engine
    }

    pub fn empty(chain: Arc<dyn ChainSnapshotClient>) -> Self {
        Self {
            chain,
            strategies: HashMap::new(),
        }
    }

    /// Register a strategy, replacing any with the same name
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn lookup(&self, name: &str) -> Result<&Arc<dyn Strategy>> {
        self.strategies
            .get(name)
            .ok_or_else(|| Error::StrategyNotFound(name.to_string()))
    }

    /// Weight of `addr` under `descriptor` at `block_height`
    pub async fn compute_weight(
        &self,
        descriptor: &StrategyDescriptor,
        addr: &Address,
        block_height: BlockHeight,
    ) -> Result<Decimal> {
        let strategy = self.lookup(&descriptor.name)?;
        let query = WeightQuery { descriptor, addr, block_height };
        let raw = strategy.raw_weight(self.chain.as_ref(), query).await?;

        if strategy.uses_threshold() {
            let threshold = descriptor.contract.threshold();
            if raw < threshold {
                debug!(
                    "{} has {} under {}, below threshold {}",
                    addr, raw, descriptor.name, threshold
                );
                return Err(Error::InsufficientBalance {
                    required: threshold,
                    token: descriptor.contract.token_name().to_string(),
                });
            }
        }

        Ok(match descriptor.contract.max_weight {
            Some(max) if raw > max => max,
            _ => raw,
        })
    }

    /// Like [`compute_weight`](Self::compute_weight), but a weight below the
    /// threshold counts as zero
    pub async fn effective_weight(
        &self,
        descriptor: &StrategyDescriptor,
        addr: &Address,
        block_height: BlockHeight,
    ) -> Result<Decimal> {
        match self.compute_weight(descriptor, addr, block_height).await {
            Err(Error::InsufficientBalance { .. }) => Ok(Decimal::ZERO),
            other => other,
        }
    }
}
