use async_trait::async_trait;
use rust_decimal::Decimal;

use cast_chain::ChainSnapshotClient;
use cast_common::Result;

use super::{Strategy, WeightQuery};

/// Weight is the fungible token balance at the snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenWeighted;

#[async_trait]
impl Strategy for TokenWeighted {
    fn name(&self) -> &'static str {
        "token-weighted-default"
    }

    async fn raw_weight(&self, chain: &dyn ChainSnapshotClient, query: WeightQuery<'_>) -> Result<Decimal> {
        Ok(chain
            .get_balance(query.addr, &query.descriptor.contract, query.block_height)
            .await?)
    }
}

/// Weight is the staked token balance at the snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct StakedTokenWeighted;

#[async_trait]
impl Strategy for StakedTokenWeighted {
    fn name(&self) -> &'static str {
        "staked-token-weighted-default"
    }

    async fn raw_weight(&self, chain: &dyn ChainSnapshotClient, query: WeightQuery<'_>) -> Result<Decimal> {
        Ok(chain
            .get_staked_balance(query.addr, &query.descriptor.contract, query.block_height)
            .await?)
    }
}
