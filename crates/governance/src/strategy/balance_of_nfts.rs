use async_trait::async_trait;
use rust_decimal::Decimal;

use cast_chain::ChainSnapshotClient;
use cast_common::Result;

use super::{Strategy, WeightQuery};

/// Weight is the number of NFTs held in the descriptor's collection
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceOfNfts;

#[async_trait]
impl Strategy for BalanceOfNfts {
    fn name(&self) -> &'static str {
        "balance-of-nfts"
    }

    async fn raw_weight(&self, chain: &dyn ChainSnapshotClient, query: WeightQuery<'_>) -> Result<Decimal> {
        let count = chain
            .get_nft_count(query.addr, &query.descriptor.contract, query.block_height)
            .await?;
        Ok(Decimal::from(count))
    }
}
