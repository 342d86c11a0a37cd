use async_trait::async_trait;
use rust_decimal::Decimal;

use cast_chain::ChainSnapshotClient;
use cast_common::Result;

use super::{Strategy, WeightQuery};

/// Every address weighs one, regardless of holdings
#[derive(Debug, Clone, Copy, Default)]
pub struct OneAddressOneVote;

#[async_trait]
impl Strategy for OneAddressOneVote {
    fn name(&self) -> &'static str {
        "one-address-one-vote"
    }

    fn uses_threshold(&self) -> bool {
        false
    }

    async fn raw_weight(&self, _chain: &dyn ChainSnapshotClient, _query: WeightQuery<'_>) -> Result<Decimal> {
        Ok(Decimal::ONE)
    }
}
