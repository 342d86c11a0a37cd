use async_trait::async_trait;
use rust_decimal::Decimal;

use cast_chain::ChainSnapshotClient;
use cast_common::{Error, Result};

use super::{Strategy, WeightQuery};

/// Weight is the numeric result of a community-supplied chain script
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomScript;

#[async_trait]
impl Strategy for CustomScript {
    fn name(&self) -> &'static str {
        "custom-script"
    }

    async fn raw_weight(&self, chain: &dyn ChainSnapshotClient, query: WeightQuery<'_>) -> Result<Decimal> {
        let script = query
            .descriptor
            .script
            .as_deref()
            .ok_or_else(|| Error::invalid_request("custom-script strategy has no script"))?;

        Ok(chain
            .execute_script(script, query.addr, &query.descriptor.contract, query.block_height)
            .await?)
    }
}
