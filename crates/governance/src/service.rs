//! Component wiring

use std::sync::Arc;

use tracing::{debug, info};

use cast_chain::{ChainSnapshotClient, TimeoutChainClient};
use cast_common::{logging, CastConfig, Clock, Configuration, Error, Order, PageParams, Result, SystemClock};
use cast_identity::IdentityVerifier;
use cast_storage::{GovernanceStore, SledStore};

use crate::ledger::VoteLedger;
use crate::manager::ProposalManager;
use crate::roles::{AccessLists, RoleAuthorizer};
use crate::strategy::StrategyEngine;

/// File name of the embedded database under the data directory
const DB_DIR: &str = "cast.db";

/// Every governance component, built from one configuration and sharing one
/// store, chain client and clock
pub struct GovernanceService {
    pub ledger: VoteLedger,
    pub proposals: ProposalManager,
    pub authorizer: Arc<RoleAuthorizer>,
    pub engine: Arc<StrategyEngine>,
    store: Arc<dyn GovernanceStore>,
    config: CastConfig,
}

impl GovernanceService {
    pub fn new(
        config: CastConfig,
        store: Arc<dyn GovernanceStore>,
        chain: Arc<dyn ChainSnapshotClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::invalid_request(e.to_string()))?;

        let chain: Arc<dyn ChainSnapshotClient> =
            Arc::new(TimeoutChainClient::new(chain, config.chain.timeout()));
        let verifier = Arc::new(IdentityVerifier::new(&config.identity, chain.clone(), clock.clone()));
        let authorizer = Arc::new(RoleAuthorizer::new(
            store.clone(),
            AccessLists::from_config(&config.access)?,
        ));
        let engine = Arc::new(StrategyEngine::new(chain.clone()));

        let ledger = VoteLedger::new(
            store.clone(),
            verifier.clone(),
            authorizer.clone(),
            engine.clone(),
            clock.clone(),
            config.chain.max_concurrent_queries,
        );
        let proposals = ProposalManager::new(
            store.clone(),
            chain,
            verifier,
            authorizer.clone(),
            engine.clone(),
            clock,
        );

        Ok(Self {
            ledger,
            proposals,
            authorizer,
            engine,
            store,
            config,
        })
    }

    /// A service on a sled store under the configured data directory
    pub fn open(config: CastConfig, chain: Arc<dyn ChainSnapshotClient>) -> Result<Self> {
        // A subscriber installed by the embedding application stays in place
        if let Err(e) = logging::init_tracing(&config.log_level) {
            debug!("Keeping existing tracing subscriber: {}", e);
        }
        config
            .ensure_directories()
            .map_err(|e| Error::Storage(e.to_string()))?;
        let store = SledStore::open(config.data_dir.join(DB_DIR))?;
        info!(
            "Governance service starting in {} mode",
            config.environment
        );
        Self::new(config, Arc::new(store), chain, Arc::new(SystemClock))
    }

    pub fn store(&self) -> &Arc<dyn GovernanceStore> {
        &self.store
    }

    pub fn config(&self) -> &CastConfig {
        &self.config
    }

    /// Clamp raw pagination input to the configured page size
    pub fn page_params(&self, start: i64, count: i64, order: Order) -> PageParams {
        PageParams::clamped(start, count, order, self.config.max_page_count)
    }
}
