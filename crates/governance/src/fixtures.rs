//! Shared test fixtures

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use cast_chain::MemoryChain;
use cast_common::{
    Achievement, Address, AuthProof, CastConfig, Community, CommunityId, CommunityList,
    ContractParams, ListType, ManualClock, PageParams, Proposal, ProposalId, ProposalStatus, Role,
    RoleGrant, StrategyDescriptor, Vote,
};
use cast_storage::{GovernanceStore, MemoryStore, StorageError, StorageResult};

use crate::service::GovernanceService;

pub const START_SECS: u64 = 1_700_000_000;
pub const END_SECS: u64 = START_SECS + 7 * 24 * 3600;
/// One hour into the voting window
pub const NOW_MS: u64 = (START_SECS + 3600) * 1000;
pub const HEIGHT: u64 = 100;

pub fn addr(n: u64) -> Address {
    Address::parse(&format!("0x{:x}", n)).unwrap()
}

pub fn community(id: CommunityId) -> Community {
    let flow = ContractParams {
        name: Some("FlowToken".into()),
        addr: Some(Address::parse("0x7e60df042a9c0868").unwrap()),
        public_path: Some("flowTokenBalance".into()),
        threshold: None,
        max_weight: None,
    };
    Community {
        id,
        name: "Flow Community".into(),
        strategies: vec![
            StrategyDescriptor::new("one-address-one-vote"),
            StrategyDescriptor::new("token-weighted-default").with_contract(flow.clone()),
            StrategyDescriptor::new("staked-token-weighted-default").with_contract(flow),
            StrategyDescriptor::new("balance-of-nfts"),
        ],
        only_authors_to_submit: true,
        proposal_threshold: None,
        proposal_validation_strategy: None,
    }
}

pub fn proposal(id: ProposalId) -> Proposal {
    Proposal {
        id,
        community_id: 1,
        name: format!("Proposal {}", id),
        body: None,
        choices: vec!["yes".into(), "no".into()],
        strategy: StrategyDescriptor::new("one-address-one-vote"),
        creator_addr: addr(1),
        start_time: START_SECS,
        end_time: END_SECS,
        status: ProposalStatus::Published,
        block_height: HEIGHT,
        achievements_done: false,
        voter_role: None,
        created_at: START_SECS,
    }
}

pub fn stored_vote(proposal_id: ProposalId, voter: u64, choice: &str) -> Vote {
    Vote {
        proposal_id,
        addr: addr(voter),
        choice: choice.to_string(),
        weight: Decimal::ONE,
        created_at: START_SECS,
        sequence: 0,
        proof: AuthProof::Signatures { timestamp: NOW_MS, composite_signatures: vec![] },
    }
}

/// A full service over a memory store, memory chain and manual clock
pub struct Harness {
    pub service: GovernanceService,
    pub store: Arc<dyn GovernanceStore>,
    pub chain: MemoryChain,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(store: Arc<dyn GovernanceStore>) -> Self {
        let chain = MemoryChain::new();
        chain.set_latest_height(HEIGHT).await;
        let clock = Arc::new(ManualClock::new(NOW_MS));
        store.put_community(community(1)).await.unwrap();

        let service = GovernanceService::new(
            CastConfig::default(),
            store.clone(),
            Arc::new(chain.clone()),
            clock.clone(),
        )
        .unwrap();

        Self { service, store, chain, clock }
    }

    /// Store an open proposal voting with `strategy`
    pub async fn publish(&self, strategy: StrategyDescriptor) -> Proposal {
        let mut proposal = proposal(self.store.next_proposal_id().await.unwrap());
        proposal.strategy = strategy;
        self.store.put_proposal(proposal.clone()).await.unwrap();
        proposal
    }
}

impl Deref for Harness {
    type Target = GovernanceService;

    fn deref(&self) -> &GovernanceService {
        &self.service
    }
}

/// A memory store whose achievement inserts can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_achievements: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_achievements(&self, fail: bool) {
        self.fail_achievements.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GovernanceStore for FlakyStore {
    async fn put_community(&self, community: Community) -> StorageResult<()> {
        self.inner.put_community(community).await
    }

    async fn get_community(&self, id: CommunityId) -> StorageResult<Option<Community>> {
        self.inner.get_community(id).await
    }

    async fn next_proposal_id(&self) -> StorageResult<ProposalId> {
        self.inner.next_proposal_id().await
    }

    async fn put_proposal(&self, proposal: Proposal) -> StorageResult<()> {
        self.inner.put_proposal(proposal).await
    }

    async fn get_proposal(&self, id: ProposalId) -> StorageResult<Option<Proposal>> {
        self.inner.get_proposal(id).await
    }

    async fn update_proposal_status(
        &self,
        id: ProposalId,
        expected: ProposalStatus,
        new: ProposalStatus,
    ) -> StorageResult<bool> {
        self.inner.update_proposal_status(id, expected, new).await
    }

    async fn try_mark_achievements_done(&self, id: ProposalId) -> StorageResult<bool> {
        self.inner.try_mark_achievements_done(id).await
    }

    async fn reset_achievements_done(&self, id: ProposalId) -> StorageResult<()> {
        self.inner.reset_achievements_done(id).await
    }

    async fn insert_vote(&self, vote: Vote) -> StorageResult<Vote> {
        self.inner.insert_vote(vote).await
    }

    async fn get_vote(&self, proposal_id: ProposalId, addr: &Address) -> StorageResult<Option<Vote>> {
        self.inner.get_vote(proposal_id, addr).await
    }

    async fn list_votes(
        &self,
        proposal_id: ProposalId,
        page: &PageParams,
    ) -> StorageResult<(Vec<Vote>, u64)> {
        self.inner.list_votes(proposal_id, page).await
    }

    async fn all_votes(&self, proposal_id: ProposalId) -> StorageResult<Vec<Vote>> {
        self.inner.all_votes(proposal_id).await
    }

    async fn votes_for_address(
        &self,
        addr: &Address,
        proposal_ids: &[ProposalId],
        page: &PageParams,
    ) -> StorageResult<(Vec<Vote>, u64)> {
        self.inner.votes_for_address(addr, proposal_ids, page).await
    }

    async fn grant_role(&self, grant: RoleGrant) -> StorageResult<()> {
        self.inner.grant_role(grant).await
    }

    async fn revoke_role(&self, grant: &RoleGrant) -> StorageResult<()> {
        self.inner.revoke_role(grant).await
    }

    async fn roles_for(&self, community_id: CommunityId, addr: &Address) -> StorageResult<Vec<Role>> {
        self.inner.roles_for(community_id, addr).await
    }

    async fn put_community_list(&self, list: CommunityList) -> StorageResult<()> {
        self.inner.put_community_list(list).await
    }

    async fn get_community_list(
        &self,
        community_id: CommunityId,
        list_type: ListType,
    ) -> StorageResult<Option<CommunityList>> {
        self.inner.get_community_list(community_id, list_type).await
    }

    async fn insert_achievements(&self, achievements: Vec<Achievement>) -> StorageResult<()> {
        if self.fail_achievements.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("achievements table unavailable".into()));
        }
        self.inner.insert_achievements(achievements).await
    }

    async fn achievements_for_address(&self, addr: &Address) -> StorageResult<Vec<Achievement>> {
        self.inner.achievements_for_address(addr).await
    }
}
