use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use cast_common::{
    Achievement, Address, Community, CommunityId, CommunityList, ListType, PageParams, Proposal,
    ProposalId, ProposalStatus, Role, RoleGrant, Vote,
};

use crate::{paginate, GovernanceStore, StorageError, StorageResult};

#[derive(Default)]
struct State {
    communities: HashMap<CommunityId, Community>,
    proposals: HashMap<ProposalId, Proposal>,
    last_proposal_id: ProposalId,
    votes: HashMap<(ProposalId, Address), Vote>,
    /// (proposal, sequence) -> voter
    vote_order: BTreeMap<(ProposalId, u64), Address>,
    last_sequence: u64,
    roles: HashSet<RoleGrant>,
    lists: HashMap<(CommunityId, ListType), CommunityList>,
    achievements: Vec<Achievement>,
}

impl State {
    fn proposal_mut(&mut self, id: ProposalId) -> StorageResult<&mut Proposal> {
        self.proposals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("proposal {}", id)))
    }
}

/// In-memory governance store
///
/// All state sits behind one lock, so every check-and-write runs under a
/// single write guard.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GovernanceStore for MemoryStore {
    async fn put_community(&self, community: Community) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.communities.insert(community.id, community);
        Ok(())
    }

    async fn get_community(&self, id: CommunityId) -> StorageResult<Option<Community>> {
        Ok(self.state.read().await.communities.get(&id).cloned())
    }

    async fn next_proposal_id(&self) -> StorageResult<ProposalId> {
        let mut state = self.state.write().await;
        state.last_proposal_id += 1;
        Ok(state.last_proposal_id)
    }

    async fn put_proposal(&self, proposal: Proposal) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.proposals.insert(proposal.id, proposal);
        Ok(())
    }

    async fn get_proposal(&self, id: ProposalId) -> StorageResult<Option<Proposal>> {
        Ok(self.state.read().await.proposals.get(&id).cloned())
    }

    async fn update_proposal_status(
        &self,
        id: ProposalId,
        expected: ProposalStatus,
        new: ProposalStatus,
    ) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        let proposal = state.proposal_mut(id)?;
        if proposal.status != expected {
            return Ok(false);
        }
        proposal.status = new;
        Ok(true)
    }

    async fn try_mark_achievements_done(&self, id: ProposalId) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        let proposal = state.proposal_mut(id)?;
        if proposal.achievements_done {
            return Ok(false);
        }
        proposal.achievements_done = true;
        Ok(true)
    }

    async fn reset_achievements_done(&self, id: ProposalId) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.proposal_mut(id)?.achievements_done = false;
        Ok(())
    }

    async fn insert_vote(&self, mut vote: Vote) -> StorageResult<Vote> {
        let mut state = self.state.write().await;
        let key = (vote.proposal_id, vote.addr.clone());
        if state.votes.contains_key(&key) {
            return Err(StorageError::UniqueViolation {
                proposal_id: vote.proposal_id,
                addr: vote.addr,
            });
        }

        state.last_sequence += 1;
        vote.sequence = state.last_sequence;
        state
            .vote_order
            .insert((vote.proposal_id, vote.sequence), vote.addr.clone());
        state.votes.insert(key, vote.clone());

        debug!("Stored vote {} on proposal {}", vote.sequence, vote.proposal_id);
        Ok(vote)
    }

    async fn get_vote(&self, proposal_id: ProposalId, addr: &Address) -> StorageResult<Option<Vote>> {
        let state = self.state.read().await;
        Ok(state.votes.get(&(proposal_id, addr.clone())).cloned())
    }

    async fn list_votes(
        &self,
        proposal_id: ProposalId,
        page: &PageParams,
    ) -> StorageResult<(Vec<Vote>, u64)> {
        let votes = self.all_votes(proposal_id).await?;
        Ok(paginate(votes, page))
    }

    async fn all_votes(&self, proposal_id: ProposalId) -> StorageResult<Vec<Vote>> {
        let state = self.state.read().await;
        Ok(state
            .vote_order
            .range((proposal_id, 0)..=(proposal_id, u64::MAX))
            .filter_map(|(_, addr)| state.votes.get(&(proposal_id, addr.clone())).cloned())
            .collect())
    }

    async fn votes_for_address(
        &self,
        addr: &Address,
        proposal_ids: &[ProposalId],
        page: &PageParams,
    ) -> StorageResult<(Vec<Vote>, u64)> {
        let state = self.state.read().await;
        let mut votes: Vec<Vote> = state
            .votes
            .values()
            .filter(|v| &v.addr == addr)
            .filter(|v| proposal_ids.is_empty() || proposal_ids.contains(&v.proposal_id))
            .cloned()
            .collect();
        votes.sort_by_key(|v| v.sequence);
        Ok(paginate(votes, page))
    }

    async fn grant_role(&self, grant: RoleGrant) -> StorageResult<()> {
        self.state.write().await.roles.insert(grant);
        Ok(())
    }

    async fn revoke_role(&self, grant: &RoleGrant) -> StorageResult<()> {
        self.state.write().await.roles.remove(grant);
        Ok(())
    }

    async fn roles_for(&self, community_id: CommunityId, addr: &Address) -> StorageResult<Vec<Role>> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .iter()
            .filter(|g| g.community_id == community_id && &g.addr == addr)
            .map(|g| g.role)
            .collect())
    }

    async fn put_community_list(&self, list: CommunityList) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.lists.insert((list.community_id, list.list_type), list);
        Ok(())
    }

    async fn get_community_list(
        &self,
        community_id: CommunityId,
        list_type: ListType,
    ) -> StorageResult<Option<CommunityList>> {
        let state = self.state.read().await;
        Ok(state.lists.get(&(community_id, list_type)).cloned())
    }

    async fn insert_achievements(&self, achievements: Vec<Achievement>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        for achievement in achievements {
            let exists = state.achievements.iter().any(|a| {
                a.addr == achievement.addr
                    && a.proposal_id == achievement.proposal_id
                    && a.kind == achievement.kind
            });
            if !exists {
                state.achievements.push(achievement);
            }
        }
        Ok(())
    }

    async fn achievements_for_address(&self, addr: &Address) -> StorageResult<Vec<Achievement>> {
        let state = self.state.read().await;
        Ok(state
            .achievements
            .iter()
            .filter(|a| &a.addr == addr)
            .cloned()
            .collect())
    }
}
