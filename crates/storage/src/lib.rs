//! Storage for CAST
//!
//! This crate provides the persistence seam for governance state:
//! - Communities and proposals, with conditional status updates
//! - Votes, unique per (proposal, address) and ordered by insertion
//! - Role grants and community address lists
//! - Achievements and the once-only achievements flag
//!
//! Two implementations are provided, an in-memory store and a sled-backed
//! store for single-node deployments.

use async_trait::async_trait;
use thiserror::Error;

use cast_common::{
    Achievement, Address, Community, CommunityId, CommunityList, ListType, PageParams, Proposal,
    ProposalId, ProposalStatus, Role, RoleGrant, Vote,
};

pub mod memory_storage;
pub mod sled_storage;

pub use memory_storage::MemoryStore;
pub use sled_storage::SledStore;

/// Storage-related errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Address {addr} already voted on proposal {proposal_id}")]
    UniqueViolation { proposal_id: ProposalId, addr: Address },

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<StorageError> for cast_common::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UniqueViolation { proposal_id, addr } => cast_common::Error::AlreadyVoted {
                addr: addr.to_string(),
                proposal_id,
            },
            other => cast_common::Error::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence operations for governance state
///
/// Every method is atomic with respect to the others. Vote uniqueness and the
/// proposal flags are enforced here, not by callers.
#[async_trait]
pub trait GovernanceStore: Send + Sync + 'static {
    async fn put_community(&self, community: Community) -> StorageResult<()>;

    async fn get_community(&self, id: CommunityId) -> StorageResult<Option<Community>>;

    /// Allocate a fresh proposal id
    async fn next_proposal_id(&self) -> StorageResult<ProposalId>;

    async fn put_proposal(&self, proposal: Proposal) -> StorageResult<()>;

    async fn get_proposal(&self, id: ProposalId) -> StorageResult<Option<Proposal>>;

    /// Set the status to `new` only if it is currently `expected`.
    /// Returns whether the update happened.
    async fn update_proposal_status(
        &self,
        id: ProposalId,
        expected: ProposalStatus,
        new: ProposalStatus,
    ) -> StorageResult<bool>;

    /// Flip `achievements_done` from false to true. Exactly one caller wins.
    async fn try_mark_achievements_done(&self, id: ProposalId) -> StorageResult<bool>;

    /// Flip `achievements_done` back to false
    async fn reset_achievements_done(&self, id: ProposalId) -> StorageResult<()>;

    /// Insert a vote, assigning its sequence number.
    /// Fails with [`StorageError::UniqueViolation`] if the address already voted.
    async fn insert_vote(&self, vote: Vote) -> StorageResult<Vote>;

    async fn get_vote(&self, proposal_id: ProposalId, addr: &Address) -> StorageResult<Option<Vote>>;

    /// A page of votes in insertion order, and the total vote count
    async fn list_votes(
        &self,
        proposal_id: ProposalId,
        page: &PageParams,
    ) -> StorageResult<(Vec<Vote>, u64)>;

    /// Every vote on a proposal, in insertion order
    async fn all_votes(&self, proposal_id: ProposalId) -> StorageResult<Vec<Vote>>;

    /// A page of votes cast by `addr`, restricted to `proposal_ids` unless empty
    async fn votes_for_address(
        &self,
        addr: &Address,
        proposal_ids: &[ProposalId],
        page: &PageParams,
    ) -> StorageResult<(Vec<Vote>, u64)>;

    async fn grant_role(&self, grant: RoleGrant) -> StorageResult<()>;

    async fn revoke_role(&self, grant: &RoleGrant) -> StorageResult<()>;

    async fn roles_for(&self, community_id: CommunityId, addr: &Address) -> StorageResult<Vec<Role>>;

    async fn put_community_list(&self, list: CommunityList) -> StorageResult<()>;

    async fn get_community_list(
        &self,
        community_id: CommunityId,
        list_type: ListType,
    ) -> StorageResult<Option<CommunityList>>;

    /// Insert achievements; inserting one already recorded is a no-op
    async fn insert_achievements(&self, achievements: Vec<Achievement>) -> StorageResult<()>;

    async fn achievements_for_address(&self, addr: &Address) -> StorageResult<Vec<Achievement>>;
}

/// Apply pagination to votes already sorted ascending by sequence
pub(crate) fn paginate(mut votes: Vec<Vote>, page: &PageParams) -> (Vec<Vote>, u64) {
    let total = votes.len() as u64;
    if page.order == cast_common::Order::Desc {
        votes.reverse();
    }
    let data = votes
        .into_iter()
        .skip(page.start as usize)
        .take(page.count as usize)
        .collect();
    (data, total)
}
