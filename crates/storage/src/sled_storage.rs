//! sled-backed governance store
//!
//! Values are JSON. Keys are big-endian ids concatenated with normalized
//! addresses, which have a fixed width, so prefix scans never straddle two
//! records.

use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Batch, Db, IVec, Transactional, Tree};
use tracing::{debug, info};

use cast_common::{
    Achievement, Address, Community, CommunityId, CommunityList, ListType, Order, PageParams,
    Proposal, ProposalId, ProposalStatus, Role, RoleGrant, Vote,
};

use crate::{GovernanceStore, StorageError, StorageResult};

/// Governance store on an embedded sled database
pub struct SledStore {
    db: Db,
    communities: Tree,
    proposals: Tree,
    /// proposal ++ address -> vote
    votes: Tree,
    /// proposal ++ sequence -> vote key
    vote_order: Tree,
    /// address ++ proposal -> vote key
    votes_by_addr: Tree,
    /// community ++ address ++ role -> role
    roles: Tree,
    /// community ++ list type -> list
    lists: Tree,
    /// address ++ proposal ++ kind -> achievement
    achievements: Tree,
}

impl SledStore {
    /// Open or create a store under `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        info!("Opening sled store at {}", path.display());
        Self::from_db(sled::open(path)?)
    }

    /// A store that is deleted when dropped
    pub fn temporary() -> StorageResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        Ok(Self {
            communities: db.open_tree("communities")?,
            proposals: db.open_tree("proposals")?,
            votes: db.open_tree("votes")?,
            vote_order: db.open_tree("vote_order")?,
            votes_by_addr: db.open_tree("votes_by_addr")?,
            roles: db.open_tree("roles")?,
            lists: db.open_tree("lists")?,
            achievements: db.open_tree("achievements")?,
            db,
        })
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> StorageResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    /// Read-modify-write a proposal with compare-and-swap, retrying on
    /// concurrent writers. `apply` returns false to leave the record untouched.
    fn update_proposal<F>(&self, id: ProposalId, mut apply: F) -> StorageResult<bool>
    where
        F: FnMut(&mut Proposal) -> bool,
    {
        let key = id.to_be_bytes();
        loop {
            let current = self
                .proposals
                .get(key)?
                .ok_or_else(|| StorageError::NotFound(format!("proposal {}", id)))?;
            let mut proposal: Proposal = decode(&current)?;
            if !apply(&mut proposal) {
                return Ok(false);
            }

            let updated = serde_json::to_vec(&proposal)?;
            if self
                .proposals
                .compare_and_swap(key, Some(current), Some(updated))?
                .is_ok()
            {
                return Ok(true);
            }
            debug!("Proposal {} changed concurrently, retrying", id);
        }
    }

    fn load_votes(&self, keys: impl IntoIterator<Item = IVec>) -> StorageResult<Vec<Vote>> {
        let mut votes = Vec::new();
        for key in keys {
            if let Some(bytes) = self.votes.get(&key)? {
                votes.push(decode(&bytes)?);
            }
        }
        Ok(votes)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn join(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

fn vote_key(proposal_id: ProposalId, addr: &Address) -> Vec<u8> {
    join(&[&proposal_id.to_be_bytes(), addr.as_str().as_bytes()])
}

fn role_prefix(community_id: CommunityId, addr: &Address) -> Vec<u8> {
    join(&[&community_id.to_be_bytes(), addr.as_str().as_bytes()])
}

fn role_key(grant: &RoleGrant) -> Vec<u8> {
    join(&[
        &role_prefix(grant.community_id, &grant.addr),
        grant.role.as_str().as_bytes(),
    ])
}

fn list_key(community_id: CommunityId, list_type: ListType) -> Vec<u8> {
    let tag = match list_type {
        ListType::Allow => 0u8,
        ListType::Block => 1u8,
    };
    join(&[&community_id.to_be_bytes(), &[tag]])
}

#[async_trait]
impl GovernanceStore for SledStore {
    async fn put_community(&self, community: Community) -> StorageResult<()> {
        self.communities
            .insert(community.id.to_be_bytes(), encode(&community)?)?;
        Ok(())
    }

    async fn get_community(&self, id: CommunityId) -> StorageResult<Option<Community>> {
        self.communities
            .get(id.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn next_proposal_id(&self) -> StorageResult<ProposalId> {
        // generate_id starts at zero
        Ok(self.db.generate_id()? + 1)
    }

    async fn put_proposal(&self, proposal: Proposal) -> StorageResult<()> {
        self.proposals
            .insert(proposal.id.to_be_bytes(), encode(&proposal)?)?;
        Ok(())
    }

    async fn get_proposal(&self, id: ProposalId) -> StorageResult<Option<Proposal>> {
        self.proposals
            .get(id.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn update_proposal_status(
        &self,
        id: ProposalId,
        expected: ProposalStatus,
        new: ProposalStatus,
    ) -> StorageResult<bool> {
        self.update_proposal(id, |proposal| {
            if proposal.status != expected {
                return false;
            }
            proposal.status = new;
            true
        })
    }

    async fn try_mark_achievements_done(&self, id: ProposalId) -> StorageResult<bool> {
        self.update_proposal(id, |proposal| {
            if proposal.achievements_done {
                return false;
            }
            proposal.achievements_done = true;
            true
        })
    }

    async fn reset_achievements_done(&self, id: ProposalId) -> StorageResult<()> {
        self.update_proposal(id, |proposal| {
            proposal.achievements_done = false;
            true
        })?;
        Ok(())
    }

    async fn insert_vote(&self, mut vote: Vote) -> StorageResult<Vote> {
        vote.sequence = self.db.generate_id()?;
        let key = vote_key(vote.proposal_id, &vote.addr);
        let order_key = join(&[&vote.proposal_id.to_be_bytes(), &vote.sequence.to_be_bytes()]);
        let addr_key = join(&[vote.addr.as_str().as_bytes(), &vote.proposal_id.to_be_bytes()]);
        let value = encode(&vote)?;

        let result: TransactionResult<(), ()> = (&self.votes, &self.vote_order, &self.votes_by_addr)
            .transaction(|(votes, order, by_addr)| {
                if votes.get(key.as_slice())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                votes.insert(key.as_slice(), value.as_slice())?;
                order.insert(order_key.as_slice(), key.as_slice())?;
                by_addr.insert(addr_key.as_slice(), key.as_slice())?;
                Ok(())
            });

        match result {
            Ok(()) => {
                debug!("Stored vote {} on proposal {}", vote.sequence, vote.proposal_id);
                Ok(vote)
            }
            Err(TransactionError::Abort(())) => Err(StorageError::UniqueViolation {
                proposal_id: vote.proposal_id,
                addr: vote.addr,
            }),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    async fn get_vote(&self, proposal_id: ProposalId, addr: &Address) -> StorageResult<Option<Vote>> {
        self.votes
            .get(vote_key(proposal_id, addr))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn list_votes(
        &self,
        proposal_id: ProposalId,
        page: &PageParams,
    ) -> StorageResult<(Vec<Vote>, u64)> {
        let mut keys = self
            .vote_order
            .scan_prefix(proposal_id.to_be_bytes())
            .values()
            .collect::<Result<Vec<_>, _>>()?;
        let total = keys.len() as u64;
        if page.order == Order::Desc {
            keys.reverse();
        }

        let window = keys
            .into_iter()
            .skip(page.start as usize)
            .take(page.count as usize);
        Ok((self.load_votes(window)?, total))
    }

    async fn all_votes(&self, proposal_id: ProposalId) -> StorageResult<Vec<Vote>> {
        let keys = self
            .vote_order
            .scan_prefix(proposal_id.to_be_bytes())
            .values()
            .collect::<Result<Vec<_>, _>>()?;
        self.load_votes(keys)
    }

    async fn votes_for_address(
        &self,
        addr: &Address,
        proposal_ids: &[ProposalId],
        page: &PageParams,
    ) -> StorageResult<(Vec<Vote>, u64)> {
        let keys = self
            .votes_by_addr
            .scan_prefix(addr.as_str().as_bytes())
            .values()
            .collect::<Result<Vec<_>, _>>()?;
        let mut votes: Vec<Vote> = self
            .load_votes(keys)?
            .into_iter()
            .filter(|v| proposal_ids.is_empty() || proposal_ids.contains(&v.proposal_id))
            .collect();
        votes.sort_by_key(|v| v.sequence);
        Ok(crate::paginate(votes, page))
    }

    async fn grant_role(&self, grant: RoleGrant) -> StorageResult<()> {
        self.roles.insert(role_key(&grant), encode(&grant.role)?)?;
        Ok(())
    }

    async fn revoke_role(&self, grant: &RoleGrant) -> StorageResult<()> {
        self.roles.remove(role_key(grant))?;
        Ok(())
    }

    async fn roles_for(&self, community_id: CommunityId, addr: &Address) -> StorageResult<Vec<Role>> {
        self.roles
            .scan_prefix(role_prefix(community_id, addr))
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }

    async fn put_community_list(&self, list: CommunityList) -> StorageResult<()> {
        self.lists
            .insert(list_key(list.community_id, list.list_type), encode(&list)?)?;
        Ok(())
    }

    async fn get_community_list(
        &self,
        community_id: CommunityId,
        list_type: ListType,
    ) -> StorageResult<Option<CommunityList>> {
        self.lists
            .get(list_key(community_id, list_type))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn insert_achievements(&self, achievements: Vec<Achievement>) -> StorageResult<()> {
        let mut batch = Batch::default();
        for achievement in &achievements {
            let key = join(&[
                achievement.addr.as_str().as_bytes(),
                &achievement.proposal_id.to_be_bytes(),
                &encode(&achievement.kind)?,
            ]);
            batch.insert(key, encode(achievement)?);
        }
        self.achievements.apply_batch(batch)?;
        Ok(())
    }

    async fn achievements_for_address(&self, addr: &Address) -> StorageResult<Vec<Achievement>> {
        self.achievements
            .scan_prefix(addr.as_str().as_bytes())
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }
}
