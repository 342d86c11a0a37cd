//! Proposal lifecycle
//!
//! Creating a proposal freezes the community strategy it votes with and the
//! block height its weights are read at. Afterwards the only transition a
//! client may request is cancellation by an author.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cast_chain::ChainSnapshotClient;
use cast_common::{
    Address, AuthProof, Clock, CommunityId, ComputedStatus, Error, Proposal, ProposalId,
    ProposalStatus, Result, Role, SnapshotHeight, VoucherAction,
};
use cast_identity::{message, IdentityVerifier};
use cast_storage::GovernanceStore;

use crate::roles::RoleAuthorizer;
use crate::strategy::StrategyEngine;

/// A proposal as submitted, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub community_id: CommunityId,
    pub name: String,
    pub body: Option<String>,
    pub choices: Vec<String>,
    /// Name of one of the community's strategies
    pub strategy: String,
    pub creator_addr: Address,
    pub start_time: u64,
    pub end_time: u64,
    #[serde(default)]
    pub block_height: SnapshotHeight,
    #[serde(default)]
    pub voter_role: Option<Role>,
}

impl ProposalDraft {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_request("proposal name is required"));
        }
        if self.choices.is_empty() {
            return Err(Error::invalid_request("proposal needs at least one choice"));
        }
        for (i, choice) in self.choices.iter().enumerate() {
            if choice.trim().is_empty() || self.choices[..i].contains(choice) {
                return Err(Error::invalid_request(format!("invalid choice: {:?}", choice)));
            }
        }
        if self.end_time <= self.start_time {
            return Err(Error::invalid_request("end_time must be after start_time"));
        }
        Ok(())
    }
}

pub struct ProposalManager {
    store: Arc<dyn GovernanceStore>,
    chain: Arc<dyn ChainSnapshotClient>,
    verifier: Arc<IdentityVerifier>,
    authorizer: Arc<RoleAuthorizer>,
    engine: Arc<StrategyEngine>,
    clock: Arc<dyn Clock>,
}

impl ProposalManager {
    pub fn new(
        store: Arc<dyn GovernanceStore>,
        chain: Arc<dyn ChainSnapshotClient>,
        verifier: Arc<IdentityVerifier>,
        authorizer: Arc<RoleAuthorizer>,
        engine: Arc<StrategyEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            chain,
            verifier,
            authorizer,
            engine,
            clock,
        }
    }

    async fn load(&self, id: ProposalId) -> Result<Proposal> {
        self.store
            .get_proposal(id)
            .await?
            .ok_or(Error::ProposalNotFound(id))
    }

    /// Validate, authorize and persist a new proposal
    pub async fn create_proposal(&self, draft: ProposalDraft, proof: AuthProof) -> Result<Proposal> {
        draft.validate()?;
        let community = self
            .store
            .get_community(draft.community_id)
            .await?
            .ok_or(Error::CommunityNotFound(draft.community_id))?;

        let verification = self
            .verifier
            .verify_proof(
                &draft.creator_addr,
                &proof,
                message::timestamp_message,
                &VoucherAction::ActAs { community_id: community.id, role: Role::Author },
            )
            .await?;
        self.authorizer
            .ensure_not_blocked(&draft.creator_addr, community.id)
            .await?;

        if community.only_authors_to_submit {
            self.authorizer
                .authorize(verification.actor(), community.id, Role::Author)
                .await?;
        } else if let Some(threshold) = community.proposal_threshold {
            let name = community
                .proposal_validation_strategy
                .as_deref()
                .or_else(|| community.strategies.first().map(|s| s.name.as_str()))
                .ok_or_else(|| Error::StrategyNotFound("proposal validation".into()))?;
            let descriptor = community
                .strategy(name)
                .ok_or_else(|| Error::StrategyNotFound(name.to_string()))?;

            let latest = self.chain.latest_block_height().await?;
            let weight = self
                .engine
                .compute_weight(descriptor, &draft.creator_addr, latest)
                .await?;
            if weight < threshold {
                warn!(
                    "{} holds {} of the {} needed to submit to community {}",
                    draft.creator_addr, weight, threshold, community.id
                );
                return Err(Error::InsufficientBalance {
                    required: threshold,
                    token: descriptor.contract.token_name().to_string(),
                });
            }
        }

        let strategy = community
            .strategy(&draft.strategy)
            .filter(|s| self.engine.contains(&s.name))
            .cloned()
            .ok_or_else(|| Error::StrategyNotFound(draft.strategy.clone()))?;

        let block_height = match draft.block_height {
            SnapshotHeight::Latest => self.chain.latest_block_height().await?,
            SnapshotHeight::At(height) => height,
        };

        let proposal = Proposal {
            id: self.store.next_proposal_id().await?,
            community_id: community.id,
            name: draft.name,
            body: draft.body,
            choices: draft.choices,
            strategy,
            creator_addr: draft.creator_addr,
            start_time: draft.start_time,
            end_time: draft.end_time,
            status: ProposalStatus::Published,
            block_height,
            achievements_done: false,
            voter_role: draft.voter_role,
            created_at: self.clock.now_secs(),
        };
        self.store.put_proposal(proposal.clone()).await?;

        info!(
            "Proposal {} created in community {} at height {}",
            proposal.id, proposal.community_id, proposal.block_height
        );
        Ok(proposal)
    }

    /// Cancel a proposal on behalf of an author
    pub async fn update_proposal_status(
        &self,
        id: ProposalId,
        requested: ProposalStatus,
        signing_addr: &Address,
        proof: AuthProof,
    ) -> Result<Proposal> {
        if requested != ProposalStatus::Cancelled {
            return Err(Error::invalid_request(format!(
                "cannot move a proposal to {:?}",
                requested
            )));
        }

        let proposal = self.load(id).await?;
        if matches!(
            proposal.computed_status(self.clock.now_secs()),
            ComputedStatus::Cancelled | ComputedStatus::Closed
        ) {
            return Err(Error::InactiveProposal(id));
        }

        let verification = self
            .verifier
            .verify_proof(
                signing_addr,
                &proof,
                message::timestamp_message,
                &VoucherAction::ActAs { community_id: proposal.community_id, role: Role::Author },
            )
            .await?;
        self.authorizer
            .authorize(verification.actor(), proposal.community_id, Role::Author)
            .await?;

        if !self
            .store
            .update_proposal_status(id, ProposalStatus::Published, requested)
            .await?
        {
            return Err(Error::InactiveProposal(id));
        }

        info!("Proposal {} cancelled by {}", id, verification.actor());
        self.load(id).await
    }

    /// A proposal whose frozen strategy is still usable
    pub async fn get_proposal(&self, id: ProposalId) -> Result<Proposal> {
        let proposal = self.load(id).await?;
        let community = self
            .store
            .get_community(proposal.community_id)
            .await?
            .ok_or(Error::CommunityNotFound(proposal.community_id))?;

        let name = &proposal.strategy.name;
        if community.strategy(name).is_none() || !self.engine.contains(name) {
            return Err(Error::StrategyNotFound(name.clone()));
        }
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Harness, END_SECS, HEIGHT, NOW_MS, START_SECS};
    use cast_common::RoleGrant;
    use cast_identity::testing::TestAccount;
    use rust_decimal::Decimal;

    fn draft(creator: &Address, strategy: &str) -> ProposalDraft {
        ProposalDraft {
            community_id: 1,
            name: "Fund the treasury".into(),
            body: Some("Move 100 FLOW".into()),
            choices: vec!["yes".into(), "no".into()],
            strategy: strategy.into(),
            creator_addr: creator.clone(),
            start_time: START_SECS,
            end_time: END_SECS,
            block_height: SnapshotHeight::Latest,
            voter_role: None,
        }
    }

    async fn author(h: &Harness, addr: &str) -> TestAccount {
        let account = TestAccount::single(addr);
        account.register(&h.chain).await;
        h.store
            .grant_role(RoleGrant { community_id: 1, addr: account.address.clone(), role: Role::Author })
            .await
            .unwrap();
        account
    }

    #[tokio::test]
    async fn test_author_creates_proposal() {
        let h = Harness::new().await;
        let alice = author(&h, "0x01").await;

        let proposal = h
            .proposals
            .create_proposal(draft(&alice.address, "one-address-one-vote"), alice.timestamp_proof(NOW_MS))
            .await
            .unwrap();
        assert_eq!(proposal.status, ProposalStatus::Published);
        assert_eq!(proposal.block_height, HEIGHT);
        assert_eq!(proposal.strategy.name, "one-address-one-vote");
        assert_eq!(h.proposals.get_proposal(proposal.id).await.unwrap(), proposal);

        let mut pinned = draft(&alice.address, "token-weighted-default");
        pinned.block_height = SnapshotHeight::At(7);
        let proposal = h
            .proposals
            .create_proposal(pinned, alice.timestamp_proof(NOW_MS))
            .await
            .unwrap();
        assert_eq!(proposal.block_height, 7);
    }

    #[tokio::test]
    async fn test_non_author_rejected_when_authors_only() {
        let h = Harness::new().await;
        let bob = TestAccount::single("0x02");
        bob.register(&h.chain).await;

        assert!(matches!(
            h.proposals
                .create_proposal(draft(&bob.address, "one-address-one-vote"), bob.timestamp_proof(NOW_MS))
                .await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_voucher_from_non_author_is_forbidden() {
        let h = Harness::new().await;
        let alice = author(&h, "0x01").await;
        let helper = TestAccount::single("0x03");
        helper.register(&h.chain).await;

        let voucher = helper.voucher(
            &alice.address,
            VoucherAction::ActAs { community_id: 1, role: Role::Author },
            NOW_MS,
        );
        assert!(matches!(
            h.proposals
                .create_proposal(draft(&alice.address, "one-address-one-vote"), AuthProof::Voucher(voucher))
                .await,
            Err(Error::Forbidden(_))
        ));

        // The same voucher from an author is accepted
        let co_author = author(&h, "0x04").await;
        let voucher = co_author.voucher(
            &alice.address,
            VoucherAction::ActAs { community_id: 1, role: Role::Author },
            NOW_MS,
        );
        let proposal = h
            .proposals
            .create_proposal(draft(&alice.address, "one-address-one-vote"), AuthProof::Voucher(voucher))
            .await
            .unwrap();
        assert_eq!(proposal.creator_addr, alice.address);
    }

    #[tokio::test]
    async fn test_open_submission_requires_threshold() {
        let h = Harness::new().await;
        let mut community = h.store.get_community(1).await.unwrap().unwrap();
        community.only_authors_to_submit = false;
        community.proposal_threshold = Some(Decimal::from(100));
        community.proposal_validation_strategy = Some("token-weighted-default".into());
        h.store.put_community(community.clone()).await.unwrap();
        let contract = community.strategy("token-weighted-default").unwrap().contract.clone();

        let carol = TestAccount::single("0x05");
        carol.register(&h.chain).await;
        h.chain.set_balance(&carol.address, &contract, 1, Decimal::from(99)).await;

        let err = h
            .proposals
            .create_proposal(draft(&carol.address, "one-address-one-vote"), carol.timestamp_proof(NOW_MS))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { required, .. } if required == Decimal::from(100)));

        h.chain.set_balance(&carol.address, &contract, 2, Decimal::from(100)).await;
        assert!(h
            .proposals
            .create_proposal(draft(&carol.address, "one-address-one-vote"), carol.timestamp_proof(NOW_MS))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_create_validation() {
        let h = Harness::new().await;
        let alice = author(&h, "0x01").await;

        let mut bad = draft(&alice.address, "one-address-one-vote");
        bad.choices = vec!["yes".into(), "yes".into()];
        assert!(matches!(
            h.proposals.create_proposal(bad, alice.timestamp_proof(NOW_MS)).await,
            Err(Error::InvalidRequest(_))
        ));

        let mut bad = draft(&alice.address, "one-address-one-vote");
        bad.end_time = bad.start_time;
        assert!(matches!(
            h.proposals.create_proposal(bad, alice.timestamp_proof(NOW_MS)).await,
            Err(Error::InvalidRequest(_))
        ));

        assert_eq!(
            h.proposals
                .create_proposal(draft(&alice.address, "quadratic"), alice.timestamp_proof(NOW_MS))
                .await,
            Err(Error::StrategyNotFound("quadratic".into()))
        );

        let mut elsewhere = draft(&alice.address, "one-address-one-vote");
        elsewhere.community_id = 9;
        assert_eq!(
            h.proposals.create_proposal(elsewhere, alice.timestamp_proof(NOW_MS)).await,
            Err(Error::CommunityNotFound(9))
        );

        // Stale signature
        assert!(matches!(
            h.proposals
                .create_proposal(draft(&alice.address, "one-address-one-vote"), alice.timestamp_proof(NOW_MS - 61_000))
                .await,
            Err(Error::ExpiredTimestamp { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_lifecycle() {
        let h = Harness::new().await;
        let alice = author(&h, "0x01").await;
        let proposal = h
            .proposals
            .create_proposal(draft(&alice.address, "one-address-one-vote"), alice.timestamp_proof(NOW_MS))
            .await
            .unwrap();

        assert!(matches!(
            h.proposals
                .update_proposal_status(proposal.id, ProposalStatus::Closed, &alice.address, alice.timestamp_proof(NOW_MS))
                .await,
            Err(Error::InvalidRequest(_))
        ));

        let outsider = TestAccount::single("0x06");
        outsider.register(&h.chain).await;
        assert!(matches!(
            h.proposals
                .update_proposal_status(proposal.id, ProposalStatus::Cancelled, &outsider.address, outsider.timestamp_proof(NOW_MS))
                .await,
            Err(Error::Forbidden(_))
        ));

        let cancelled = h
            .proposals
            .update_proposal_status(proposal.id, ProposalStatus::Cancelled, &alice.address, alice.timestamp_proof(NOW_MS))
            .await
            .unwrap();
        assert_eq!(cancelled.status, ProposalStatus::Cancelled);

        assert_eq!(
            h.proposals
                .update_proposal_status(proposal.id, ProposalStatus::Cancelled, &alice.address, alice.timestamp_proof(NOW_MS))
                .await,
            Err(Error::InactiveProposal(proposal.id))
        );
    }

    #[tokio::test]
    async fn test_closed_proposal_cannot_be_cancelled() {
        let h = Harness::new().await;
        let alice = author(&h, "0x01").await;
        let proposal = h
            .proposals
            .create_proposal(draft(&alice.address, "one-address-one-vote"), alice.timestamp_proof(NOW_MS))
            .await
            .unwrap();

        h.clock.set_secs(END_SECS);
        let ts = END_SECS * 1000;
        assert_eq!(
            h.proposals
                .update_proposal_status(proposal.id, ProposalStatus::Cancelled, &alice.address, alice.timestamp_proof(ts))
                .await,
            Err(Error::InactiveProposal(proposal.id))
        );
    }

    #[tokio::test]
    async fn test_get_proposal_with_retired_strategy() {
        let h = Harness::new().await;
        let alice = author(&h, "0x01").await;
        let proposal = h
            .proposals
            .create_proposal(draft(&alice.address, "balance-of-nfts"), alice.timestamp_proof(NOW_MS))
            .await
            .unwrap();

        let mut community = h.store.get_community(1).await.unwrap().unwrap();
        community.strategies.retain(|s| s.name != "balance-of-nfts");
        h.store.put_community(community).await.unwrap();

        assert_eq!(
            h.proposals.get_proposal(proposal.id).await,
            Err(Error::StrategyNotFound("balance-of-nfts".into()))
        );
        assert_eq!(h.proposals.get_proposal(77).await, Err(Error::ProposalNotFound(77)));
    }
}
