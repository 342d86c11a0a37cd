//! Vote casting, listing and tallying

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::FutureExt;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use cast_common::{
    Address, AuthProof, Clock, Error, Page, PageParams, Proposal, ProposalId, ProposalResults,
    Result, Role, Vote, VoteWithWeight, VoucherAction,
};
use cast_identity::{message, IdentityVerifier};
use cast_storage::GovernanceStore;

use crate::achievements::AchievementTrigger;
use crate::roles::RoleAuthorizer;
use crate::strategy::StrategyEngine;

/// Records votes and aggregates them on demand
///
/// Cast votes keep the weight they were accepted with. Listings and tallies
/// recompute every weight at the proposal's snapshot height instead.
pub struct VoteLedger {
    store: Arc<dyn GovernanceStore>,
    verifier: Arc<IdentityVerifier>,
    authorizer: Arc<RoleAuthorizer>,
    engine: Arc<StrategyEngine>,
    achievements: AchievementTrigger,
    clock: Arc<dyn Clock>,
    max_concurrent_queries: usize,
}

impl VoteLedger {
    pub fn new(
        store: Arc<dyn GovernanceStore>,
        verifier: Arc<IdentityVerifier>,
        authorizer: Arc<RoleAuthorizer>,
        engine: Arc<StrategyEngine>,
        clock: Arc<dyn Clock>,
        max_concurrent_queries: usize,
    ) -> Self {
        Self {
            achievements: AchievementTrigger::new(store.clone(), clock.clone()),
            store,
            verifier,
            authorizer,
            engine,
            clock,
            max_concurrent_queries: max_concurrent_queries.max(1),
        }
    }

    async fn load_proposal(&self, id: ProposalId) -> Result<Proposal> {
        self.store
            .get_proposal(id)
            .await?
            .ok_or(Error::ProposalNotFound(id))
    }

    /// Cast `addr`'s vote for `choice`
    pub async fn cast_vote(
        &self,
        proposal_id: ProposalId,
        addr: &Address,
        choice: &str,
        proof: AuthProof,
    ) -> Result<Vote> {
        let proposal = self.load_proposal(proposal_id).await?;
        if !proposal.is_active(self.clock.now_secs()) {
            return Err(Error::InactiveProposal(proposal_id));
        }
        if !proposal.has_choice(choice) {
            return Err(Error::invalid_request(format!(
                "{} is not a choice on proposal {}",
                choice, proposal_id
            )));
        }

        let verification = self
            .verifier
            .verify_proof(
                addr,
                &proof,
                |ts| message::vote_message(proposal_id, choice, ts),
                &VoucherAction::CastVote { proposal_id },
            )
            .await?;

        self.authorizer
            .ensure_not_blocked(addr, proposal.community_id)
            .await?;
        // Only community authors may relay a vote for another address
        if let Some(delegate) = &verification.delegate {
            self.authorizer
                .authorize(delegate, proposal.community_id, Role::Author)
                .await?;
        }
        if let Some(role) = proposal.voter_role {
            self.authorizer
                .authorize(addr, proposal.community_id, role)
                .await?;
        }

        let weight = self
            .engine
            .compute_weight(&proposal.strategy, addr, proposal.block_height)
            .await?;

        let vote = self
            .store
            .insert_vote(Vote {
                proposal_id,
                addr: addr.clone(),
                choice: choice.to_string(),
                weight,
                created_at: self.clock.now_secs(),
                sequence: 0,
                proof,
            })
            .await?;

        info!(
            "{} voted {} on proposal {} with weight {}",
            addr, choice, proposal_id, weight
        );
        Ok(vote)
    }

    /// Current weights for `votes`, in order. Votes that fell below the
    /// threshold weigh zero.
    async fn live_weights(&self, proposal: &Proposal, votes: &[Vote]) -> Result<Vec<Decimal>> {
        let lookups: Vec<_> = votes
            .iter()
            .map(|vote| {
                self.engine
                    .effective_weight(&proposal.strategy, &vote.addr, proposal.block_height)
                    .boxed()
            })
            .collect();
        stream::iter(lookups)
            .buffered(self.max_concurrent_queries)
            .try_collect()
            .await
    }

    /// A page of votes in insertion order, each with its current weight
    pub async fn list_votes(
        &self,
        proposal_id: ProposalId,
        page: &PageParams,
    ) -> Result<Page<VoteWithWeight>> {
        let proposal = self.load_proposal(proposal_id).await?;
        let (votes, total) = self.store.list_votes(proposal_id, page).await?;
        let weights = self.live_weights(&proposal, &votes).await?;

        let data = votes
            .into_iter()
            .zip(weights)
            .map(|(vote, current_weight)| VoteWithWeight { vote, current_weight })
            .collect();
        Ok(Page::new(data, page, total))
    }

    /// `addr`'s vote on a proposal with its current weight
    pub async fn vote_for_address(
        &self,
        proposal_id: ProposalId,
        addr: &Address,
    ) -> Result<Option<VoteWithWeight>> {
        let proposal = self.load_proposal(proposal_id).await?;
        let Some(vote) = self.store.get_vote(proposal_id, addr).await? else {
            return Ok(None);
        };

        let current_weight = self
            .engine
            .effective_weight(&proposal.strategy, addr, proposal.block_height)
            .await?;
        Ok(Some(VoteWithWeight { vote, current_weight }))
    }

    /// `addr`'s voting history with the weights captured at cast time
    pub async fn votes_for_address(
        &self,
        addr: &Address,
        proposal_ids: &[ProposalId],
        page: &PageParams,
    ) -> Result<Page<Vote>> {
        let (votes, total) = self
            .store
            .votes_for_address(addr, proposal_ids, page)
            .await?;
        Ok(Page::new(votes, page, total))
    }

    /// Aggregate current weights by choice. Awards achievements as a side
    /// effect once the proposal has closed.
    pub async fn tally(&self, proposal_id: ProposalId) -> Result<ProposalResults> {
        let proposal = self.load_proposal(proposal_id).await?;
        let votes = self.store.all_votes(proposal_id).await?;
        let weights = self.live_weights(&proposal, &votes).await?;

        let mut results: BTreeMap<String, Decimal> = proposal
            .choices
            .iter()
            .map(|choice| (choice.clone(), Decimal::ZERO))
            .collect();
        for (vote, weight) in votes.iter().zip(&weights) {
            *results.entry(vote.choice.clone()).or_default() += *weight;
        }

        let results = ProposalResults {
            proposal_id,
            total_weight: results.values().copied().sum(),
            vote_count: votes.len() as u64,
            results,
            updated_at: self.now(),
        };
        debug!(
            "Tallied {} votes on proposal {}: {:?}",
            results.vote_count, proposal_id, results.results
        );

        if let Err(e) = self.achievements.maybe_award(&proposal, &votes, &results).await {
            warn!("Achievements for proposal {} not awarded: {}", proposal_id, e);
        }

        Ok(results)
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.clock.now_ms() as i64)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Harness, END_SECS, HEIGHT, NOW_MS, START_SECS};
    use cast_common::{
        CommunityList, ContractParams, ListType, Order, ProposalStatus, Role, RoleGrant,
        StrategyDescriptor,
    };
    use cast_identity::testing::TestAccount;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[tokio::test]
    async fn test_one_address_one_vote_scenario() {
        let h = Harness::new().await;
        let proposal = h.publish(StrategyDescriptor::new("one-address-one-vote")).await;
        let voters: Vec<TestAccount> = (1..=3).map(|n| TestAccount::single(&format!("0x{}", n))).collect();
        for voter in &voters {
            voter.register(&h.chain).await;
        }

        for (voter, choice) in voters.iter().zip(["yes", "yes", "no"]) {
            let vote = h
                .ledger
                .cast_vote(proposal.id, &voter.address, choice, voter.vote_proof(proposal.id, choice, NOW_MS))
                .await
                .unwrap();
            assert_eq!(vote.weight, dec(1));
        }

        let results = h.ledger.tally(proposal.id).await.unwrap();
        assert_eq!(results.results["yes"], dec(2));
        assert_eq!(results.results["no"], dec(1));
        assert_eq!(results.total_weight, dec(3));
        assert_eq!(results.vote_count, 3);
        assert_eq!(results.results_float()["yes"], 2.0);
    }

    #[tokio::test]
    async fn test_balance_threshold_scenario() {
        let h = Harness::new().await;
        let contract = ContractParams {
            name: Some("FlowToken".into()),
            threshold: Some(dec(10)),
            ..Default::default()
        };
        let proposal = h
            .publish(StrategyDescriptor::new("token-weighted-default").with_contract(contract.clone()))
            .await;

        let poor = TestAccount::single("0x11");
        let rich = TestAccount::single("0x12");
        for (account, balance) in [(&poor, 5), (&rich, 15)] {
            account.register(&h.chain).await;
            h.chain.set_balance(&account.address, &contract, 1, dec(balance)).await;
        }

        let err = h
            .ledger
            .cast_vote(proposal.id, &poor.address, "yes", poor.vote_proof(proposal.id, "yes", NOW_MS))
            .await
            .unwrap_err();
        assert_eq!(err, Error::InsufficientBalance { required: dec(10), token: "FlowToken".into() });

        let vote = h
            .ledger
            .cast_vote(proposal.id, &rich.address, "no", rich.vote_proof(proposal.id, "no", NOW_MS))
            .await
            .unwrap();
        assert_eq!(vote.weight, dec(15));

        let results = h.ledger.tally(proposal.id).await.unwrap();
        assert_eq!(results.results["no"], dec(15));
        assert_eq!(results.results["yes"], Decimal::ZERO);
        assert_eq!(results.vote_count, 1);
    }

    #[tokio::test]
    async fn test_live_and_captured_weights() {
        let h = Harness::new().await;
        let contract = ContractParams { threshold: Some(dec(10)), ..Default::default() };
        let proposal = h
            .publish(StrategyDescriptor::new("token-weighted-default").with_contract(contract.clone()))
            .await;
        let voter = TestAccount::single("0x21");
        voter.register(&h.chain).await;
        h.chain.set_balance(&voter.address, &contract, 1, dec(40)).await;

        h.ledger
            .cast_vote(proposal.id, &voter.address, "yes", voter.vote_proof(proposal.id, "yes", NOW_MS))
            .await
            .unwrap();

        // Rewrite history below the snapshot: live reads follow, captured weight does not
        h.chain.set_balance(&voter.address, &contract, 2, dec(4)).await;

        let live = h.ledger.vote_for_address(proposal.id, &voter.address).await.unwrap().unwrap();
        assert_eq!(live.vote.weight, dec(40));
        assert_eq!(live.current_weight, Decimal::ZERO);

        let results = h.ledger.tally(proposal.id).await.unwrap();
        assert_eq!(results.results["yes"], Decimal::ZERO);
        assert_eq!(results.vote_count, 1);

        let history = h
            .ledger
            .votes_for_address(&voter.address, &[], &PageParams::new(0, 10, Order::Desc))
            .await
            .unwrap();
        assert_eq!(history.data[0].weight, dec(40));
        assert_eq!(history.next, -1);

        let nobody = Address::parse("0x99").unwrap();
        assert_eq!(h.ledger.vote_for_address(proposal.id, &nobody).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejections_before_insert() {
        let h = Harness::new().await;
        let proposal = h.publish(StrategyDescriptor::new("one-address-one-vote")).await;
        let voter = TestAccount::single("0x31");
        voter.register(&h.chain).await;
        let proof = || voter.vote_proof(proposal.id, "yes", NOW_MS);

        assert!(matches!(
            h.ledger.cast_vote(proposal.id, &voter.address, "maybe", voter.vote_proof(proposal.id, "maybe", NOW_MS)).await,
            Err(Error::InvalidRequest(_))
        ));
        // Signed for a different choice
        assert!(matches!(
            h.ledger.cast_vote(proposal.id, &voter.address, "no", proof()).await,
            Err(Error::InvalidSignature(_))
        ));
        assert_eq!(
            h.ledger.cast_vote(404, &voter.address, "yes", proof()).await,
            Err(Error::ProposalNotFound(404))
        );

        h.store
            .put_community_list(CommunityList {
                community_id: proposal.community_id,
                list_type: ListType::Block,
                addresses: vec![voter.address.clone()],
            })
            .await
            .unwrap();
        assert!(matches!(
            h.ledger.cast_vote(proposal.id, &voter.address, "yes", proof()).await,
            Err(Error::Forbidden(_))
        ));
        assert!(h.store.all_votes(proposal.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_vote() {
        let h = Harness::new().await;
        let proposal = h.publish(StrategyDescriptor::new("one-address-one-vote")).await;
        let voter = TestAccount::single("0x41");
        voter.register(&h.chain).await;

        h.ledger
            .cast_vote(proposal.id, &voter.address, "yes", voter.vote_proof(proposal.id, "yes", NOW_MS))
            .await
            .unwrap();
        let err = h
            .ledger
            .cast_vote(proposal.id, &voter.address, "no", voter.vote_proof(proposal.id, "no", NOW_MS))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::AlreadyVoted { addr: voter.address.to_string(), proposal_id: proposal.id }
        );
    }

    #[tokio::test]
    async fn test_voting_window_and_status() {
        let h = Harness::new().await;
        let proposal = h.publish(StrategyDescriptor::new("one-address-one-vote")).await;
        let voter = TestAccount::single("0x51");
        voter.register(&h.chain).await;

        // Pending
        let early = (START_SECS - 1) * 1000;
        h.clock.set_ms(early);
        assert_eq!(
            h.ledger
                .cast_vote(proposal.id, &voter.address, "yes", voter.vote_proof(proposal.id, "yes", early))
                .await,
            Err(Error::InactiveProposal(proposal.id))
        );

        // The end instant itself is closed
        let end = END_SECS * 1000;
        h.clock.set_ms(end);
        assert_eq!(
            h.ledger
                .cast_vote(proposal.id, &voter.address, "yes", voter.vote_proof(proposal.id, "yes", end))
                .await,
            Err(Error::InactiveProposal(proposal.id))
        );

        // Cancelled
        h.clock.set_ms(NOW_MS);
        h.store
            .update_proposal_status(proposal.id, ProposalStatus::Published, ProposalStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(
            h.ledger
                .cast_vote(proposal.id, &voter.address, "yes", voter.vote_proof(proposal.id, "yes", NOW_MS))
                .await,
            Err(Error::InactiveProposal(proposal.id))
        );
    }

    #[tokio::test]
    async fn test_voter_role_restriction() {
        let h = Harness::new().await;
        let mut proposal = h.publish(StrategyDescriptor::new("one-address-one-vote")).await;
        proposal.voter_role = Some(Role::Member);
        h.store.put_proposal(proposal.clone()).await.unwrap();

        let outsider = TestAccount::single("0x61");
        let member = TestAccount::single("0x62");
        outsider.register(&h.chain).await;
        member.register(&h.chain).await;
        h.store
            .grant_role(RoleGrant { community_id: proposal.community_id, addr: member.address.clone(), role: Role::Member })
            .await
            .unwrap();

        assert!(matches!(
            h.ledger
                .cast_vote(proposal.id, &outsider.address, "yes", outsider.vote_proof(proposal.id, "yes", NOW_MS))
                .await,
            Err(Error::Forbidden(_))
        ));
        assert!(h
            .ledger
            .cast_vote(proposal.id, &member.address, "yes", member.vote_proof(proposal.id, "yes", NOW_MS))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_voucher_from_non_author_is_forbidden() {
        let h = Harness::new().await;
        let proposal = h.publish(StrategyDescriptor::new("one-address-one-vote")).await;
        let voter = TestAccount::single("0x71");
        let relayer = TestAccount::single("0x72");
        voter.register(&h.chain).await;
        relayer.register(&h.chain).await;

        let voucher = relayer.voucher(
            &voter.address,
            VoucherAction::CastVote { proposal_id: proposal.id },
            NOW_MS,
        );
        let err = h
            .ledger
            .cast_vote(proposal.id, &voter.address, "no", AuthProof::Voucher(voucher))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(h.store.all_votes(proposal.id).await.unwrap().is_empty());

        // The voter can still cast their own vote
        let vote = h
            .ledger
            .cast_vote(proposal.id, &voter.address, "yes", voter.vote_proof(proposal.id, "yes", NOW_MS))
            .await
            .unwrap();
        assert_eq!(vote.choice, "yes");
    }

    #[tokio::test]
    async fn test_vote_relayed_by_author() {
        let h = Harness::new().await;
        let proposal = h.publish(StrategyDescriptor::new("one-address-one-vote")).await;
        let voter = TestAccount::single("0x73");
        let relayer = TestAccount::single("0x74");
        voter.register(&h.chain).await;
        relayer.register(&h.chain).await;
        h.store
            .grant_role(RoleGrant { community_id: proposal.community_id, addr: relayer.address.clone(), role: Role::Author })
            .await
            .unwrap();

        let voucher = relayer.voucher(
            &voter.address,
            VoucherAction::CastVote { proposal_id: proposal.id },
            NOW_MS,
        );
        let vote = h
            .ledger
            .cast_vote(proposal.id, &voter.address, "no", AuthProof::Voucher(voucher))
            .await
            .unwrap();
        assert_eq!(vote.addr, voter.address);
    }

    #[tokio::test]
    async fn test_list_votes_pages() {
        let h = Harness::new().await;
        let proposal = h.publish(StrategyDescriptor::new("one-address-one-vote")).await;
        let voters: Vec<TestAccount> = (1..=5).map(|n| TestAccount::single(&format!("0x8{}", n))).collect();
        for voter in &voters {
            voter.register(&h.chain).await;
            h.ledger
                .cast_vote(proposal.id, &voter.address, "yes", voter.vote_proof(proposal.id, "yes", NOW_MS))
                .await
                .unwrap();
        }

        let page = h
            .ledger
            .list_votes(proposal.id, &PageParams::new(0, 2, Order::Asc))
            .await
            .unwrap();
        assert_eq!(page.total_records, 5);
        assert_eq!(page.count, 2);
        assert_eq!(page.next, 2);
        assert_eq!(page.data[0].vote.addr, voters[0].address);
        assert_eq!(page.data[0].current_weight, dec(1));

        let last = h
            .ledger
            .list_votes(proposal.id, &PageParams::new(4, 2, Order::Desc))
            .await
            .unwrap();
        assert_eq!(last.data.len(), 1);
        assert_eq!(last.data[0].vote.addr, voters[0].address);
        assert_eq!(last.next, -1);
    }

    #[tokio::test]
    async fn test_tally_chain_failure_is_an_error() {
        let h = Harness::new().await;
        let contract = ContractParams::default();
        let proposal = h
            .publish(StrategyDescriptor::new("token-weighted-default").with_contract(contract.clone()))
            .await;
        let voter = TestAccount::single("0x91");
        voter.register(&h.chain).await;
        h.chain.set_balance(&voter.address, &contract, 1, dec(3)).await;
        h.ledger
            .cast_vote(proposal.id, &voter.address, "yes", voter.vote_proof(proposal.id, "yes", NOW_MS))
            .await
            .unwrap();

        h.chain.set_unavailable(true).await;
        let err = h.ledger.tally(proposal.id).await.unwrap_err();
        assert!(matches!(err, Error::BalanceFetchError(_)));
        assert!(err.is_retryable());
        assert_eq!(proposal.block_height, HEIGHT);
    }

    #[tokio::test]
    async fn test_tally_awards_achievements_when_closed() {
        let h = Harness::new().await;
        let proposal = h.publish(StrategyDescriptor::new("one-address-one-vote")).await;
        let voters: Vec<TestAccount> = (1..=3).map(|n| TestAccount::single(&format!("0xa{}", n))).collect();
        for (voter, choice) in voters.iter().zip(["yes", "no", "no"]) {
            voter.register(&h.chain).await;
            h.ledger
                .cast_vote(proposal.id, &voter.address, choice, voter.vote_proof(proposal.id, choice, NOW_MS))
                .await
                .unwrap();
        }

        // Open: nothing awarded
        h.ledger.tally(proposal.id).await.unwrap();
        assert!(!h.store.get_proposal(proposal.id).await.unwrap().unwrap().achievements_done);

        h.clock.set_secs(END_SECS);
        h.ledger.tally(proposal.id).await.unwrap();
        h.ledger.tally(proposal.id).await.unwrap();
        assert!(h.store.get_proposal(proposal.id).await.unwrap().unwrap().achievements_done);
        assert!(h.store.achievements_for_address(&voters[0].address).await.unwrap().is_empty());
        assert_eq!(h.store.achievements_for_address(&voters[1].address).await.unwrap().len(), 1);
        assert_eq!(h.store.achievements_for_address(&voters[2].address).await.unwrap().len(), 1);
    }
}
