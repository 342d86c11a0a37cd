//! Winning-vote achievements for closed proposals

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info};

use cast_common::{
    Achievement, AchievementKind, Clock, ComputedStatus, Error, Proposal, ProposalResults, Result,
    Vote,
};
use cast_storage::GovernanceStore;

/// Awards achievements once per closed proposal
pub struct AchievementTrigger {
    store: Arc<dyn GovernanceStore>,
    clock: Arc<dyn Clock>,
}

/// Choices holding the largest total weight; empty when nothing was weighed
pub fn winning_choices(results: &ProposalResults) -> Vec<&str> {
    let top = results.results.values().copied().max().unwrap_or(Decimal::ZERO);
    if top.is_zero() {
        return Vec::new();
    }
    results
        .results
        .iter()
        .filter(|(_, weight)| **weight == top)
        .map(|(choice, _)| choice.as_str())
        .collect()
}

impl AchievementTrigger {
    pub fn new(store: Arc<dyn GovernanceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Award `winning_vote` to every voter for a top choice, if the proposal
    /// is closed and nobody has done so yet. Returns what this call awarded.
    pub async fn maybe_award(
        &self,
        proposal: &Proposal,
        votes: &[Vote],
        results: &ProposalResults,
    ) -> Result<Vec<Achievement>> {
        if proposal.computed_status(self.clock.now_secs()) != ComputedStatus::Closed
            || proposal.achievements_done
        {
            return Ok(Vec::new());
        }

        let won = self
            .store
            .try_mark_achievements_done(proposal.id)
            .await
            .map_err(|e| Error::AchievementComputeError(e.to_string()))?;
        if !won {
            return Ok(Vec::new());
        }

        let winners = winning_choices(results);
        let achievements: Vec<Achievement> = votes
            .iter()
            .filter(|vote| winners.contains(&vote.choice.as_str()))
            .map(|vote| Achievement {
                addr: vote.addr.clone(),
                kind: AchievementKind::WinningVote,
                proposal_id: proposal.id,
                community_id: proposal.community_id,
                details: vote.choice.clone(),
            })
            .collect();

        if let Err(e) = self.store.insert_achievements(achievements.clone()).await {
            error!("Failed to store achievements for proposal {}: {}", proposal.id, e);
            if let Err(reset) = self.store.reset_achievements_done(proposal.id).await {
                error!("Failed to reset achievements flag on proposal {}: {}", proposal.id, reset);
            }
            return Err(Error::AchievementComputeError(e.to_string()));
        }

        info!(
            "Awarded {} winning vote achievements on proposal {}",
            achievements.len(),
            proposal.id
        );
        Ok(achievements)
    }
}
