//! # Batch Proposals
//!
//! A batch bundles several changes under one closing time and one vote set.
//! It is all-or-nothing twice over:
//!
//! - at submission, one failing member rejects the batch and every member
//! - at close, one declined member declines every member that passed
//!
//! Passed members then join the active proposals and are enacted
//! individually at their own enactment times.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tradegov_common::crypto::sha3_256_hex;
use tradegov_common::{Decimal, Timestamp};

use crate::engine::{apply_change_defaults, vote_closed_for, Engine};
use crate::error::{GovernanceError, Rejection, Result};
use crate::events::GovernanceEvent;
use crate::node_validation::NodeValidation;
use crate::outputs::{ToSubmit, VoteClosed};
use crate::tally::{close_with, TrackedProposal, VoteSet};
use crate::types::{
    BatchProposal, BatchProposalSubmission, Market, Proposal, ProposalError, ProposalState,
    ProposalTerms,
};

/// An open batch with the votes shared by its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedBatch {
    pub batch: BatchProposal,
    pub votes: VoteSet,
}

/// Content-addressed ID of the `index`th member of a batch. The separator
/// keeps `("b1", 10)` and `("b11", 0)` apart.
pub fn batch_member_id(batch_id: &str, index: usize) -> String {
    sha3_256_hex(format!("{batch_id}:{index}").as_bytes())
}

impl Engine {
    /// Submits a batch of changes sharing one closing time.
    ///
    /// # Arguments
    ///
    /// * `submission` - the shared closing time and every member change
    /// * `batch_id` - deterministic batch ID; member IDs derive from it
    /// * `party` - the proposer, checked against every member's thresholds
    ///
    /// # Returns
    ///
    /// One `ToSubmit` per member, in submission order. If any member fails
    /// validation the batch and all its members are rejected and the first
    /// failure is returned.
    pub fn submit_batch_proposal(
        &mut self,
        submission: BatchProposalSubmission,
        batch_id: &str,
        party: &str,
    ) -> Result<Vec<ToSubmit>> {
        if self.proposal_exists(batch_id) {
            return Err(GovernanceError::ProposalIsDuplicate);
        }

        let now = self.now();
        let closing = submission.terms.closing_timestamp;
        let mut batch = BatchProposal {
            id: batch_id.to_string(),
            reference: submission.reference.clone(),
            party: party.to_string(),
            state: ProposalState::Open,
            timestamp: now.unix_nanos(),
            closing_timestamp: closing,
            rationale: submission.rationale.clone(),
            reason: ProposalError::Unspecified,
            error_details: String::new(),
            proposals: Vec::with_capacity(submission.terms.changes.len()),
        };

        for (i, change) in submission.terms.changes.into_iter().enumerate() {
            let id = batch_member_id(batch_id, i);
            if self.proposal_exists(&id) {
                return Err(GovernanceError::ProposalIsDuplicate);
            }
            let mut p = Proposal {
                id,
                batch_id: Some(batch_id.to_string()),
                reference: submission.reference.clone(),
                party: party.to_string(),
                state: ProposalState::Open,
                timestamp: now.unix_nanos(),
                terms: ProposalTerms {
                    closing_timestamp: closing,
                    enactment_timestamp: change.enactment_timestamp,
                    validation_timestamp: change.validation_timestamp,
                    change: change.change,
                },
                rationale: submission.rationale.clone(),
                reason: ProposalError::Unspecified,
                error_details: String::new(),
                required_majority: Decimal::ZERO,
                required_participation: Decimal::ZERO,
                required_lp_majority: Decimal::ZERO,
                required_lp_participation: Decimal::ZERO,
            };
            apply_change_defaults(&mut p);
            batch.proposals.push(p);
        }

        let mut failure: Option<(usize, Rejection)> = None;
        let mut markets = Vec::with_capacity(batch.proposals.len());
        for i in 0..batch.proposals.len() {
            let result = self.validate_batch_member(&mut batch.proposals[i], now);
            match result {
                Ok(market) => markets.push(market),
                Err(r) => {
                    failure = Some((i, r));
                    break;
                }
            }
        }

        if let Some((failed_at, r)) = failure {
            let details = r.details();
            for (i, p) in batch.proposals.iter_mut().enumerate() {
                let member_details = if i == failed_at {
                    details.clone()
                } else {
                    "another proposal in the batch was rejected".to_string()
                };
                p.reject_with_err(ProposalError::ProposalInBatchRejected, member_details);
            }
            batch.reject_with_err(ProposalError::ProposalInBatchRejected, details);
            debug!(batch_id = %batch_id, reason = %r.reason, "batch proposal rejected: {}", batch.error_details);
            self.send_batch_event(&batch);
            return Err(r.error);
        }

        let out = batch
            .proposals
            .iter()
            .cloned()
            .zip(markets)
            .map(|(proposal, market)| ToSubmit { proposal, market })
            .collect();
        debug!(batch_id = %batch_id, members = batch.proposals.len(), "batch proposal accepted");
        self.send_batch_event(&batch);
        self.batches.insert(
            batch_id.to_string(),
            TrackedBatch {
                batch,
                votes: VoteSet::default(),
            },
        );
        Ok(out)
    }

    fn validate_batch_member(
        &self,
        p: &mut Proposal,
        now: Timestamp,
    ) -> std::result::Result<Option<Market>, Rejection> {
        if NodeValidation::is_required(p) {
            return Err(Rejection::msg(
                ProposalError::ProposalInBatchRejected,
                "proposals requiring node validation cannot be submitted in a batch",
            ));
        }
        self.validate_open_proposal(p, now)?;
        self.into_to_submit(p, now, false, false)
    }

    /// Emits the wrapper followed by an event per member.
    fn send_batch_event(&self, batch: &BatchProposal) {
        self.send(GovernanceEvent::BatchProposal(batch.clone()));
        self.collab.broker.send_batch(
            batch
                .proposals
                .iter()
                .cloned()
                .map(GovernanceEvent::Proposal)
                .collect(),
        );
    }

    /// Closes every batch whose voting window elapsed.
    ///
    /// # Returns
    ///
    /// Members that passed, ready to join the active proposals.
    ///
    /// # Panics
    ///
    /// If members of a batch do not share the batch closing time.
    pub(crate) fn evaluate_batches(
        &mut self,
        now: Timestamp,
        vote_closed: &mut Vec<VoteClosed>,
    ) -> Vec<TrackedProposal> {
        let now_secs = now.unix();
        let closing: Vec<String> = self
            .batches
            .iter()
            .filter(|(_, b)| b.batch.should_close(now_secs))
            .map(|(id, _)| id.clone())
            .collect();

        let mut passed = Vec::new();
        for id in closing {
            let Some(tracked) = self.batches.remove(&id) else {
                continue;
            };
            passed.extend(self.close_batch(tracked, vote_closed));
        }
        passed
    }

    fn close_batch(
        &self,
        tracked: TrackedBatch,
        vote_closed: &mut Vec<VoteClosed>,
    ) -> Vec<TrackedProposal> {
        let TrackedBatch { mut batch, votes } = tracked;

        for p in &batch.proposals {
            if p.terms.closing_timestamp != batch.closing_timestamp {
                panic!(
                    "batch {} member {} closes at {} instead of {}",
                    batch.id, p.id, p.terms.closing_timestamp, batch.closing_timestamp
                );
            }
        }

        if let Some(err) = batch
            .proposals
            .iter()
            .find_map(|p| self.successor_invalidated(p))
        {
            let details = err.to_string();
            for p in batch.proposals.iter_mut() {
                p.reject_with_err(ProposalError::ProposalInBatchRejected, details.clone());
            }
            batch.reject_with_err(ProposalError::InvalidSuccessorMarket, details);
            info!("batch {} rejected, a successor market was invalidated", batch.id);
            self.send_batch_event(&batch);
            return Vec::new();
        }

        let accounts = self.collab.accounts.as_ref();
        let markets = self.collab.markets.as_ref();
        let mut tallied = Vec::with_capacity(batch.proposals.len());
        for mut p in std::mem::take(&mut batch.proposals) {
            let mut member_votes = votes.clone();
            if p.is_open() {
                close_with(&mut p, &mut member_votes, accounts, markets);
            }
            tallied.push(TrackedProposal {
                proposal: p,
                votes: member_votes,
            });
        }

        let any_declined = tallied.iter().any(|tp| !tp.proposal.is_passed());
        if any_declined {
            for tp in tallied.iter_mut().filter(|tp| tp.proposal.is_passed()) {
                tp.proposal.decline_with_err(
                    ProposalError::ProposalInBatchDeclined,
                    "another proposal in the batch was declined",
                );
            }
            batch.state = ProposalState::Declined;
        } else {
            batch.state = ProposalState::Passed;
        }
        debug!(batch_id = %batch.id, state = ?batch.state, "batch proposal closed");

        batch.proposals = tallied.iter().map(|tp| tp.proposal.clone()).collect();
        self.send_batch_event(&batch);
        if let Some(first) = tallied.first() {
            self.send_votes(first.votes.sorted());
        }
        for tp in &tallied {
            vote_closed.push(vote_closed_for(&tp.proposal));
        }

        if any_declined {
            return Vec::new();
        }
        tallied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_ids_are_distinct_and_stable() {
        let a = batch_member_id("batch", 0);
        let b = batch_member_id("batch", 1);
        assert_ne!(a, b);
        assert_eq!(a, batch_member_id("batch", 0));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_member_ids_do_not_collide_across_batches() {
        assert_ne!(batch_member_id("b1", 10), batch_member_id("b11", 0));
        assert_ne!(batch_member_id("b1", 1), batch_member_id("b", 11));
    }
}
