//! # Proposal Records
//!
//! [`Proposal`] is the record the engine tracks from submission until it is
//! either removed or retained as enacted. Terms carry whole unix seconds;
//! submission and vote timestamps carry unix nanoseconds.
//!
//! ## State machine
//!
//! ```text
//! WaitingForNodeVote -> Open -> {Passed, Declined} -> Enacted
//!          \             \          \
//!           +-------------+----------+--> {Rejected, Failed}
//! ```
//!
//! A proposal never re-enters `Open` after leaving it.

use serde::{Deserialize, Serialize};
use tradegov_common::Decimal;

use super::change::ProposalChange;
use super::market::{NewMarket, UpdateMarket, UpdateSpotMarket};
use super::proposal_error::ProposalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    Failed,
    Open,
    Passed,
    Rejected,
    Declined,
    Enacted,
    WaitingForNodeVote,
}

impl ProposalState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Failed
                | ProposalState::Rejected
                | ProposalState::Declined
                | ProposalState::Enacted
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRationale {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalTerms {
    /// Unix seconds.
    pub closing_timestamp: i64,
    /// Unix seconds.
    pub enactment_timestamp: i64,
    /// Unix seconds; only meaningful for proposals needing node validation.
    pub validation_timestamp: i64,
    /// `None` when the submitted change is not one the engine understands.
    pub change: Option<ProposalChange>,
}

impl ProposalTerms {
    pub fn new_market(&self) -> Option<&NewMarket> {
        match &self.change {
            Some(ProposalChange::NewMarket(nm)) => Some(nm),
            _ => None,
        }
    }

    pub fn update_market(&self) -> Option<&UpdateMarket> {
        match &self.change {
            Some(ProposalChange::UpdateMarket(um)) => Some(um),
            _ => None,
        }
    }

    pub fn update_spot_market(&self) -> Option<&UpdateSpotMarket> {
        match &self.change {
            Some(ProposalChange::UpdateSpotMarket(um)) => Some(um),
            _ => None,
        }
    }

    /// Parent market of a successor new-market change.
    pub fn successor_parent(&self) -> Option<&str> {
        self.new_market().and_then(|nm| nm.parent_market_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    /// Batch this proposal was submitted in, if any.
    pub batch_id: Option<String>,
    pub reference: String,
    pub party: String,
    pub state: ProposalState,
    /// Submission time, unix nanoseconds.
    pub timestamp: i64,
    pub terms: ProposalTerms,
    pub rationale: ProposalRationale,
    pub reason: ProposalError,
    pub error_details: String,
    pub required_majority: Decimal,
    pub required_participation: Decimal,
    pub required_lp_majority: Decimal,
    pub required_lp_participation: Decimal,
}

impl Proposal {
    pub fn is_open(&self) -> bool {
        self.state == ProposalState::Open
    }

    pub fn is_passed(&self) -> bool {
        self.state == ProposalState::Passed
    }

    pub fn is_declined(&self) -> bool {
        self.state == ProposalState::Declined
    }

    pub fn is_enacted(&self) -> bool {
        self.state == ProposalState::Enacted
    }

    pub fn is_open_for_votes(&self) -> bool {
        matches!(self.state, ProposalState::Open | ProposalState::WaitingForNodeVote)
    }

    /// True once the voting window has elapsed on an open proposal.
    pub fn should_close(&self, now_secs: i64) -> bool {
        self.is_open() && self.terms.closing_timestamp < now_secs
    }

    pub fn is_time_to_enact(&self, now_secs: i64) -> bool {
        self.terms.enactment_timestamp < now_secs
    }

    pub fn is_market_update(&self) -> bool {
        self.terms.update_market().is_some()
    }

    pub fn is_spot_market_update(&self) -> bool {
        self.terms.update_spot_market().is_some()
    }

    pub fn is_market_state_update(&self) -> bool {
        matches!(self.terms.change, Some(ProposalChange::UpdateMarketState(_)))
    }

    /// Market whose equity-like share backs votes on this proposal.
    pub fn equity_like_share_market(&self) -> Option<&str> {
        match &self.terms.change {
            Some(ProposalChange::UpdateMarket(um)) => Some(um.market_id.as_str()),
            Some(ProposalChange::UpdateSpotMarket(um)) => Some(um.market_id.as_str()),
            _ => None,
        }
    }

    pub fn wait_for_node_vote(&mut self) {
        self.state = ProposalState::WaitingForNodeVote;
    }

    pub fn reject(&mut self, reason: ProposalError) {
        self.state = ProposalState::Rejected;
        self.reason = reason;
    }

    pub fn reject_with_err(&mut self, reason: ProposalError, details: impl Into<String>) {
        self.error_details = details.into();
        self.reject(reason);
    }

    pub fn fail_with_err(&mut self, reason: ProposalError, details: impl Into<String>) {
        self.state = ProposalState::Failed;
        self.reason = reason;
        self.error_details = details.into();
    }

    pub fn decline_with_err(&mut self, reason: ProposalError, details: impl Into<String>) {
        self.state = ProposalState::Declined;
        self.reason = reason;
        self.error_details = details.into();
    }
}

// ════════════════════════════════════════════════════════════════════════════
// VOTES
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteValue {
    No,
    Yes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub party_id: String,
    pub proposal_id: String,
    pub value: VoteValue,
    /// Unix nanoseconds.
    pub timestamp: i64,
    pub total_governance_token_balance: u128,
    /// Share of the counted token balance, set at close.
    pub total_governance_token_weight: Decimal,
    /// Equity-like share in the updated market, market updates only.
    pub total_equity_like_share_weight: Decimal,
}

// ════════════════════════════════════════════════════════════════════════════
// SUBMISSIONS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSubmission {
    pub reference: String,
    pub terms: ProposalTerms,
    pub rationale: ProposalRationale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSubmission {
    pub proposal_id: String,
    pub value: VoteValue,
}

/// One change of a batch; closing time comes from the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProposalChange {
    pub enactment_timestamp: i64,
    pub validation_timestamp: i64,
    pub change: Option<ProposalChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProposalTerms {
    pub closing_timestamp: i64,
    pub changes: Vec<BatchProposalChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProposalSubmission {
    pub reference: String,
    pub terms: BatchProposalTerms,
    pub rationale: ProposalRationale,
}

// ════════════════════════════════════════════════════════════════════════════
// BATCH WRAPPER
// ════════════════════════════════════════════════════════════════════════════

/// A group of proposals sharing one closing time and one vote set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProposal {
    pub id: String,
    pub reference: String,
    pub party: String,
    pub state: ProposalState,
    /// Submission time, unix nanoseconds.
    pub timestamp: i64,
    /// Unix seconds, shared by every member.
    pub closing_timestamp: i64,
    pub rationale: ProposalRationale,
    pub reason: ProposalError,
    pub error_details: String,
    pub proposals: Vec<Proposal>,
}

impl BatchProposal {
    pub fn is_open_for_votes(&self) -> bool {
        self.state == ProposalState::Open
    }

    pub fn should_close(&self, now_secs: i64) -> bool {
        self.state == ProposalState::Open && self.closing_timestamp < now_secs
    }

    pub fn reject_with_err(&mut self, reason: ProposalError, details: impl Into<String>) {
        self.state = ProposalState::Rejected;
        self.reason = reason;
        self.error_details = details.into();
    }
}
