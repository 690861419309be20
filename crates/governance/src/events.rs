//! Events emitted through the [`Broker`](crate::collaborators::Broker).
//!
//! Every proposal state transition emits a `Proposal` event, every cast or
//! re-keyed vote a `Vote` event. Batches additionally emit a `BatchProposal`
//! event carrying the wrapper and its members.

use serde::{Deserialize, Serialize};

use crate::types::{BatchProposal, Proposal, Vote};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovernanceEvent {
    Proposal(Proposal),
    Vote(Vote),
    BatchProposal(BatchProposal),
}

impl GovernanceEvent {
    pub fn proposal(&self) -> Option<&Proposal> {
        match self {
            GovernanceEvent::Proposal(p) => Some(p),
            _ => None,
        }
    }

    pub fn vote(&self) -> Option<&Vote> {
        match self {
            GovernanceEvent::Vote(v) => Some(v),
            _ => None,
        }
    }

    pub fn batch(&self) -> Option<&BatchProposal> {
        match self {
            GovernanceEvent::BatchProposal(b) => Some(b),
            _ => None,
        }
    }
}
