//! # Snapshots
//!
//! Full engine state split across four keys under the `governance`
//! namespace, so a node can rejoin from a state sync instead of replaying
//! the chain.
//!
//! | Key               | Payload                                   |
//! |-------------------|-------------------------------------------|
//! | `active`          | active proposals and their votes           |
//! | `enacted`         | enacted proposals                          |
//! | `node_validation` | proposals awaiting node validation         |
//! | `batch_active`    | open batches and their shared votes        |
//!
//! Votes are stored as party-ordered lists so encoding the same state
//! always yields the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::batch::TrackedBatch;
use crate::engine::Engine;
use crate::error::{GovernanceError, Result};
use crate::tally::{TrackedProposal, VoteSet};
use crate::types::{BatchProposal, Proposal, Vote};

pub const NAMESPACE: &str = "governance";

pub const KEY_ACTIVE: &str = "active";
pub const KEY_ENACTED: &str = "enacted";
pub const KEY_NODE_VALIDATION: &str = "node_validation";
pub const KEY_BATCH_ACTIVE: &str = "batch_active";

const KEYS: [&str; 4] = [KEY_ACTIVE, KEY_ENACTED, KEY_NODE_VALIDATION, KEY_BATCH_ACTIVE];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalData {
    pub proposal: Proposal,
    pub yes: Vec<Vote>,
    pub no: Vec<Vote>,
    pub invalid: Vec<Vote>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchData {
    pub batch: BatchProposal,
    pub yes: Vec<Vote>,
    pub no: Vec<Vote>,
    pub invalid: Vec<Vote>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotPayload {
    Active(Vec<ProposalData>),
    Enacted(Vec<Proposal>),
    NodeValidation(Vec<ProposalData>),
    BatchActive(Vec<BatchData>),
}

fn flatten(votes: &BTreeMap<String, Vote>) -> Vec<Vote> {
    votes.values().cloned().collect()
}

fn index(votes: Vec<Vote>) -> BTreeMap<String, Vote> {
    votes.into_iter().map(|v| (v.party_id.clone(), v)).collect()
}

fn vote_set(yes: Vec<Vote>, no: Vec<Vote>, invalid: Vec<Vote>) -> VoteSet {
    VoteSet {
        yes: index(yes),
        no: index(no),
        invalid: index(invalid),
    }
}

impl From<&TrackedProposal> for ProposalData {
    fn from(tp: &TrackedProposal) -> Self {
        ProposalData {
            proposal: tp.proposal.clone(),
            yes: flatten(&tp.votes.yes),
            no: flatten(&tp.votes.no),
            invalid: flatten(&tp.votes.invalid),
        }
    }
}

impl From<ProposalData> for TrackedProposal {
    fn from(d: ProposalData) -> Self {
        TrackedProposal {
            proposal: d.proposal,
            votes: vote_set(d.yes, d.no, d.invalid),
        }
    }
}

impl From<&TrackedBatch> for BatchData {
    fn from(tb: &TrackedBatch) -> Self {
        BatchData {
            batch: tb.batch.clone(),
            yes: flatten(&tb.votes.yes),
            no: flatten(&tb.votes.no),
            invalid: flatten(&tb.votes.invalid),
        }
    }
}

impl From<BatchData> for TrackedBatch {
    fn from(d: BatchData) -> Self {
        TrackedBatch {
            batch: d.batch,
            votes: vote_set(d.yes, d.no, d.invalid),
        }
    }
}

impl Engine {
    pub fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    pub fn keys(&self) -> &'static [&'static str] {
        &KEYS
    }

    /// Encodes the part of the state stored under `key`.
    pub fn get_state(&self, key: &str) -> Result<Vec<u8>> {
        let payload = match key {
            KEY_ACTIVE => SnapshotPayload::Active(self.active.iter().map(ProposalData::from).collect()),
            KEY_ENACTED => SnapshotPayload::Enacted(self.enacted.clone()),
            KEY_NODE_VALIDATION => SnapshotPayload::NodeValidation(
                self.node_validation.proposals().map(ProposalData::from).collect(),
            ),
            KEY_BATCH_ACTIVE => {
                SnapshotPayload::BatchActive(self.batches.values().map(BatchData::from).collect())
            }
            other => return Err(GovernanceError::UnknownSnapshotKey(other.to_string())),
        };
        Ok(bincode::serialize(&payload)?)
    }

    /// Replaces the part of the state stored under `key`.
    ///
    /// # Panics
    ///
    /// If a proposal awaiting node validation cannot be handed back to the
    /// witness.
    pub fn load_state(&mut self, key: &str, data: &[u8]) -> Result<()> {
        if !KEYS.contains(&key) {
            return Err(GovernanceError::UnknownSnapshotKey(key.to_string()));
        }
        let payload: SnapshotPayload = bincode::deserialize(data)?;
        match (key, payload) {
            (KEY_ACTIVE, SnapshotPayload::Active(items)) => {
                debug!("loading {} active proposals from snapshot", items.len());
                self.active = items.into_iter().map(TrackedProposal::from).collect();
            }
            (KEY_ENACTED, SnapshotPayload::Enacted(items)) => {
                debug!("loading {} enacted proposals from snapshot", items.len());
                self.enacted = items;
            }
            (KEY_NODE_VALIDATION, SnapshotPayload::NodeValidation(items)) => {
                debug!("loading {} node validation proposals from snapshot", items.len());
                for item in items {
                    let id = item.proposal.id.clone();
                    if let Err(e) = self.node_validation.restore(TrackedProposal::from(item)) {
                        panic!("failed to restore node validation for proposal {id}: {e}");
                    }
                }
            }
            (KEY_BATCH_ACTIVE, SnapshotPayload::BatchActive(items)) => {
                debug!("loading {} batch proposals from snapshot", items.len());
                self.batches = items
                    .into_iter()
                    .map(|d| (d.batch.id.clone(), TrackedBatch::from(d)))
                    .collect();
            }
            (key, _) => {
                return Err(GovernanceError::Codec(format!(
                    "payload does not match snapshot key {key}"
                )))
            }
        }
        Ok(())
    }

    /// Runs once every key has been loaded. An enacted proposal may also be
    /// present in the active list when the snapshot was taken between
    /// enactment and removal; the enacted copy wins.
    pub fn on_state_loaded(&mut self) {
        let enacted = &self.enacted;
        self.active.retain(|tp| {
            let duplicate = enacted.iter().any(|p| p.id == tp.proposal.id);
            if duplicate {
                warn!(proposal_id = %tp.proposal.id, "proposal is both active and enacted, dropping active copy");
            }
            !duplicate
        });
    }
}
