//! # Node Validation
//!
//! Some proposals (new assets) need validators to confirm something on an
//! external chain before voting may start. Such a proposal waits here in
//! `WaitingForNodeVote` while the witness service checks it.
//!
//! ## Flow
//!
//! 1. `start` bounds the validation timestamp, registers the asset with the
//!    registry and hands a check to the witness.
//! 2. The witness callback flips a shared status flag. It never touches the
//!    queue itself.
//! 3. `on_tick` drains every proposal whose flag resolved, in submission
//!    order, split into accepted and rejected.
//!
//! After a restart `restore` re-registers pending checks with the witness
//! without registering the asset again.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use tradegov_common::config::NodeValidationConfig;
use tradegov_common::crypto::{id_slot, sha3_256_bytes, ID_WIDTH};
use tradegov_common::Timestamp;

use crate::collaborators::{Assets, Witness, WitnessCallback, WitnessResource};
use crate::error::{CollaboratorError, GovernanceError, Rejection, ValidationResult};
use crate::tally::TrackedProposal;
use crate::types::{Proposal, ProposalChange, ProposalError, ProposalTerms};

const PENDING: u8 = 0;
const OK: u8 = 1;
const REJECTED: u8 = 2;

/// Asks the registry whether the proposed asset exists on its source chain.
struct AssetCheck {
    asset_id: String,
    assets: Arc<dyn Assets>,
}

impl WitnessResource for AssetCheck {
    fn id(&self) -> &str {
        &self.asset_id
    }

    fn check(&self) -> Result<(), CollaboratorError> {
        self.assets.validate_asset(&self.asset_id)
    }
}

struct NodeProposal {
    tracked: TrackedProposal,
    state: Arc<AtomicU8>,
}

impl NodeProposal {
    fn new(tracked: TrackedProposal) -> Self {
        NodeProposal {
            tracked,
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    fn callback(&self) -> WitnessCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |ok| {
            state.store(if ok { OK } else { REJECTED }, Ordering::SeqCst);
        })
    }

    fn status(&self) -> u8 {
        self.state.load(Ordering::SeqCst)
    }
}

/// Queue of proposals awaiting external confirmation.
pub struct NodeValidation {
    assets: Arc<dyn Assets>,
    witness: Arc<dyn Witness>,
    config: NodeValidationConfig,
    proposals: Vec<NodeProposal>,
}

impl NodeValidation {
    pub fn new(
        assets: Arc<dyn Assets>,
        witness: Arc<dyn Witness>,
        config: NodeValidationConfig,
    ) -> Self {
        NodeValidation {
            assets,
            witness,
            config,
            proposals: Vec::new(),
        }
    }

    pub fn update_config(&mut self, config: NodeValidationConfig) {
        self.config = config;
    }

    pub fn is_required(proposal: &Proposal) -> bool {
        proposal
            .terms
            .change
            .as_ref()
            .is_some_and(ProposalChange::requires_node_validation)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.proposals.iter().any(|np| np.tracked.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TrackedProposal> {
        self.proposals
            .iter_mut()
            .find(|np| np.tracked.id() == id)
            .map(|np| &mut np.tracked)
    }

    /// Pending proposals in submission order.
    pub fn proposals(&self) -> impl Iterator<Item = &TrackedProposal> {
        self.proposals.iter().map(|np| &np.tracked)
    }

    pub fn proposals_mut(&mut self) -> impl Iterator<Item = &mut TrackedProposal> {
        self.proposals.iter_mut().map(|np| &mut np.tracked)
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    /// The validation timestamp must fall in the configured window after
    /// `now`, and voting may not close before validation ends.
    pub fn validate_timestamps(&self, terms: &ProposalTerms, now: Timestamp) -> ValidationResult {
        let min = now.add(Duration::from_secs(self.config.min_period_secs)).unix();
        let max = now.add(Duration::from_secs(self.config.max_period_secs)).unix();
        let validation = terms.validation_timestamp;

        if validation < min || validation > max {
            return Err(Rejection::msg(
                ProposalError::IncompatibleTimestamps,
                format!("proposal validation timestamp must be between {min} and {max}, got {validation}"),
            ));
        }
        if terms.closing_timestamp < validation {
            return Err(Rejection::msg(
                ProposalError::IncompatibleTimestamps,
                format!("proposal closing time cannot be before validation time, expected >= {validation} got {}", terms.closing_timestamp),
            ));
        }
        Ok(())
    }

    /// Registers the proposal for external confirmation.
    ///
    /// # Arguments
    ///
    /// * `proposal` - a proposal already in `WaitingForNodeVote`
    /// * `now` - current block time
    ///
    /// # Returns
    ///
    /// A rejection if the timestamps are out of bounds or the registry or
    /// witness refuses the proposal; nothing is queued in that case.
    pub fn start(&mut self, proposal: Proposal, now: Timestamp) -> ValidationResult {
        self.validate_timestamps(&proposal.terms, now)?;

        let Some(ProposalChange::NewAsset(asset)) = &proposal.terms.change else {
            return Err(Rejection::new(
                ProposalError::UnknownType,
                GovernanceError::UnsupportedProposalType,
            ));
        };
        self.assets
            .new_asset(&proposal.id, &asset.changes)
            .map_err(|e| Rejection::new(ProposalError::InvalidAsset, e.into()))?;

        let check_until = Timestamp::from_unix(proposal.terms.validation_timestamp);
        let np = NodeProposal::new(TrackedProposal::new(proposal));
        self.witness
            .start_check(self.resource(np.tracked.id()), np.callback(), check_until)
            .map_err(|e| Rejection::new(ProposalError::NodeValidationFailed, e.into()))?;

        debug!(proposal_id = %np.tracked.id(), until = check_until.unix(), "node validation started");
        self.proposals.push(np);
        Ok(())
    }

    /// Re-queues a pending proposal loaded from a snapshot. The asset is
    /// already registered, only the witness check is restored.
    pub fn restore(&mut self, tracked: TrackedProposal) -> Result<(), GovernanceError> {
        let np = NodeProposal::new(tracked);
        self.witness
            .restore_resource(self.resource(np.tracked.id()), np.callback())?;
        info!(proposal_id = %np.tracked.id(), "node validation restored");
        self.proposals.push(np);
        Ok(())
    }

    fn resource(&self, asset_id: &str) -> Arc<dyn WitnessResource> {
        Arc::new(AssetCheck {
            asset_id: asset_id.to_string(),
            assets: Arc::clone(&self.assets),
        })
    }

    /// Drains resolved checks as `(accepted, rejected)`, each in submission
    /// order. Unresolved checks stay queued.
    pub fn on_tick(&mut self) -> (Vec<TrackedProposal>, Vec<TrackedProposal>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut pending = Vec::with_capacity(self.proposals.len());

        for np in std::mem::take(&mut self.proposals) {
            match np.status() {
                OK => accepted.push(np.tracked),
                REJECTED => rejected.push(np.tracked),
                _ => pending.push(np),
            }
        }
        self.proposals = pending;
        (accepted, rejected)
    }

    /// sha3-256 over the 32-byte id slots of every pending proposal.
    pub fn hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(self.proposals.len() * ID_WIDTH);
        for np in &self.proposals {
            buf.extend_from_slice(&id_slot(np.tracked.id()));
        }
        sha3_256_bytes(&buf)
    }
}
