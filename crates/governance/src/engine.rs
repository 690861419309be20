//! # Governance Engine
//!
//! Owns every proposal from submission until it is removed or retained as
//! enacted, and drives the lifecycle from block time.
//!
//! ## Collections
//!
//! - `active`: open and passed proposals, in submission order. Never
//!   re-sorted, since the tick walks it in stored order and every validator
//!   must see the same order.
//! - `enacted`: proposals handed to the execution engine, kept for
//!   checkpoints.
//! - `node_validation`: proposals awaiting external confirmation.
//! - `batches`: open batch proposals keyed by batch ID.
//!
//! ## Guarantees
//!
//! - Submission and vote failures never panic; the proposal is rejected
//!   with a typed reason and an event is emitted.
//! - Within one tick, the first successor proposal to reach enactment for a
//!   given parent market wins.
//! - All mutation funnels through `Engine`; it is driven serially and holds
//!   no locks.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::{debug, error, info};
use tradegov_common::crypto::{id_slot, sha3_256_bytes, ID_WIDTH};
use tradegov_common::{Config, Decimal, Timestamp};

use crate::batch::TrackedBatch;
use crate::builder::{build_market_from_proposal, build_spot_market_from_proposal};
use crate::collaborators::Collaborators;
use crate::error::{GovernanceError, Rejection, Result, ValidationResult};
use crate::events::GovernanceEvent;
use crate::node_validation::NodeValidation;
use crate::outputs::{ToEnact, ToEnactKind, ToSubmit, VoteClosed};
use crate::params::proposal_parameters;
use crate::tally::TrackedProposal;
use crate::types::asset::{AssetDetails, AssetSource, AssetUpdateSource, Erc20};
use crate::types::market::{
    FutureProduct, InstrumentConfiguration, NewMarketConfiguration, NewSpotMarketConfiguration,
    PerpsProduct, Product, SuccessorConfiguration, UpdateProduct,
};
use crate::types::{
    Asset, Market, MarketState, NewMarket, NewSpotMarket, Proposal, ProposalChange,
    ProposalError, ProposalState, ProposalSubmission, UpdateMarket,
    UpdateAsset, UpdateSpotMarket, Vote, VoteSubmission,
};
use crate::validation::asset::{validate_new_asset, validate_update_asset};
use crate::validation::market::{
    apply_new_market_defaults, apply_update_market_defaults, validate_new_market_change,
    validate_new_spot_market_change, validate_update_market_change,
    validate_update_spot_market_change,
};
use crate::validation::netparam::validate_network_parameter_update;
use crate::validation::programs::{
    validate_freeform, validate_new_protocol_automated_purchase,
    validate_update_referral_program, validate_update_volume_discount_program,
    validate_update_volume_rebate_program,
};
use crate::validation::{EnactmentTime, ValidationContext};

pub struct Engine {
    pub(crate) collab: Collaborators,
    pub(crate) config: Config,
    pub(crate) active: Vec<TrackedProposal>,
    pub(crate) enacted: Vec<Proposal>,
    pub(crate) node_validation: NodeValidation,
    pub(crate) batches: BTreeMap<String, TrackedBatch>,
}

/// Whole seconds between two unix-second timestamps, clamped at zero.
pub(crate) fn secs_between(from: i64, to: i64) -> Duration {
    Duration::from_secs(u64::try_from(to.saturating_sub(from)).unwrap_or(0))
}

/// Market targeted by a market update, spot market update or state update.
fn updated_market_id(change: &ProposalChange) -> Option<&str> {
    match change {
        ProposalChange::UpdateMarket(um) => Some(&um.market_id),
        ProposalChange::UpdateSpotMarket(um) => Some(&um.market_id),
        ProposalChange::UpdateMarketState(ms) => Some(&ms.market_id),
        _ => None,
    }
}

fn erc20_address(change: Option<&ProposalChange>) -> Option<String> {
    match change {
        Some(ProposalChange::NewAsset(na)) => na
            .changes
            .erc20()
            .map(|e| e.contract_address.to_lowercase()),
        _ => None,
    }
}

impl Engine {
    pub fn new(collab: Collaborators, config: Config) -> Self {
        let node_validation = NodeValidation::new(
            collab.assets.clone(),
            collab.witness.clone(),
            config.node_validation.clone(),
        );
        Engine {
            collab,
            config,
            active: Vec::new(),
            enacted: Vec::new(),
            node_validation,
            batches: BTreeMap::new(),
        }
    }

    /// Swaps the engine configuration.
    pub fn reload_conf(&mut self, config: Config) {
        info!("reloading governance configuration");
        self.node_validation.update_config(config.node_validation.clone());
        self.config = config;
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.collab.time.get_time_now()
    }

    pub(crate) fn send(&self, event: GovernanceEvent) {
        self.collab.broker.send(event);
    }

    pub(crate) fn send_proposal(&self, p: &Proposal) {
        self.send(GovernanceEvent::Proposal(p.clone()));
    }

    pub(crate) fn validation_context(&self, now: Timestamp) -> ValidationContext<'_> {
        ValidationContext {
            assets: self.collab.assets.as_ref(),
            netp: self.collab.netp.as_ref(),
            limits: &self.config.limits,
            now,
            deep_check: true,
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ════════════════════════════════════════════════════════════════════════

    /// Active proposals in submission order.
    pub fn active_proposals(&self) -> impl Iterator<Item = &TrackedProposal> {
        self.active.iter()
    }

    pub fn enacted_proposals(&self) -> &[Proposal] {
        &self.enacted
    }

    pub fn get_proposal(&self, id: &str) -> Option<&Proposal> {
        self.active
            .iter()
            .map(|tp| &tp.proposal)
            .chain(self.node_validation.proposals().map(|tp| &tp.proposal))
            .find(|p| p.id == id)
    }

    pub(crate) fn proposal_exists(&self, id: &str) -> bool {
        self.get_proposal(id).is_some()
            || self.batches.contains_key(id)
            || self
                .batches
                .values()
                .any(|b| b.batch.proposals.iter().any(|p| p.id == id))
    }

    // ════════════════════════════════════════════════════════════════════════
    // SUBMISSION
    // ════════════════════════════════════════════════════════════════════════

    /// Submits a proposal so it can be voted on, passed and enacted.
    ///
    /// # Arguments
    ///
    /// * `submission` - terms, rationale and reference from the transaction
    /// * `id` - deterministic proposal ID derived from the transaction
    /// * `party` - the proposer
    ///
    /// # Returns
    ///
    /// The accepted proposal, with the pending market for new markets. On
    /// failure the proposal is rejected, an event is emitted and the error
    /// returned; a duplicate ID returns `ProposalIsDuplicate` without any
    /// event.
    pub fn submit_proposal(
        &mut self,
        submission: ProposalSubmission,
        id: &str,
        party: &str,
    ) -> Result<ToSubmit> {
        if self.proposal_exists(id) {
            return Err(GovernanceError::ProposalIsDuplicate);
        }

        let now = self.now();
        let mut p = Proposal {
            id: id.to_string(),
            batch_id: None,
            reference: submission.reference,
            party: party.to_string(),
            state: ProposalState::Open,
            timestamp: now.unix_nanos(),
            terms: submission.terms,
            rationale: submission.rationale,
            reason: ProposalError::Unspecified,
            error_details: String::new(),
            required_majority: Decimal::ZERO,
            required_participation: Decimal::ZERO,
            required_lp_majority: Decimal::ZERO,
            required_lp_participation: Decimal::ZERO,
        };
        apply_change_defaults(&mut p);

        if let Err(r) = self.validate_open_proposal(&mut p, now) {
            return Err(self.reject_submission(p, r));
        }

        if NodeValidation::is_required(&p) {
            p.wait_for_node_vote();
            if let Err(r) = self.node_validation.start(p.clone(), now) {
                return Err(self.reject_submission(p, r));
            }
            self.send_proposal(&p);
            return Ok(ToSubmit {
                proposal: p,
                market: None,
            });
        }

        self.active.push(TrackedProposal::new(p.clone()));
        match self.into_to_submit(&p, now, false, false) {
            Ok(market) => {
                debug!(proposal_id = %p.id, kind = change_kind(&p), "proposal accepted");
                self.send_proposal(&p);
                Ok(ToSubmit { proposal: p, market })
            }
            Err(r) => {
                self.active.retain(|tp| tp.id() != p.id);
                Err(self.reject_submission(p, r))
            }
        }
    }

    fn reject_submission(&self, mut p: Proposal, r: Rejection) -> GovernanceError {
        p.reject_with_err(r.reason, r.details());
        debug!(proposal_id = %p.id, reason = %r.reason, "proposal rejected: {}", p.error_details);
        self.send_proposal(&p);
        r.error
    }

    /// Snapshots the thresholds onto the proposal, then checks timestamps,
    /// the proposer's credentials and the change itself.
    pub(crate) fn validate_open_proposal(&self, p: &mut Proposal, now: Timestamp) -> ValidationResult {
        let params = proposal_parameters(self.collab.netp.as_ref(), p.terms.change.as_ref())
            .map_err(|e| Rejection::new(ProposalError::UnknownType, e))?;
        p.required_majority = params.required_majority;
        p.required_participation = params.required_participation;
        p.required_lp_majority = params.required_majority_lp;
        p.required_lp_participation = params.required_participation_lp;

        let change = p
            .terms
            .change
            .clone()
            .ok_or_else(|| Rejection::new(ProposalError::UnknownType, GovernanceError::UnsupportedProposalType))?;
        let auto_enactable = change.is_auto_enactable();

        let close_time = Timestamp::from_unix(p.terms.closing_timestamp);
        let min_close = now.add(params.min_close);
        if close_time < min_close {
            return Err(Rejection::msg(
                ProposalError::CloseTimeTooSoon,
                format!("proposal closing time too soon, expected > {}, got {}", min_close.unix(), p.terms.closing_timestamp),
            ));
        }
        let max_close = now.add(params.max_close);
        if close_time > max_close {
            return Err(Rejection::msg(
                ProposalError::CloseTimeTooLate,
                format!("proposal closing time too late, expected < {}, got {}", max_close.unix(), p.terms.closing_timestamp),
            ));
        }

        let enact_time = Timestamp::from_unix(p.terms.enactment_timestamp);
        if !auto_enactable {
            let min_enact = now.add(params.min_enact);
            if enact_time < min_enact {
                return Err(Rejection::msg(
                    ProposalError::EnactTimeTooSoon,
                    format!("proposal enactment time too soon, expected > {}, got {}", min_enact.unix(), p.terms.enactment_timestamp),
                ));
            }
            let max_enact = now.add(params.max_enact);
            if enact_time > max_enact {
                return Err(Rejection::msg(
                    ProposalError::EnactTimeTooLate,
                    format!("proposal enactment time too late, expected < {}, got {}", max_enact.unix(), p.terms.enactment_timestamp),
                ));
            }
        }

        if change.requires_node_validation() {
            self.node_validation.validate_timestamps(&p.terms, now)?;
        }

        if !auto_enactable && enact_time < close_time {
            return Err(Rejection::msg(
                ProposalError::IncompatibleTimestamps,
                format!("proposal enactment time cannot be before closing time, expected > {} got {}", p.terms.closing_timestamp, p.terms.enactment_timestamp),
            ));
        }

        let mut check_tokens = true;
        if let Some(market_id) = updated_market_id(&change) {
            let markets = self.collab.markets.as_ref();
            if !markets.market_exists(market_id) {
                return Err(Rejection::new(
                    ProposalError::InvalidMarket,
                    GovernanceError::MarketDoesNotExist,
                ));
            }
            if self
                .active
                .iter()
                .any(|tp| tp.id() == market_id && tp.proposal.is_open())
            {
                return Err(Rejection::new(
                    ProposalError::InvalidMarket,
                    GovernanceError::MarketProposalStillOpen,
                ));
            }
            let els = markets.get_equity_like_share_for_market_and_party(market_id, &p.party);
            check_tokens = els < params.min_equity_like_share;
        }

        if check_tokens {
            let tokens = self
                .collab
                .accounts
                .get_available_balance(&p.party)
                .map_err(|e| Rejection::new(ProposalError::InsufficientTokens, e.into()))?;
            if tokens < params.min_proposer_balance {
                return Err(Rejection::msg(
                    ProposalError::InsufficientTokens,
                    format!("proposer have insufficient governance token, expected >= {} got {tokens}", params.min_proposer_balance),
                ));
            }
        }

        self.validate_change(p, &change, now)
    }

    fn validate_change(&self, p: &Proposal, change: &ProposalChange, now: Timestamp) -> ValidationResult {
        let ctx = self.validation_context(now);
        let terms = &p.terms;
        let markets = self.collab.markets.as_ref();
        let netp = self.collab.netp.as_ref();

        match change {
            ProposalChange::NewMarket(nm) => {
                let parent = nm
                    .parent_market_id()
                    .and_then(|pid| markets.get_market(pid, true));
                validate_new_market_change(
                    &ctx,
                    nm,
                    secs_between(terms.closing_timestamp, terms.enactment_timestamp),
                    &EnactmentTime::new(terms.enactment_timestamp),
                    parent.as_ref(),
                    false,
                )
            }
            ProposalChange::UpdateMarket(um) => {
                let market = markets.get_market(&um.market_id, false).ok_or_else(|| {
                    Rejection::new(ProposalError::InvalidMarket, GovernanceError::MarketDoesNotExist)
                })?;
                let et = EnactmentTime {
                    current: terms.enactment_timestamp,
                    should_not_verify: true,
                    cp_load: false,
                };
                validate_update_market_change(&ctx, um, &market, &et)
            }
            ProposalChange::NewSpotMarket(nsm) => validate_new_spot_market_change(
                &ctx,
                nsm,
                secs_between(terms.closing_timestamp, terms.enactment_timestamp),
                &EnactmentTime::new(terms.enactment_timestamp),
            ),
            ProposalChange::UpdateSpotMarket(usm) => validate_update_spot_market_change(&ctx, usm),
            ProposalChange::NewAsset(na) => {
                validate_new_asset(na)?;
                self.check_erc20_collision(p)
            }
            ProposalChange::UpdateAsset(ua) => validate_update_asset(ua),
            ProposalChange::UpdateNetworkParameter(unp) => {
                validate_network_parameter_update(netp, &unp.changes)
            }
            ProposalChange::NewTransfer(nt) => self
                .collab
                .banking
                .verify_governance_transfer(&nt.changes)
                .map_err(|e| Rejection::new(ProposalError::InvalidGovernanceTransfer, e.into())),
            ProposalChange::CancelTransfer(ct) => self
                .collab
                .banking
                .verify_cancel_governance_transfer(&ct.transfer_id)
                .map_err(|e| {
                    Rejection::new(ProposalError::FailedGovernanceTransferCancel, e.into())
                }),
            ProposalChange::NewFreeform(_) => validate_freeform(&p.rationale),
            ProposalChange::UpdateMarketState(ms) => {
                let state = markets
                    .get_market_state(&ms.market_id)
                    .map_err(|e| Rejection::new(ProposalError::InvalidMarket, e.into()))?;
                match state {
                    MarketState::Cancelled
                    | MarketState::Closed
                    | MarketState::TradingTerminated
                    | MarketState::Settled
                    | MarketState::Proposed => Err(Rejection::new(
                        ProposalError::InvalidMarket,
                        GovernanceError::MarketStateUpdateNotAllowed,
                    )),
                    _ => Ok(()),
                }
            }
            ProposalChange::UpdateReferralProgram(rp) => {
                validate_update_referral_program(netp, rp, terms.enactment_timestamp)
            }
            ProposalChange::UpdateVolumeDiscountProgram(vd) => {
                validate_update_volume_discount_program(netp, vd, terms.enactment_timestamp)
            }
            ProposalChange::UpdateVolumeRebateProgram(vr) => {
                validate_update_volume_rebate_program(netp, vr, terms.enactment_timestamp)
            }
            ProposalChange::NewProtocolAutomatedPurchase(ap) => {
                validate_new_protocol_automated_purchase(markets, ap, terms.enactment_timestamp)
            }
        }
    }

    /// A new ERC20 asset may not reuse a contract address already proposed,
    /// enacted or registered. Addresses compare case-insensitively.
    fn check_erc20_collision(&self, p: &Proposal) -> ValidationResult {
        let Some(address) = erc20_address(p.terms.change.as_ref()) else {
            return Ok(());
        };
        let in_flight = self
            .active
            .iter()
            .map(|tp| &tp.proposal)
            .chain(self.node_validation.proposals().map(|tp| &tp.proposal))
            .chain(self.enacted.iter())
            .filter(|other| other.id != p.id)
            .any(|other| erc20_address(other.terms.change.as_ref()).as_deref() == Some(address.as_str()));
        if in_flight || self.collab.assets.exists_for_ethereum_address(&address) {
            return Err(Rejection::new(
                ProposalError::Erc20AddressAlreadyInUse,
                GovernanceError::Erc20AddressAlreadyInUse,
            ));
        }
        Ok(())
    }

    /// Builds the pending market for new market proposals, using the same
    /// builder as enactment.
    ///
    /// `restore` tolerates a missing parent market and skips the
    /// already-succeeded check; `cp_load` skips the auction bounds.
    pub(crate) fn into_to_submit(
        &self,
        p: &Proposal,
        now: Timestamp,
        restore: bool,
        cp_load: bool,
    ) -> std::result::Result<Option<Market>, Rejection> {
        let terms = &p.terms;
        let auction = secs_between(terms.closing_timestamp, terms.enactment_timestamp);
        let et = EnactmentTime {
            current: terms.enactment_timestamp,
            should_not_verify: restore,
            cp_load,
        };
        let ctx = self.validation_context(now);
        let markets = self.collab.markets.as_ref();

        match &terms.change {
            Some(ProposalChange::NewMarket(nm)) => {
                let mut parent = None;
                if let Some(parent_id) = nm.parent_market_id() {
                    parent = markets.get_market(parent_id, true);
                    if !restore {
                        if parent.is_none() {
                            return Err(Rejection::new(
                                ProposalError::InvalidSuccessorMarket,
                                GovernanceError::ParentMarketDoesNotExist,
                            ));
                        }
                        if markets.is_succeeded(parent_id) {
                            return Err(Rejection::new(
                                ProposalError::InvalidSuccessorMarket,
                                GovernanceError::ParentMarketAlreadySucceeded,
                            ));
                        }
                    }
                }
                validate_new_market_change(&ctx, nm, auction, &et, parent.as_ref(), restore)?;
                let market = build_market_from_proposal(&p.id, nm, self.collab.netp.as_ref(), auction)?;
                Ok(Some(market))
            }
            Some(ProposalChange::NewSpotMarket(nsm)) => {
                validate_new_spot_market_change(&ctx, nsm, auction, &et)?;
                Ok(Some(build_spot_market_from_proposal(&p.id, nsm, auction)?))
            }
            _ => Ok(None),
        }
    }

    /// Rejects an active proposal on behalf of another subsystem.
    pub fn reject_proposal(
        &mut self,
        id: &str,
        reason: ProposalError,
        details: impl Into<String>,
    ) -> Result<()> {
        let Some(tp) = self.active.iter_mut().find(|tp| tp.id() == id) else {
            return Err(GovernanceError::ProposalDoesNotExist);
        };
        tp.proposal.reject_with_err(reason, details);
        let p = tp.proposal.clone();
        self.remove_active(id);
        self.send_proposal(&p);
        Ok(())
    }

    /// Removes an active proposal, preserving the order of the rest. A new
    /// asset leaving without passing has its asset marked rejected.
    pub(crate) fn remove_active(&mut self, id: &str) -> Option<TrackedProposal> {
        let pos = self.active.iter().position(|tp| tp.id() == id)?;
        let tp = self.active.remove(pos);
        let failed = matches!(
            tp.proposal.state,
            ProposalState::Declined | ProposalState::Failed | ProposalState::Rejected
        );
        if failed && matches!(tp.proposal.terms.change, Some(ProposalChange::NewAsset(_))) {
            self.collab.assets.set_rejected(id);
        }
        Some(tp)
    }

    // ════════════════════════════════════════════════════════════════════════
    // VOTING
    // ════════════════════════════════════════════════════════════════════════

    /// Casts or overwrites `party`'s vote on a proposal or batch.
    pub fn add_vote(&mut self, submission: VoteSubmission, party: &str) -> Result<()> {
        let result = self.try_add_vote(&submission, party);
        match &result {
            Ok(vote) => {
                debug!(proposal_id = %submission.proposal_id, party = %party, "vote accepted");
                self.send(GovernanceEvent::Vote(vote.clone()));
            }
            Err(e) => {
                debug!(proposal_id = %submission.proposal_id, party = %party, error = %e, "invalid vote submission");
            }
        }
        result.map(|_| ())
    }

    fn try_add_vote(&mut self, submission: &VoteSubmission, party: &str) -> Result<Vote> {
        let id = submission.proposal_id.as_str();

        if let Some(pos) = self.active.iter().position(|tp| tp.id() == id) {
            let vote = self.build_vote(&[&self.active[pos].proposal], submission, party)?;
            self.active[pos].add_vote(vote.clone())?;
            return Ok(vote);
        }

        let pending = self
            .node_validation
            .proposals()
            .find(|tp| tp.id() == id)
            .map(|tp| tp.proposal.clone());
        if let Some(p) = pending {
            let vote = self.build_vote(&[&p], submission, party)?;
            if let Some(tp) = self.node_validation.get_mut(id) {
                tp.add_vote(vote.clone())?;
            }
            return Ok(vote);
        }

        if let Some(batch) = self.batches.get(id) {
            if !batch.batch.is_open_for_votes() {
                return Err(GovernanceError::ProposalNotOpenForVotes);
            }
            let members: Vec<&Proposal> = batch.batch.proposals.iter().collect();
            let vote = self.build_vote(&members, submission, party)?;
            if let Some(batch) = self.batches.get_mut(id) {
                batch.votes.cast(vote.clone());
            }
            return Ok(vote);
        }

        Err(GovernanceError::ProposalDoesNotExist)
    }

    /// Checks `party` may vote on every proposal in `targets` and builds the
    /// vote record.
    fn build_vote(
        &self,
        targets: &[&Proposal],
        submission: &VoteSubmission,
        party: &str,
    ) -> Result<Vote> {
        let mut tokens = 0;
        for p in targets {
            if !p.is_open_for_votes() {
                return Err(GovernanceError::ProposalNotOpenForVotes);
            }
            tokens = self.can_vote(p, party)?;
        }

        Ok(Vote {
            party_id: party.to_string(),
            proposal_id: submission.proposal_id.clone(),
            value: submission.value,
            timestamp: self.now().unix_nanos(),
            total_governance_token_balance: tokens,
            total_governance_token_weight: Decimal::ZERO,
            // Weights are only known once the vote closes.
            total_equity_like_share_weight: Decimal::ZERO,
        })
    }

    /// Returns the voter's token balance. For market updates an equity-like
    /// share in the market also makes a party eligible.
    fn can_vote(&self, p: &Proposal, party: &str) -> Result<u128> {
        let params = proposal_parameters(self.collab.netp.as_ref(), p.terms.change.as_ref())?;
        let tokens = self.collab.accounts.get_available_balance(party)?;

        let Some(market_id) = p.equity_like_share_market() else {
            if tokens < params.min_voter_balance {
                return Err(GovernanceError::VoterInsufficientTokens);
            }
            return Ok(tokens);
        };

        let els = self
            .collab
            .markets
            .get_equity_like_share_for_market_and_party(market_id, party);
        if els.is_zero() && tokens == 0 {
            return Err(GovernanceError::VoterInsufficientTokensAndEquityLikeShare);
        }
        if els.is_zero() && tokens < params.min_voter_balance {
            return Err(GovernanceError::VoterInsufficientTokens);
        }
        Ok(tokens)
    }

    // ════════════════════════════════════════════════════════════════════════
    // TICK
    // ════════════════════════════════════════════════════════════════════════

    /// Advances the lifecycle to block time `now`.
    ///
    /// # Returns
    ///
    /// Proposals ready for enactment and proposals whose vote closed during
    /// this tick, both in `active` order.
    pub fn on_tick(&mut self, now: Timestamp) -> (Vec<ToEnact>, Vec<VoteClosed>) {
        let now_secs = now.unix();
        let mut vote_closed = Vec::new();
        let mut to_remove = Vec::new();
        let mut prepared = Vec::new();
        let mut claimed_parents = BTreeSet::new();

        let batch_passed = self.evaluate_batches(now, &mut vote_closed);

        let mut active = std::mem::take(&mut self.active);
        for tp in active.iter_mut() {
            if let Some(err) = self.successor_invalidated(&tp.proposal) {
                tp.proposal
                    .reject_with_err(ProposalError::InvalidSuccessorMarket, err.to_string());
                self.send_proposal(&tp.proposal);
                to_remove.push(tp.id().to_string());
                continue;
            }

            if tp.proposal.should_close(now_secs) {
                self.close_proposal(tp);
                vote_closed.push(vote_closed_for(&tp.proposal));
            }

            if !tp.proposal.is_open() && !tp.proposal.is_passed() {
                to_remove.push(tp.id().to_string());
                continue;
            }

            let auto_enactable = tp
                .proposal
                .terms
                .change
                .as_ref()
                .is_some_and(ProposalChange::is_auto_enactable);
            if !(tp.proposal.is_passed() && (auto_enactable || tp.proposal.is_time_to_enact(now_secs))) {
                continue;
            }

            if let Some(parent) = tp.proposal.terms.successor_parent() {
                if !claimed_parents.insert(parent.to_string()) {
                    let err = GovernanceError::ParentMarketAlreadySucceeded;
                    tp.proposal
                        .fail_with_err(ProposalError::InvalidSuccessorMarket, err.to_string());
                    self.send_proposal(&tp.proposal);
                    to_remove.push(tp.id().to_string());
                    continue;
                }
            }

            match self.pre_enact(&tp.proposal, now) {
                Ok(kind) => {
                    to_remove.push(tp.id().to_string());
                    prepared.push(ToEnact {
                        proposal: tp.proposal.clone(),
                        kind,
                    });
                }
                Err(r) => {
                    tp.proposal.fail_with_err(r.reason, r.details());
                    self.send_proposal(&tp.proposal);
                    error!(proposal_id = %tp.id(), error = %r.error, "proposal enactment has failed");
                    to_remove.push(tp.id().to_string());
                }
            }
        }
        self.active = active;

        let (accepted, rejected) = self.node_validation.on_tick();
        for mut tp in accepted {
            info!("proposal {} has been validated by nodes, starting now", tp.id());
            tp.proposal.state = ProposalState::Open;
            self.send_proposal(&tp.proposal);
            self.active.push(tp);
        }
        for mut tp in rejected {
            info!("proposal {} has not been validated by nodes", tp.id());
            tp.proposal.reject(ProposalError::NodeValidationFailed);
            self.send_proposal(&tp.proposal);
            self.collab.assets.set_rejected(tp.id());
        }

        let mut to_enact = Vec::with_capacity(prepared.len());
        for mut te in prepared {
            let market_id = match &te.proposal.terms.change {
                Some(ProposalChange::NewMarket(_)) => Some(te.proposal.id.clone()),
                Some(ProposalChange::UpdateMarket(um)) => Some(um.market_id.clone()),
                _ => None,
            };
            if let Some(market_id) = market_id {
                if let Err(e) = self.collab.markets.get_market_state(&market_id) {
                    if te.proposal.terms.successor_parent().is_some() {
                        te.proposal.reject_with_err(
                            ProposalError::InvalidSuccessorMarket,
                            GovernanceError::ParentMarketSucceededByCompeting.to_string(),
                        );
                        self.send_proposal(&te.proposal);
                    } else {
                        error!(proposal_id = %te.proposal.id, market_id = %market_id, error = %e, "could not get state of market");
                    }
                    continue;
                }
            }
            self.upsert_enacted(te.proposal.clone());
            to_enact.push(te);
        }

        for id in to_remove {
            self.remove_active(&id);
        }
        self.active.extend(batch_passed);

        (to_enact, vote_closed)
    }

    /// Tallies the proposal and emits it followed by its votes.
    pub(crate) fn close_proposal(&self, tp: &mut TrackedProposal) {
        if !tp.proposal.is_open() {
            return;
        }
        tp.close(self.collab.accounts.as_ref(), self.collab.markets.as_ref());
        if tp.proposal.is_passed() {
            debug!(proposal_id = %tp.id(), "proposal passed");
        } else if tp.proposal.is_declined() {
            debug!(proposal_id = %tp.id(), reason = %tp.proposal.reason, "proposal declined");
        }
        self.send_proposal(&tp.proposal);
        self.send_votes(tp.votes.sorted());
    }

    pub(crate) fn send_votes(&self, votes: Vec<Vote>) {
        self.collab
            .broker
            .send_batch(votes.into_iter().map(GovernanceEvent::Vote).collect());
    }

    /// A successor proposal is void once its pending market is gone (a
    /// competing successor was enacted) or its parent has disappeared.
    pub(crate) fn successor_invalidated(&self, p: &Proposal) -> Option<GovernanceError> {
        let parent = p.terms.successor_parent()?;
        if p.state.is_terminal() {
            return None;
        }
        let markets = self.collab.markets.as_ref();
        if markets.get_market_state(&p.id).is_err() {
            return Some(GovernanceError::ParentMarketSucceededByCompeting);
        }
        if markets.get_market(parent, true).is_none() {
            return Some(GovernanceError::ParentMarketDoesNotExist);
        }
        None
    }

    pub(crate) fn upsert_enacted(&mut self, p: Proposal) {
        match self.enacted.iter_mut().find(|e| e.id == p.id) {
            Some(existing) => *existing = p,
            None => self.enacted.push(p),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // ENACTMENT
    // ════════════════════════════════════════════════════════════════════════

    /// Materializes the effect of a passed proposal.
    fn pre_enact(&self, p: &Proposal, now: Timestamp) -> std::result::Result<ToEnactKind, Rejection> {
        let Some(change) = &p.terms.change else {
            return Err(Rejection::new(
                ProposalError::UnknownType,
                GovernanceError::UnsupportedProposalType,
            ));
        };
        let kind = match change {
            ProposalChange::NewMarket(_) => ToEnactKind::NewMarket,
            ProposalChange::NewSpotMarket(_) => ToEnactKind::NewSpotMarket,
            ProposalChange::UpdateMarket(um) => {
                ToEnactKind::UpdateMarket(self.updated_market_from_proposal(p, um, now)?)
            }
            ProposalChange::UpdateSpotMarket(usm) => {
                ToEnactKind::UpdateSpotMarket(self.updated_spot_market_from_proposal(usm, now)?)
            }
            ProposalChange::UpdateNetworkParameter(unp) => {
                // Applied here so a later proposal in the same tick validates
                // against the updated store.
                let (key, value) = (&unp.changes.key, &unp.changes.value);
                self.collab
                    .netp
                    .validate(key, value)
                    .and_then(|()| self.collab.netp.update(key, value))
                    .map_err(|e| Rejection::new(ProposalError::NetworkParameterInvalidValue, e.into()))?;
                ToEnactKind::NetworkParameter(unp.changes.clone())
            }
            ProposalChange::NewAsset(_) => {
                let asset = self
                    .collab
                    .assets
                    .get(&p.id)
                    .map_err(|e| Rejection::new(ProposalError::InvalidAsset, e.into()))?;
                self.collab.assets.set_pending_listing(&p.id);
                ToEnactKind::NewAsset(asset)
            }
            ProposalChange::UpdateAsset(ua) => ToEnactKind::UpdateAsset(self.updated_asset(ua)?),
            ProposalChange::NewTransfer(nt) => ToEnactKind::NewTransfer(nt.changes.clone()),
            ProposalChange::CancelTransfer(ct) => ToEnactKind::CancelTransfer(ct.transfer_id.clone()),
            ProposalChange::NewFreeform(_) => ToEnactKind::NewFreeform,
            ProposalChange::UpdateMarketState(ms) => ToEnactKind::MarketStateUpdate(ms.clone()),
            ProposalChange::UpdateReferralProgram(rp) => ToEnactKind::ReferralProgram(rp.changes.clone()),
            ProposalChange::UpdateVolumeDiscountProgram(vd) => {
                ToEnactKind::VolumeDiscountProgram(vd.changes.clone())
            }
            ProposalChange::UpdateVolumeRebateProgram(vr) => {
                ToEnactKind::VolumeRebateProgram(vr.changes.clone())
            }
            ProposalChange::NewProtocolAutomatedPurchase(ap) => {
                ToEnactKind::AutomatedPurchase(ap.changes.clone())
            }
        };
        Ok(kind)
    }

    /// Rebuilds a market from the market currently running plus the
    /// proposed changes.
    pub(crate) fn updated_market_from_proposal(
        &self,
        p: &Proposal,
        um: &UpdateMarket,
        now: Timestamp,
    ) -> std::result::Result<Market, Rejection> {
        let existing = self
            .collab
            .markets
            .get_market(&um.market_id, false)
            .ok_or_else(|| Rejection::new(ProposalError::InvalidMarket, GovernanceError::MarketDoesNotExist))?;

        let et = EnactmentTime {
            current: p.terms.enactment_timestamp,
            should_not_verify: true,
            cp_load: false,
        };
        validate_update_market_change(&self.validation_context(now), um, &existing, &et)?;

        let changes = &um.changes;
        let risk = changes
            .risk_parameters
            .clone()
            .ok_or_else(|| Rejection::msg(ProposalError::NoRiskParameters, "missing risk parameters"))?;
        let product = match &changes.instrument.product {
            None => return Err(Rejection::msg(ProposalError::NoProduct, "missing product")),
            Some(UpdateProduct::Future(f)) => {
                let Product::Future(current) = existing.product() else {
                    return Err(Rejection::msg(ProposalError::InvalidFutureProduct, "market is not a future"));
                };
                Product::Future(FutureProduct {
                    settlement_asset: current.settlement_asset.clone(),
                    quote_name: f.quote_name.clone(),
                    data_source_spec_for_settlement_data: f.data_source_spec_for_settlement_data.clone(),
                    data_source_spec_for_trading_termination: f
                        .data_source_spec_for_trading_termination
                        .clone(),
                    data_source_spec_binding: f.data_source_spec_binding.clone(),
                    cap: current.cap.clone(),
                })
            }
            Some(UpdateProduct::Perps(pp)) => {
                let Product::Perps(current) = existing.product() else {
                    return Err(Rejection::msg(ProposalError::InvalidPerpsProduct, "market is not a perpetual"));
                };
                Product::Perps(PerpsProduct {
                    settlement_asset: current.settlement_asset.clone(),
                    quote_name: pp.quote_name.clone(),
                    margin_funding_factor: pp.margin_funding_factor,
                    interest_rate: pp.interest_rate,
                    clamp_lower_bound: pp.clamp_lower_bound,
                    clamp_upper_bound: pp.clamp_upper_bound,
                    data_source_spec_for_settlement_data: pp.data_source_spec_for_settlement_data.clone(),
                    data_source_spec_for_settlement_schedule: pp
                        .data_source_spec_for_settlement_schedule
                        .clone(),
                    data_source_spec_binding: pp.data_source_spec_binding.clone(),
                })
            }
        };

        let nm = NewMarket {
            changes: NewMarketConfiguration {
                instrument: InstrumentConfiguration {
                    name: changes.instrument.name.clone(),
                    code: changes.instrument.code.clone(),
                    product: Some(product),
                },
                decimal_places: existing.decimal_places,
                position_decimal_places: existing.position_decimal_places,
                metadata: changes.metadata.clone(),
                price_monitoring_parameters: changes.price_monitoring_parameters.clone(),
                risk_parameters: Some(risk),
                linear_slippage_factor: changes.linear_slippage_factor,
                quadratic_slippage_factor: changes.quadratic_slippage_factor,
                liquidity_sla_parameters: changes.liquidity_sla_parameters.clone(),
                liquidation_strategy: changes
                    .liquidation_strategy
                    .clone()
                    .or_else(|| existing.liquidation_strategy.clone()),
                successor: existing.parent_market_id.clone().map(|parent_market_id| {
                    SuccessorConfiguration {
                        parent_market_id,
                        insurance_pool_fraction: existing.insurance_pool_fraction,
                    }
                }),
                tick_size: existing.tick_size,
            },
        };

        let opening = Duration::from_secs(u64::try_from(existing.opening_auction_duration).unwrap_or(0));
        let mut market = build_market_from_proposal(&existing.id, &nm, self.collab.netp.as_ref(), opening)?;
        market.state = existing.state;
        Ok(market)
    }

    fn updated_spot_market_from_proposal(
        &self,
        usm: &UpdateSpotMarket,
        now: Timestamp,
    ) -> std::result::Result<Market, Rejection> {
        let existing = self
            .collab
            .markets
            .get_market(&usm.market_id, false)
            .ok_or_else(|| Rejection::new(ProposalError::InvalidMarket, GovernanceError::MarketDoesNotExist))?;
        validate_update_spot_market_change(&self.validation_context(now), usm)?;

        let instrument = &existing.tradable_instrument.instrument;
        let nsm = NewSpotMarket {
            changes: NewSpotMarketConfiguration {
                instrument: InstrumentConfiguration {
                    name: instrument.name.clone(),
                    code: instrument.code.clone(),
                    product: Some(instrument.product.clone()),
                },
                price_decimal_places: existing.decimal_places,
                size_decimal_places: existing.position_decimal_places,
                metadata: usm.changes.metadata.clone(),
                price_monitoring_parameters: usm.changes.price_monitoring_parameters.clone(),
                risk_parameters: usm.changes.risk_parameters.clone(),
                sla_params: usm.changes.sla_params.clone(),
                tick_size: existing.tick_size,
            },
        };

        let opening = Duration::from_secs(u64::try_from(existing.opening_auction_duration).unwrap_or(0));
        let mut market = build_spot_market_from_proposal(&existing.id, &nsm, opening)?;
        market.state = existing.state;
        Ok(market)
    }

    /// The registry's asset with the proposed quantum and limits. Only
    /// ERC20 assets can be updated.
    fn updated_asset(
        &self,
        ua: &UpdateAsset,
    ) -> std::result::Result<Asset, Rejection> {
        let current = self
            .collab
            .assets
            .get(&ua.asset_id)
            .map_err(|e| Rejection::new(ProposalError::InvalidAsset, e.into()))?;
        let Some(erc20) = current.details.erc20() else {
            return Err(Rejection::new(ProposalError::InvalidAsset, GovernanceError::ExpectedErc20Asset));
        };
        let Some(AssetUpdateSource::Erc20(update)) = &ua.changes.source else {
            return Err(Rejection::new(
                ProposalError::InvalidAsset,
                GovernanceError::UnsupportedAssetSourceType,
            ));
        };

        Ok(Asset {
            id: current.id.clone(),
            details: AssetDetails {
                name: current.details.name.clone(),
                symbol: current.details.symbol.clone(),
                decimals: current.details.decimals,
                quantum: ua.changes.quantum,
                source: Some(AssetSource::Erc20(Erc20 {
                    chain_id: erc20.chain_id.clone(),
                    contract_address: erc20.contract_address.clone(),
                    lifetime_limit: update.lifetime_limit,
                    withdraw_threshold: update.withdraw_threshold,
                })),
            },
        })
    }

    /// Called by the execution engine once an enacted change has been
    /// applied, so the retained record carries its final state.
    ///
    /// An enacted successor market voids every other active proposal that
    /// claims the same parent.
    pub fn finalise_enactment(&mut self, proposal: &Proposal) {
        if let Some(enacted) = self.enacted.iter_mut().find(|e| e.id == proposal.id) {
            enacted.state = proposal.state;
        }
        self.send_proposal(proposal);

        if !proposal.is_enacted() {
            return;
        }
        let Some(parent) = proposal.terms.successor_parent() else {
            return;
        };

        let mut competing = Vec::new();
        for tp in self.active.iter_mut() {
            if tp.id() == proposal.id || tp.proposal.terms.successor_parent() != Some(parent) {
                continue;
            }
            tp.proposal.reject_with_err(
                ProposalError::InvalidSuccessorMarket,
                GovernanceError::ParentMarketSucceededByCompeting.to_string(),
            );
            competing.push(tp.proposal.clone());
        }
        for p in competing {
            self.send_proposal(&p);
            self.remove_active(&p.id);
        }
    }

    /// Re-keys every vote cast under `old_key` to `new_key`.
    pub fn validator_key_changed(&mut self, old_key: &str, new_key: &str) {
        let mut moved = Vec::new();
        for tp in self.active.iter_mut() {
            moved.extend(tp.votes.rekey(old_key, new_key));
        }
        for tp in self.node_validation.proposals_mut() {
            moved.extend(tp.votes.rekey(old_key, new_key));
        }
        for batch in self.batches.values_mut() {
            moved.extend(batch.votes.rekey(old_key, new_key));
        }
        for vote in moved {
            self.send(GovernanceEvent::Vote(vote));
        }
    }

    /// Digest of the engine state for cross-node comparison.
    ///
    /// Layout: per active proposal its 32-byte ID slot then yes, no and
    /// invalid vote counts as big-endian u64; per enacted proposal its ID
    /// slot; then the node-validation digest. Hashed with sha3-256.
    pub fn hash(&self) -> [u8; 32] {
        let np_hash = self.node_validation.hash();
        let mut buf = Vec::with_capacity(
            self.active.len() * (ID_WIDTH + 24) + self.enacted.len() * ID_WIDTH + np_hash.len(),
        );
        for tp in &self.active {
            buf.extend_from_slice(&id_slot(tp.id()));
            let (yes, no, invalid) = tp.votes.counts();
            buf.extend_from_slice(&yes.to_be_bytes());
            buf.extend_from_slice(&no.to_be_bytes());
            buf.extend_from_slice(&invalid.to_be_bytes());
        }
        for p in &self.enacted {
            buf.extend_from_slice(&id_slot(&p.id));
        }
        buf.extend_from_slice(&np_hash);

        let h = sha3_256_bytes(&buf);
        debug!("governance state hash {}", hex::encode(h));
        h
    }
}

fn change_kind(p: &Proposal) -> &'static str {
    p.terms.change.as_ref().map_or("unknown", ProposalChange::kind)
}

/// Fills in defaults the proposer may omit.
pub(crate) fn apply_change_defaults(p: &mut Proposal) {
    let enactment = p.terms.enactment_timestamp;
    match p.terms.change.as_mut() {
        Some(ProposalChange::NewMarket(nm)) => apply_new_market_defaults(&mut nm.changes, enactment),
        Some(ProposalChange::UpdateMarket(um)) => apply_update_market_defaults(um, enactment),
        _ => {}
    }
}

pub(crate) fn vote_closed_for(p: &Proposal) -> VoteClosed {
    let start_auction = match &p.terms.change {
        Some(ProposalChange::NewMarket(_)) | Some(ProposalChange::NewSpotMarket(_)) => {
            Some(p.is_passed())
        }
        _ => None,
    };
    VoteClosed {
        proposal: p.clone(),
        start_auction,
    }
}
