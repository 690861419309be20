//! Descriptors handed back to the execution engine.

use crate::types::change::NetworkParameter;
use crate::types::market::MarketStateUpdate;
use crate::types::programs::{
    AutomatedPurchaseChanges, ReferralProgramChanges, VolumeDiscountProgramChanges,
    VolumeRebateProgramChanges,
};
use crate::types::transfer::GovernanceTransfer;
use crate::types::{Asset, Market, Proposal, ProposalChange};

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToSubmit {
    pub proposal: Proposal,
    /// Market built from a new market or new spot market proposal, so the
    /// execution engine can create it in the pending state.
    pub market: Option<Market>,
}

impl ToSubmit {
    pub fn is_new_market(&self) -> bool {
        matches!(self.proposal.terms.change, Some(ProposalChange::NewMarket(_)))
    }

    pub fn is_new_spot_market(&self) -> bool {
        matches!(self.proposal.terms.change, Some(ProposalChange::NewSpotMarket(_)))
    }
}

/// The materialized effect of a proposal ready for enactment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToEnactKind {
    /// The market already exists in the pending state; enactment ends its
    /// opening auction.
    NewMarket,
    NewSpotMarket,
    UpdateMarket(Market),
    UpdateSpotMarket(Market),
    NetworkParameter(NetworkParameter),
    NewAsset(Asset),
    UpdateAsset(Asset),
    NewFreeform,
    NewTransfer(GovernanceTransfer),
    CancelTransfer(String),
    MarketStateUpdate(MarketStateUpdate),
    ReferralProgram(ReferralProgramChanges),
    VolumeDiscountProgram(VolumeDiscountProgramChanges),
    VolumeRebateProgram(VolumeRebateProgramChanges),
    AutomatedPurchase(AutomatedPurchaseChanges),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToEnact {
    pub proposal: Proposal,
    pub kind: ToEnactKind,
}

impl ToEnact {
    pub fn market(&self) -> Option<&Market> {
        match &self.kind {
            ToEnactKind::UpdateMarket(m) | ToEnactKind::UpdateSpotMarket(m) => Some(m),
            _ => None,
        }
    }
}

/// Emitted when a proposal's vote closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteClosed {
    pub proposal: Proposal,
    /// For new markets and new spot markets: whether the opening auction
    /// should start (the proposal passed) or the pending market be dropped.
    pub start_auction: Option<bool>,
}
