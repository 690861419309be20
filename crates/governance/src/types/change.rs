//! The closed set of changes a proposal can carry.

use serde::{Deserialize, Serialize};

use super::asset::{NewAsset, UpdateAsset};
use super::market::{MarketStateUpdate, NewMarket, NewSpotMarket, UpdateMarket, UpdateSpotMarket};
use super::programs::{
    NewProtocolAutomatedPurchase, UpdateReferralProgram, UpdateVolumeDiscountProgram,
    UpdateVolumeRebateProgram,
};
use super::transfer::{CancelTransfer, NewTransfer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParameter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNetworkParameter {
    pub changes: NetworkParameter,
}

/// Text-only proposal; nothing is enacted on chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFreeform;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalChange {
    NewMarket(NewMarket),
    UpdateMarket(UpdateMarket),
    NewSpotMarket(NewSpotMarket),
    UpdateSpotMarket(UpdateSpotMarket),
    NewAsset(NewAsset),
    UpdateAsset(UpdateAsset),
    UpdateNetworkParameter(UpdateNetworkParameter),
    NewTransfer(NewTransfer),
    CancelTransfer(CancelTransfer),
    NewFreeform(NewFreeform),
    UpdateMarketState(MarketStateUpdate),
    UpdateReferralProgram(UpdateReferralProgram),
    UpdateVolumeDiscountProgram(UpdateVolumeDiscountProgram),
    UpdateVolumeRebateProgram(UpdateVolumeRebateProgram),
    NewProtocolAutomatedPurchase(NewProtocolAutomatedPurchase),
}

impl ProposalChange {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProposalChange::NewMarket(_) => "new_market",
            ProposalChange::UpdateMarket(_) => "update_market",
            ProposalChange::NewSpotMarket(_) => "new_spot_market",
            ProposalChange::UpdateSpotMarket(_) => "update_spot_market",
            ProposalChange::NewAsset(_) => "new_asset",
            ProposalChange::UpdateAsset(_) => "update_asset",
            ProposalChange::UpdateNetworkParameter(_) => "update_network_parameter",
            ProposalChange::NewTransfer(_) => "new_transfer",
            ProposalChange::CancelTransfer(_) => "cancel_transfer",
            ProposalChange::NewFreeform(_) => "new_freeform",
            ProposalChange::UpdateMarketState(_) => "update_market_state",
            ProposalChange::UpdateReferralProgram(_) => "update_referral_program",
            ProposalChange::UpdateVolumeDiscountProgram(_) => "update_volume_discount_program",
            ProposalChange::UpdateVolumeRebateProgram(_) => "update_volume_rebate_program",
            ProposalChange::NewProtocolAutomatedPurchase(_) => "new_protocol_automated_purchase",
        }
    }

    /// Changes with no on-chain effect, enacted as soon as they pass.
    pub fn is_auto_enactable(&self) -> bool {
        matches!(self, ProposalChange::NewFreeform(_))
    }

    /// Changes that need external confirmation before voting starts.
    pub fn requires_node_validation(&self) -> bool {
        matches!(self, ProposalChange::NewAsset(_))
    }
}
