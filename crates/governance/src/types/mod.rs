//! Governance data model.

pub mod asset;
pub mod change;
pub mod market;
pub mod programs;
pub mod proposal;
pub mod proposal_error;
pub mod transfer;

pub use asset::{Asset, AssetDetails, AssetSource, NewAsset, UpdateAsset};
pub use change::{NetworkParameter, NewFreeform, ProposalChange, UpdateNetworkParameter};
pub use market::{Market, MarketState, NewMarket, NewSpotMarket, UpdateMarket, UpdateSpotMarket};
pub use proposal::{
    BatchProposal, BatchProposalChange, BatchProposalSubmission, BatchProposalTerms, Proposal,
    ProposalRationale, ProposalState, ProposalSubmission, ProposalTerms, Vote, VoteSubmission,
    VoteValue,
};
pub use proposal_error::ProposalError;
