//! # Parameter Resolver
//!
//! Reads the per-proposal-type thresholds from the network parameter store.
//! Values are resolved at submission and snapshotted onto the proposal, so a
//! later parameter change never moves the goalposts of a running vote.
//!
//! | Change | Key prefix |
//! |--------|------------|
//! | new market, new spot market | `governance.proposal.market` |
//! | update market, update spot market, market state | `governance.proposal.updateMarket` |
//! | new asset | `governance.proposal.asset` |
//! | update asset | `governance.proposal.updateAsset` |
//! | network parameter | `governance.proposal.updateNetParam` |
//! | freeform | `governance.proposal.freeform` |
//! | new and cancel transfer | `governance.proposal.transfer` |
//! | referral program | `governance.proposal.referralProgram` |
//! | volume discount program | `governance.proposal.VolumeDiscountProgram` |
//! | volume rebate program | `governance.proposal.volumeRebateProgram` |
//! | automated purchase | `governance.proposal.automatedPurchaseConfig` |

use std::time::Duration;

use tradegov_common::Decimal;

use crate::collaborators::NetParams;
use crate::error::{CollaboratorError, GovernanceError, Result};
use crate::types::ProposalChange;

/// Network parameter keys read outside the per-type prefixes.
pub mod keys {
    pub const MARKET_AUCTION_MIN_DURATION: &str = "market.auction.minimumDuration";
    pub const MARKET_AUCTION_MAX_DURATION: &str = "market.auction.maximumDuration";
    pub const MARKET_MARGIN_SCALING_FACTORS: &str = "market.margin.scalingFactors";
    pub const MARKET_FEE_TREASURY: &str = "market.fee.factors.treasuryFee";
    pub const MARKET_FEE_BUYBACK: &str = "market.fee.factors.buybackFee";
    pub const MARKET_MIN_ENACT: &str = "governance.proposal.market.minEnact";
    pub const ETHEREUM_CONFIG: &str = "blockchains.ethereumConfig";
    pub const ETHEREUM_L2_CONFIGS: &str = "blockchains.ethereumL2Configs";
    pub const REFERRAL_MAX_TIERS: &str = "referralProgram.maxReferralTiers";
    pub const REFERRAL_MAX_REWARD_FACTOR: &str = "referralProgram.maxReferralRewardFactor";
    pub const REFERRAL_MAX_DISCOUNT_FACTOR: &str = "referralProgram.maxReferralDiscountFactor";
    pub const VOLUME_DISCOUNT_MAX_TIERS: &str = "volumeDiscountProgram.maxBenefitTiers";
    pub const VOLUME_DISCOUNT_MAX_FACTOR: &str = "volumeDiscountProgram.maxVolumeDiscountFactor";
    pub const VOLUME_REBATE_MAX_TIERS: &str = "volumeRebateProgram.maxBenefitTiers";
}

const MARKET: &str = "governance.proposal.market";
const UPDATE_MARKET: &str = "governance.proposal.updateMarket";
const ASSET: &str = "governance.proposal.asset";
const UPDATE_ASSET: &str = "governance.proposal.updateAsset";
const UPDATE_NET_PARAM: &str = "governance.proposal.updateNetParam";
const FREEFORM: &str = "governance.proposal.freeform";
const TRANSFER: &str = "governance.proposal.transfer";
const REFERRAL_PROGRAM: &str = "governance.proposal.referralProgram";
const VOLUME_DISCOUNT_PROGRAM: &str = "governance.proposal.VolumeDiscountProgram";
const VOLUME_REBATE_PROGRAM: &str = "governance.proposal.volumeRebateProgram";
const AUTOMATED_PURCHASE: &str = "governance.proposal.automatedPurchaseConfig";

const PREFIXES: [&str; 11] = [
    MARKET,
    UPDATE_MARKET,
    ASSET,
    UPDATE_ASSET,
    UPDATE_NET_PARAM,
    FREEFORM,
    TRANSFER,
    REFERRAL_PROGRAM,
    VOLUME_DISCOUNT_PROGRAM,
    VOLUME_REBATE_PROGRAM,
    AUTOMATED_PURCHASE,
];

/// Thresholds governing one proposal type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalParameters {
    pub min_close: Duration,
    pub max_close: Duration,
    pub min_enact: Duration,
    pub max_enact: Duration,
    pub required_participation: Decimal,
    pub required_majority: Decimal,
    pub min_proposer_balance: u128,
    pub min_voter_balance: u128,
    /// Market updates only.
    pub required_participation_lp: Decimal,
    pub required_majority_lp: Decimal,
    pub min_equity_like_share: Decimal,
}

fn prefix_for(change: &ProposalChange) -> &'static str {
    match change {
        ProposalChange::NewMarket(_) | ProposalChange::NewSpotMarket(_) => MARKET,
        ProposalChange::UpdateMarket(_)
        | ProposalChange::UpdateSpotMarket(_)
        | ProposalChange::UpdateMarketState(_) => UPDATE_MARKET,
        ProposalChange::NewAsset(_) => ASSET,
        ProposalChange::UpdateAsset(_) => UPDATE_ASSET,
        ProposalChange::UpdateNetworkParameter(_) => UPDATE_NET_PARAM,
        ProposalChange::NewFreeform(_) => FREEFORM,
        ProposalChange::NewTransfer(_) | ProposalChange::CancelTransfer(_) => TRANSFER,
        ProposalChange::UpdateReferralProgram(_) => REFERRAL_PROGRAM,
        ProposalChange::UpdateVolumeDiscountProgram(_) => VOLUME_DISCOUNT_PROGRAM,
        ProposalChange::UpdateVolumeRebateProgram(_) => VOLUME_REBATE_PROGRAM,
        ProposalChange::NewProtocolAutomatedPurchase(_) => AUTOMATED_PURCHASE,
    }
}

fn lookup<T>(key: String, r: std::result::Result<T, CollaboratorError>) -> Result<T> {
    r.map_err(|e| GovernanceError::NetworkParameter {
        key,
        message: e.to_string(),
    })
}

/// Resolves the thresholds for `change`.
///
/// An absent change is not a proposal type the engine knows about.
pub fn proposal_parameters(
    netp: &dyn NetParams,
    change: Option<&ProposalChange>,
) -> Result<ProposalParameters> {
    let change = change.ok_or(GovernanceError::UnsupportedProposalType)?;
    let prefix = prefix_for(change);
    let key = |suffix: &str| format!("{prefix}.{suffix}");

    let duration = |suffix: &str| {
        let k = key(suffix);
        let v = netp.get_duration(&k);
        lookup(k, v)
    };
    let decimal = |suffix: &str| {
        let k = key(suffix);
        let v = netp.get_decimal(&k);
        lookup(k, v)
    };
    let uint = |suffix: &str| {
        let k = key(suffix);
        let v = netp.get_uint(&k);
        lookup(k, v)
    };

    let mut params = ProposalParameters {
        min_close: duration("minClose")?,
        max_close: duration("maxClose")?,
        min_enact: duration("minEnact")?,
        max_enact: duration("maxEnact")?,
        required_participation: decimal("requiredParticipation")?,
        required_majority: decimal("requiredMajority")?,
        min_proposer_balance: uint("minProposerBalance")?,
        min_voter_balance: uint("minVoterBalance")?,
        required_participation_lp: Decimal::ZERO,
        required_majority_lp: Decimal::ZERO,
        min_equity_like_share: Decimal::ZERO,
    };

    if prefix == UPDATE_MARKET {
        params.required_participation_lp = decimal("requiredParticipationLP")?;
        params.required_majority_lp = decimal("requiredMajorityLP")?;
        params.min_equity_like_share = decimal("minProposerEquityLikeShare")?;
    }

    Ok(params)
}

/// Canonical defaults for every key the engine reads.
pub fn default_network_parameters() -> Vec<(String, String)> {
    let mut out = Vec::new();
    for prefix in PREFIXES {
        let (min_period, participation) = if prefix == REFERRAL_PROGRAM {
            ("120h", "0.01")
        } else {
            ("48h", "0.00001")
        };
        let entries = [
            ("minClose", min_period),
            ("maxClose", "8760h"),
            ("minEnact", min_period),
            ("maxEnact", "8760h"),
            ("requiredParticipation", participation),
            ("requiredMajority", "0.66"),
            ("minProposerBalance", "1"),
            ("minVoterBalance", "1"),
        ];
        for (suffix, value) in entries {
            out.push((format!("{prefix}.{suffix}"), value.to_string()));
        }
    }

    let extra = [
        ("governance.proposal.updateMarket.minProposerEquityLikeShare", "0.1"),
        ("governance.proposal.updateMarket.requiredParticipationLP", "0.00001"),
        ("governance.proposal.updateMarket.requiredMajorityLP", "0.66"),
        (keys::MARKET_AUCTION_MIN_DURATION, "30m"),
        (keys::MARKET_AUCTION_MAX_DURATION, "168h"),
        (
            keys::MARKET_MARGIN_SCALING_FACTORS,
            r#"{"search_level":"1.1","initial_margin":"1.2","collateral_release":"1.4"}"#,
        ),
        (keys::MARKET_FEE_TREASURY, "0"),
        (keys::MARKET_FEE_BUYBACK, "0"),
        (keys::ETHEREUM_CONFIG, r#"{"chain_id":"1"}"#),
        (keys::ETHEREUM_L2_CONFIGS, r#"{"configs":[]}"#),
        (keys::REFERRAL_MAX_TIERS, "10"),
        (keys::REFERRAL_MAX_REWARD_FACTOR, "1"),
        (keys::REFERRAL_MAX_DISCOUNT_FACTOR, "1"),
        (keys::VOLUME_DISCOUNT_MAX_TIERS, "10"),
        (keys::VOLUME_DISCOUNT_MAX_FACTOR, "1"),
        (keys::VOLUME_REBATE_MAX_TIERS, "10"),
    ];
    out.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::change::NewFreeform;
    use crate::types::market::{MarketStateUpdate, MarketStateUpdateType};
    use std::collections::HashMap;

    struct Params(HashMap<String, String>);

    impl NetParams for Params {
        fn get(&self, key: &str) -> std::result::Result<String, CollaboratorError> {
            self.0
                .get(key)
                .cloned()
                .ok_or_else(|| CollaboratorError::NotFound(key.to_string()))
        }
        fn validate(&self, _: &str, _: &str) -> std::result::Result<(), CollaboratorError> {
            Ok(())
        }
        fn update(&self, _: &str, _: &str) -> std::result::Result<(), CollaboratorError> {
            Ok(())
        }
    }

    fn defaults() -> Params {
        Params(default_network_parameters().into_iter().collect())
    }

    #[test]
    fn test_missing_change_is_unsupported() {
        let err = proposal_parameters(&defaults(), None).unwrap_err();
        assert_eq!(err, GovernanceError::UnsupportedProposalType);
    }

    #[test]
    fn test_freeform_defaults() {
        let change = ProposalChange::NewFreeform(NewFreeform);
        let p = proposal_parameters(&defaults(), Some(&change)).unwrap();
        assert_eq!(p.min_close, Duration::from_secs(48 * 3600));
        assert_eq!(p.max_enact, Duration::from_secs(8760 * 3600));
        assert_eq!(p.required_majority, Decimal::new(66, 2));
        assert_eq!(p.min_proposer_balance, 1);
        assert!(p.required_majority_lp.is_zero());
    }

    #[test]
    fn test_market_state_update_reads_update_market_keys() {
        let change = ProposalChange::UpdateMarketState(MarketStateUpdate {
            market_id: "m".into(),
            update_type: MarketStateUpdateType::Suspend,
            price: None,
        });
        let p = proposal_parameters(&defaults(), Some(&change)).unwrap();
        assert_eq!(p.min_equity_like_share, Decimal::new(1, 1));
        assert_eq!(p.required_majority_lp, Decimal::new(66, 2));
    }

    #[test]
    fn test_lookup_failure_names_key() {
        let mut params = defaults();
        params.0.remove("governance.proposal.freeform.maxClose");
        let change = ProposalChange::NewFreeform(NewFreeform);
        match proposal_parameters(&params, Some(&change)).unwrap_err() {
            GovernanceError::NetworkParameter { key, .. } => {
                assert_eq!(key, "governance.proposal.freeform.maxClose")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
