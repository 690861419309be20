//! Reward program, automated purchase and freeform checks.

use tradegov_common::Decimal;

use crate::collaborators::{Markets, NetParams};
use crate::error::{GovernanceError, Rejection, ValidationResult};
use crate::params::keys;
use crate::types::market::{DataSourceDefinition, Product};
use crate::types::programs::{
    NewProtocolAutomatedPurchase, UpdateReferralProgram, UpdateVolumeDiscountProgram,
    UpdateVolumeRebateProgram,
};
use crate::types::{ProposalError, ProposalRationale};

fn param<T>(
    reason: ProposalError,
    key: &str,
    r: Result<T, crate::error::CollaboratorError>,
) -> Result<T, Rejection> {
    r.map_err(|e| {
        Rejection::new(
            reason,
            GovernanceError::NetworkParameter {
                key: key.to_string(),
                message: e.to_string(),
            },
        )
    })
}

fn check_tier_count(
    netp: &dyn NetParams,
    key: &str,
    count: usize,
    reason: ProposalError,
) -> ValidationResult {
    let max = param(reason, key, netp.get_uint(key))?;
    if count as u128 > max {
        return Err(Rejection::msg(
            reason,
            format!("the number of tiers in the proposal is higher than the maximum allowed by the network parameter \"{key}\": maximum is {max}, but got {count}"),
        ));
    }
    Ok(())
}

fn check_factor_ceiling(
    netp: &dyn NetParams,
    key: &str,
    tier: usize,
    factor: Decimal,
    what: &str,
    reason: ProposalError,
) -> ValidationResult {
    let max = param(reason, key, netp.get_decimal(key))?;
    if factor > max {
        return Err(Rejection::msg(
            reason,
            format!("tier {} defines a {what} higher than the maximum allowed by the network parameter \"{key}\": maximum is {max}, but got {factor}", tier + 1),
        ));
    }
    Ok(())
}

fn check_end_of_program(end: i64, enactment: i64, reason: ProposalError) -> ValidationResult {
    if end < enactment {
        return Err(Rejection::msg(
            reason,
            "the proposal must be enacted before the program ends",
        ));
    }
    Ok(())
}

pub fn validate_update_referral_program(
    netp: &dyn NetParams,
    p: &UpdateReferralProgram,
    enactment: i64,
) -> ValidationResult {
    let reason = ProposalError::InvalidReferralProgram;
    check_end_of_program(p.changes.end_of_program_timestamp, enactment, reason)?;
    check_tier_count(netp, keys::REFERRAL_MAX_TIERS, p.changes.benefit_tiers.len(), reason)?;
    for (i, tier) in p.changes.benefit_tiers.iter().enumerate() {
        check_factor_ceiling(
            netp,
            keys::REFERRAL_MAX_REWARD_FACTOR,
            i,
            tier.referral_reward_factor,
            "referral reward factor",
            reason,
        )?;
        check_factor_ceiling(
            netp,
            keys::REFERRAL_MAX_DISCOUNT_FACTOR,
            i,
            tier.referral_discount_factor,
            "referral discount factor",
            reason,
        )?;
    }
    Ok(())
}

pub fn validate_update_volume_discount_program(
    netp: &dyn NetParams,
    p: &UpdateVolumeDiscountProgram,
    enactment: i64,
) -> ValidationResult {
    let reason = ProposalError::InvalidVolumeDiscountProgram;
    check_end_of_program(p.changes.end_of_program_timestamp, enactment, reason)?;
    check_tier_count(
        netp,
        keys::VOLUME_DISCOUNT_MAX_TIERS,
        p.changes.benefit_tiers.len(),
        reason,
    )?;
    for (i, tier) in p.changes.benefit_tiers.iter().enumerate() {
        check_factor_ceiling(
            netp,
            keys::VOLUME_DISCOUNT_MAX_FACTOR,
            i,
            tier.volume_discount_factor,
            "volume discount factor",
            reason,
        )?;
    }
    Ok(())
}

pub fn validate_update_volume_rebate_program(
    netp: &dyn NetParams,
    p: &UpdateVolumeRebateProgram,
    enactment: i64,
) -> ValidationResult {
    let reason = ProposalError::InvalidVolumeRebateProgram;
    check_end_of_program(p.changes.end_of_program_timestamp, enactment, reason)?;
    check_tier_count(
        netp,
        keys::VOLUME_REBATE_MAX_TIERS,
        p.changes.benefit_tiers.len(),
        reason,
    )?;
    let treasury = param(reason, keys::MARKET_FEE_TREASURY, netp.get_decimal(keys::MARKET_FEE_TREASURY))?;
    let buyback = param(reason, keys::MARKET_FEE_BUYBACK, netp.get_decimal(keys::MARKET_FEE_BUYBACK))?;
    let max = treasury.saturating_add(buyback);
    for (i, tier) in p.changes.benefit_tiers.iter().enumerate() {
        if tier.additional_maker_rebate > max {
            return Err(Rejection::msg(
                reason,
                format!("tier {} defines an additional rebate factor higher than the maximum allowed by the network parameters: maximum is ({treasury}+{buyback}), but got {}", i + 1, tier.additional_maker_rebate),
            ));
        }
    }
    Ok(())
}

pub fn validate_new_protocol_automated_purchase(
    markets: &dyn Markets,
    p: &NewProtocolAutomatedPurchase,
    enactment: i64,
) -> ValidationResult {
    let reason = ProposalError::InvalidProtocolAutomatedPurchase;
    let c = &p.changes;

    let market = markets
        .get_market(&c.market_id, false)
        .ok_or_else(|| Rejection::msg(reason, format!("market {} does not exist", c.market_id)))?;
    let Product::Spot(spot) = market.product() else {
        return Err(Rejection::msg(reason, "automated purchase requires a spot market"));
    };
    if c.from != spot.base_asset && c.from != spot.quote_asset {
        return Err(Rejection::msg(
            reason,
            format!("asset {} is not traded on market {}", c.from, c.market_id),
        ));
    }
    if c.minimum_auction_size == 0 {
        return Err(Rejection::msg(reason, "minimum auction size must be positive"));
    }
    if c.maximum_auction_size < c.minimum_auction_size {
        return Err(Rejection::msg(
            reason,
            "maximum auction size must not be smaller than the minimum",
        ));
    }
    if !c.oracle_offset_factor.is_positive() {
        return Err(Rejection::msg(reason, "oracle offset factor must be positive"));
    }
    if !c.price_oracle.is_external() {
        return Err(Rejection::msg(reason, "price oracle must be an external data source"));
    }
    for (schedule, what) in [
        (&c.auction_schedule, "auction schedule"),
        (&c.auction_volume_snapshot_schedule, "auction volume snapshot schedule"),
    ] {
        if !matches!(schedule, DataSourceDefinition::InternalTimeTrigger(_)) {
            return Err(Rejection::msg(reason, format!("{what} must be a time trigger")));
        }
    }
    if c.auction_duration_secs <= 0 {
        return Err(Rejection::msg(reason, "auction duration must be positive"));
    }
    if c.expiry_timestamp != 0 && c.expiry_timestamp <= enactment {
        return Err(Rejection::msg(reason, "expiry must be after enactment"));
    }
    Ok(())
}

pub fn validate_freeform(rationale: &ProposalRationale) -> ValidationResult {
    if rationale.description.trim().is_empty() {
        return Err(Rejection::msg(
            ProposalError::InvalidFreeform,
            "freeform proposal requires a description",
        ));
    }
    Ok(())
}
