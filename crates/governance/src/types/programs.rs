//! Reward program and protocol automated purchase proposal types.

use serde::{Deserialize, Serialize};
use tradegov_common::Decimal;

use super::market::DataSourceDefinition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralBenefitTier {
    pub minimum_running_notional_taker_volume: u128,
    pub minimum_epochs: u64,
    pub referral_reward_factor: Decimal,
    pub referral_discount_factor: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStakingTier {
    pub minimum_staked_tokens: u128,
    pub referral_reward_multiplier: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralProgramChanges {
    /// Unix seconds.
    pub end_of_program_timestamp: i64,
    pub window_length: u64,
    pub benefit_tiers: Vec<ReferralBenefitTier>,
    pub staking_tiers: Vec<ReferralStakingTier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReferralProgram {
    pub changes: ReferralProgramChanges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDiscountBenefitTier {
    pub minimum_running_notional_taker_volume: u128,
    pub volume_discount_factor: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDiscountProgramChanges {
    pub end_of_program_timestamp: i64,
    pub window_length: u64,
    pub benefit_tiers: Vec<VolumeDiscountBenefitTier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateVolumeDiscountProgram {
    pub changes: VolumeDiscountProgramChanges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRebateBenefitTier {
    pub minimum_party_maker_volume_fraction: Decimal,
    pub additional_maker_rebate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRebateProgramChanges {
    pub end_of_program_timestamp: i64,
    pub window_length: u64,
    pub benefit_tiers: Vec<VolumeRebateBenefitTier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateVolumeRebateProgram {
    pub changes: VolumeRebateProgramChanges,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Treasury,
    Buyback,
    NetworkTreasury,
    General,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatedPurchaseChanges {
    /// Asset sold by the protocol.
    pub from: String,
    pub from_account_type: AccountType,
    pub to_account_type: AccountType,
    /// Spot market the purchase trades on.
    pub market_id: String,
    pub price_oracle: DataSourceDefinition,
    pub oracle_offset_factor: Decimal,
    pub auction_schedule: DataSourceDefinition,
    pub auction_volume_snapshot_schedule: DataSourceDefinition,
    pub auction_duration_secs: i64,
    pub minimum_auction_size: u128,
    pub maximum_auction_size: u128,
    /// Unix seconds, zero for no expiry.
    pub expiry_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProtocolAutomatedPurchase {
    pub changes: AutomatedPurchaseChanges,
}
