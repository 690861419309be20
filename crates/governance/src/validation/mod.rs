//! # Change Validation
//!
//! Per-change-type checks run before a proposal is accepted, and again for
//! some types when they are enacted. Every check is a pure function of the
//! change, the collaborators' current answers and the block time. A failed
//! check is a [`Rejection`], never a panic.
//!
//! ## Modules
//! - `market`: products, data sources, risk, liquidity and successor checks
//! - `asset`: new and updated asset details
//! - `netparam`: network parameter updates
//! - `programs`: referral, discount, rebate, automated purchase and freeform

pub mod asset;
pub mod market;
pub mod netparam;
pub mod programs;

use std::time::Duration;

use serde::Deserialize;
use tradegov_common::config::ValidationLimits;
use tradegov_common::{Decimal, Timestamp};

use crate::collaborators::{get_json_struct, Assets, NetParams};
use crate::error::{GovernanceError, Rejection, ValidationResult};
use crate::params::keys;
use crate::types::market::{
    LiquidationStrategy, LiquiditySlaParams, LogNormalRiskModel, RiskParameters,
};
use crate::types::ProposalError;

/// Enactment context threaded through product validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnactmentTime {
    /// Unix seconds.
    pub current: i64,
    /// Skip the "after enactment" checks on termination timestamps.
    pub should_not_verify: bool,
    /// Loading from a checkpoint; auction bounds are not re-checked.
    pub cp_load: bool,
}

impl EnactmentTime {
    pub fn new(current: i64) -> Self {
        EnactmentTime {
            current,
            should_not_verify: false,
            cp_load: false,
        }
    }
}

/// Collaborators and bounds shared by the market checks.
#[derive(Clone, Copy)]
pub struct ValidationContext<'a> {
    pub assets: &'a dyn Assets,
    pub netp: &'a dyn NetParams,
    pub limits: &'a ValidationLimits,
    pub now: Timestamp,
    /// Also query the asset registry, not only the proposal itself.
    pub deep_check: bool,
}

#[derive(Debug, Deserialize)]
struct EthereumConfig {
    chain_id: String,
}

#[derive(Debug, Deserialize)]
struct EthereumL2Configs {
    configs: Vec<EthereumConfig>,
}

/// Chain IDs external data sources may read from: the primary Ethereum
/// chain followed by configured L2s.
pub fn evm_chain_ids(netp: &dyn NetParams) -> Result<Vec<u64>, Rejection> {
    let parse = |key: &str, raw: &str| {
        raw.parse::<u64>().map_err(|e| {
            Rejection::new(
                ProposalError::Unspecified,
                GovernanceError::NetworkParameter {
                    key: key.to_string(),
                    message: format!("invalid chain id {raw:?}: {e}"),
                },
            )
        })
    };
    let as_rejection = |key: &str, e: crate::error::CollaboratorError| {
        Rejection::new(
            ProposalError::Unspecified,
            GovernanceError::NetworkParameter {
                key: key.to_string(),
                message: e.to_string(),
            },
        )
    };

    let primary: EthereumConfig = get_json_struct(netp, keys::ETHEREUM_CONFIG)
        .map_err(|e| as_rejection(keys::ETHEREUM_CONFIG, e))?;
    let mut ids = vec![parse(keys::ETHEREUM_CONFIG, &primary.chain_id)?];

    let l2: EthereumL2Configs = get_json_struct(netp, keys::ETHEREUM_L2_CONFIGS)
        .map_err(|e| as_rejection(keys::ETHEREUM_L2_CONFIGS, e))?;
    for cfg in l2.configs {
        ids.push(parse(keys::ETHEREUM_L2_CONFIGS, &cfg.chain_id)?);
    }
    Ok(ids)
}

fn in_range(v: Decimal, lo: Decimal, hi: Decimal) -> bool {
    v >= lo && v <= hi
}

fn validate_log_normal(lnm: &LogNormalRiskModel) -> ValidationResult {
    let invalid = || Rejection::msg(ProposalError::InvalidRiskParameter, "invalid risk parameter");
    let params = lnm.params.as_ref().ok_or_else(invalid)?;

    let ok = in_range(lnm.risk_aversion_parameter, Decimal::new(1, 8), Decimal::new(1, 1))
        && in_range(lnm.tau, Decimal::new(1, 8), Decimal::ONE)
        && in_range(params.mu, Decimal::new(-1, 6), Decimal::new(1, 6))
        && in_range(params.r, Decimal::from_i64(-1), Decimal::ONE)
        && in_range(params.sigma, Decimal::new(1, 3), Decimal::from_i64(50));
    if ok {
        Ok(())
    } else {
        Err(invalid())
    }
}

pub fn validate_risk_parameters(rp: Option<&RiskParameters>) -> ValidationResult {
    match rp {
        None => Err(Rejection::msg(
            ProposalError::NoRiskParameters,
            "missing risk parameters",
        )),
        Some(RiskParameters::Simple(_)) => Ok(()),
        Some(RiskParameters::LogNormal(lnm)) => validate_log_normal(lnm),
    }
}

pub fn validate_liquidation_strategy(ls: Option<&LiquidationStrategy>) -> ValidationResult {
    let Some(ls) = ls else {
        return Ok(());
    };
    let fraction_ok = |d: Decimal| d.is_positive() && d <= Decimal::ONE;
    if !fraction_ok(ls.disposal_fraction) {
        return Err(Rejection::msg(
            ProposalError::InvalidMarket,
            "liquidation strategy disposal fraction must be in the 0-1 range and non-zero",
        ));
    }
    if !fraction_ok(ls.max_fraction_consumed) {
        return Err(Rejection::msg(
            ProposalError::InvalidMarket,
            "liquidation max fraction must be in the 0-1 range and non-zero",
        ));
    }
    if ls.disposal_time_step_secs < 1 {
        return Err(Rejection::msg(
            ProposalError::InvalidMarket,
            "liquidation strategy time step has to be 1s or more",
        ));
    }
    if ls.disposal_time_step_secs > 3600 {
        return Err(Rejection::msg(
            ProposalError::InvalidMarket,
            "liquidation strategy time step can't be more than 1h",
        ));
    }
    if !ls.disposal_slippage.is_positive() {
        return Err(Rejection::msg(
            ProposalError::InvalidMarket,
            "liquidation strategy must specify a disposal slippage range > 0",
        ));
    }
    Ok(())
}

pub fn validate_lp_sla_params(
    sla: Option<&LiquiditySlaParams>,
    limits: &ValidationLimits,
) -> ValidationResult {
    let Some(sla) = sla else {
        return Err(Rejection::msg(
            ProposalError::MissingSlaParams,
            "liquidity provision SLA must be provided",
        ));
    };
    let max_range = Decimal::from_u128(u128::from(limits.max_lp_price_range)).unwrap_or(Decimal::MAX);
    if !sla.price_range.is_positive() || sla.price_range > max_range {
        return Err(Rejection::msg(
            ProposalError::InvalidSlaParams,
            format!(
                "price range must be strictly greater than 0 and less than or equal to {}",
                limits.max_lp_price_range
            ),
        ));
    }
    if !in_range(sla.commitment_min_time_fraction, Decimal::ZERO, Decimal::ONE) {
        return Err(Rejection::msg(
            ProposalError::InvalidSlaParams,
            "commitment min time fraction must be in range [0, 1]",
        ));
    }
    if !in_range(sla.sla_competition_factor, Decimal::ZERO, Decimal::ONE) {
        return Err(Rejection::msg(
            ProposalError::InvalidSlaParams,
            "sla competition factor must be in range [0, 1]",
        ));
    }
    if sla.performance_hysteresis_epochs > limits.max_performance_hysteresis_epochs {
        return Err(Rejection::msg(
            ProposalError::InvalidSlaParams,
            format!(
                "provider performance hysteresis epochs must be at most {}",
                limits.max_performance_hysteresis_epochs
            ),
        ));
    }
    Ok(())
}

pub fn validate_auction_duration(proposed: Duration, netp: &dyn NetParams) -> ValidationResult {
    let min = netp
        .get_duration(keys::MARKET_AUCTION_MIN_DURATION)
        .unwrap_or(Duration::ZERO);
    if proposed < min {
        return Err(Rejection::msg(
            ProposalError::OpeningAuctionDurationTooSmall,
            format!(
                "proposal opening auction duration is too short, expected > {:?}, got {:?}",
                min, proposed
            ),
        ));
    }
    let max = netp
        .get_duration(keys::MARKET_AUCTION_MAX_DURATION)
        .unwrap_or(Duration::MAX);
    if proposed > max {
        return Err(Rejection::msg(
            ProposalError::OpeningAuctionDurationTooLarge,
            format!(
                "proposal opening auction duration is too long, expected < {:?}, got {:?}",
                max, proposed
            ),
        ));
    }
    Ok(())
}

pub fn validate_slippage_factor(
    factor: Decimal,
    linear: bool,
    limits: &ValidationLimits,
) -> ValidationResult {
    let reason = if linear {
        ProposalError::LinearSlippageOutOfRange
    } else {
        ProposalError::QuadraticSlippageOutOfRange
    };
    let max = Decimal::from_u128(u128::from(limits.max_slippage_factor)).unwrap_or(Decimal::MAX);
    if factor.is_negative() || factor > max {
        return Err(Rejection::msg(
            reason,
            format!(
                "proposal slippage factor has incorrect value, expected value in [0,{}], got {}",
                limits.max_slippage_factor, factor
            ),
        ));
    }
    Ok(())
}

pub fn validate_price_monitoring_triggers(count: usize, limits: &ValidationLimits) -> ValidationResult {
    if count > limits.max_price_monitoring_triggers {
        return Err(Rejection::msg(
            ProposalError::TooManyPriceMonitoringTriggers,
            format!(
                "{} price monitoring triggers set, maximum allowed is {}",
                count, limits.max_price_monitoring_triggers
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::market::LogNormalModelParams;

    fn log_normal(sigma: Decimal) -> RiskParameters {
        RiskParameters::LogNormal(LogNormalRiskModel {
            risk_aversion_parameter: Decimal::new(1, 2),
            tau: Decimal::new(1, 4),
            params: Some(LogNormalModelParams {
                mu: Decimal::ZERO,
                r: Decimal::new(16, 3),
                sigma,
            }),
        })
    }

    fn sla(price_range: Decimal) -> LiquiditySlaParams {
        LiquiditySlaParams {
            price_range,
            commitment_min_time_fraction: Decimal::new(5, 1),
            performance_hysteresis_epochs: 1,
            sla_competition_factor: Decimal::new(5, 1),
        }
    }

    #[test]
    fn test_risk_parameters() {
        assert!(validate_risk_parameters(Some(&log_normal(Decimal::new(3, 1)))).is_ok());

        let err = validate_risk_parameters(Some(&log_normal(Decimal::from_i64(51)))).unwrap_err();
        assert_eq!(err.reason, ProposalError::InvalidRiskParameter);

        let err = validate_risk_parameters(None).unwrap_err();
        assert_eq!(err.reason, ProposalError::NoRiskParameters);

        let missing = RiskParameters::LogNormal(LogNormalRiskModel {
            risk_aversion_parameter: Decimal::new(1, 2),
            tau: Decimal::new(1, 4),
            params: None,
        });
        let err = validate_risk_parameters(Some(&missing)).unwrap_err();
        assert_eq!(err.reason, ProposalError::InvalidRiskParameter);
    }

    #[test]
    fn test_sla_price_range_bounds() {
        let limits = ValidationLimits::default();
        assert!(validate_lp_sla_params(Some(&sla(Decimal::from_i64(100))), &limits).is_ok());
        for bad in [Decimal::ZERO, Decimal::from_i64(-1), Decimal::new(100_000_001, 6)] {
            let err = validate_lp_sla_params(Some(&sla(bad)), &limits).unwrap_err();
            assert_eq!(err.reason, ProposalError::InvalidSlaParams);
        }
        let err = validate_lp_sla_params(None, &limits).unwrap_err();
        assert_eq!(err.reason, ProposalError::MissingSlaParams);
    }

    #[test]
    fn test_slippage_bounds() {
        let limits = ValidationLimits::default();
        assert!(validate_slippage_factor(Decimal::from_i64(1_000_000), true, &limits).is_ok());
        let err = validate_slippage_factor(Decimal::from_i64(-1), true, &limits).unwrap_err();
        assert_eq!(err.reason, ProposalError::LinearSlippageOutOfRange);
        let err = validate_slippage_factor(Decimal::from_i64(1_000_001), false, &limits).unwrap_err();
        assert_eq!(err.reason, ProposalError::QuadraticSlippageOutOfRange);
    }

    #[test]
    fn test_liquidation_strategy_time_step() {
        let mut ls = LiquidationStrategy {
            disposal_time_step_secs: 10,
            disposal_fraction: Decimal::new(1, 1),
            full_disposal_size: 50,
            max_fraction_consumed: Decimal::new(5, 1),
            disposal_slippage: Decimal::new(1, 1),
        };
        assert!(validate_liquidation_strategy(Some(&ls)).is_ok());
        ls.disposal_time_step_secs = 3601;
        assert_eq!(
            validate_liquidation_strategy(Some(&ls)).unwrap_err().reason,
            ProposalError::InvalidMarket
        );
        assert!(validate_liquidation_strategy(None).is_ok());
    }
}
