//! Materializes [`Market`] objects from market proposals.
//!
//! The same functions serve submission (so the execution engine can create
//! the pending market) and enactment of market updates, so both paths build
//! identical objects from identical inputs.

use std::time::Duration;

use tradegov_common::Decimal;

use crate::collaborators::{get_json_struct, NetParams};
use crate::error::{GovernanceError, Rejection};
use crate::params::keys;
use crate::types::market::{
    Instrument, InstrumentConfiguration, MarginScalingFactors, Market, MarketState, NewMarket,
    NewSpotMarket, TradableInstrument,
};
use crate::types::ProposalError;

fn create_instrument(
    market_id: &str,
    cfg: &InstrumentConfiguration,
    metadata: &[String],
) -> Result<Instrument, Rejection> {
    let product = cfg
        .product
        .clone()
        .ok_or_else(|| Rejection::msg(ProposalError::NoProduct, "missing product"))?;
    Ok(Instrument {
        id: market_id.to_string(),
        code: cfg.code.clone(),
        name: cfg.name.clone(),
        metadata: metadata.to_vec(),
        product,
    })
}

/// Reads `market.margin.scalingFactors`, which must be strictly increasing.
pub fn margin_scaling_factors(netp: &dyn NetParams) -> Result<MarginScalingFactors, Rejection> {
    let factors: MarginScalingFactors = get_json_struct(netp, keys::MARKET_MARGIN_SCALING_FACTORS)
        .map_err(|e| {
            Rejection::new(
                ProposalError::CouldNotInstantiateMarket,
                GovernanceError::NetworkParameter {
                    key: keys::MARKET_MARGIN_SCALING_FACTORS.to_string(),
                    message: e.to_string(),
                },
            )
        })?;
    if !(factors.search_level < factors.initial_margin
        && factors.initial_margin < factors.collateral_release)
    {
        return Err(Rejection::msg(
            ProposalError::CouldNotInstantiateMarket,
            "margin scaling factors must satisfy search level < initial margin < collateral release",
        ));
    }
    Ok(factors)
}

fn auction_secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

pub fn build_market_from_proposal(
    market_id: &str,
    nm: &NewMarket,
    netp: &dyn NetParams,
    opening_auction: Duration,
) -> Result<Market, Rejection> {
    let changes = &nm.changes;
    let instrument = create_instrument(market_id, &changes.instrument, &changes.metadata)?;
    let margin_scaling_factors = margin_scaling_factors(netp)?;
    let risk_model = changes
        .risk_parameters
        .clone()
        .ok_or_else(|| Rejection::msg(ProposalError::NoRiskParameters, "missing risk parameters"))?;

    let (parent_market_id, insurance_pool_fraction) = match nm.successor() {
        Some(s) => (Some(s.parent_market_id.clone()), s.insurance_pool_fraction),
        None => (None, Decimal::ZERO),
    };

    Ok(Market {
        id: market_id.to_string(),
        tradable_instrument: TradableInstrument {
            instrument,
            risk_model,
            margin_scaling_factors,
        },
        decimal_places: changes.decimal_places,
        position_decimal_places: changes.position_decimal_places,
        opening_auction_duration: auction_secs(opening_auction),
        price_monitoring: changes.price_monitoring_parameters.clone().unwrap_or_default(),
        liquidity_sla_params: changes.liquidity_sla_parameters.clone(),
        linear_slippage_factor: changes.linear_slippage_factor,
        quadratic_slippage_factor: changes.quadratic_slippage_factor,
        liquidation_strategy: changes.liquidation_strategy.clone(),
        parent_market_id,
        insurance_pool_fraction,
        tick_size: changes.tick_size,
        state: MarketState::Proposed,
    })
}

pub fn build_spot_market_from_proposal(
    market_id: &str,
    nsm: &NewSpotMarket,
    opening_auction: Duration,
) -> Result<Market, Rejection> {
    let changes = &nsm.changes;
    let instrument = create_instrument(market_id, &changes.instrument, &changes.metadata)?;
    let risk_model = changes
        .risk_parameters
        .clone()
        .ok_or_else(|| Rejection::msg(ProposalError::NoRiskParameters, "missing risk parameters"))?;

    Ok(Market {
        id: market_id.to_string(),
        tradable_instrument: TradableInstrument {
            instrument,
            risk_model,
            margin_scaling_factors: MarginScalingFactors {
                search_level: Decimal::ZERO,
                initial_margin: Decimal::ZERO,
                collateral_release: Decimal::ZERO,
            },
        },
        decimal_places: changes.price_decimal_places,
        position_decimal_places: changes.size_decimal_places,
        opening_auction_duration: auction_secs(opening_auction),
        price_monitoring: changes.price_monitoring_parameters.clone().unwrap_or_default(),
        liquidity_sla_params: changes.sla_params.clone(),
        linear_slippage_factor: Decimal::ZERO,
        quadratic_slippage_factor: Decimal::ZERO,
        liquidation_strategy: None,
        parent_market_id: None,
        insurance_pool_fraction: Decimal::ZERO,
        tick_size: changes.tick_size,
        state: MarketState::Proposed,
    })
}
