//! Market change validation: products, data sources and market-wide settings.

use std::time::Duration;

use tradegov_common::Decimal;

use super::{
    evm_chain_ids, validate_auction_duration, validate_liquidation_strategy,
    validate_lp_sla_params, validate_price_monitoring_triggers, validate_risk_parameters,
    validate_slippage_factor, EnactmentTime, ValidationContext,
};
use crate::error::{GovernanceError, Rejection, ValidationResult};
use crate::types::market::{
    DataSourceDefinition, DataSourceSpecBinding, FutureCap, FutureProduct, InstrumentConfiguration,
    LiquidationStrategy, Market, NewMarket, NewMarketConfiguration, NewSpotMarket,
    PerpsDataSourceBinding, PerpsProduct, Product, PropertyType, SpotProduct, UpdateFutureProduct,
    UpdateMarket, UpdatePerpsProduct, UpdateProduct, UpdateSpotMarket, BUILTIN_TIMESTAMP,
    BUILTIN_TIME_TRIGGER,
};
use crate::types::ProposalError;

// ════════════════════════════════════════════════════════════════════════════
// DEFAULTS
// ════════════════════════════════════════════════════════════════════════════

/// Fills in the values a new market proposal may leave implicit: the legacy
/// liquidation strategy and a perpetual's first settlement trigger, which
/// defaults to the enactment time.
pub fn apply_new_market_defaults(changes: &mut NewMarketConfiguration, enactment_secs: i64) {
    if changes.liquidation_strategy.is_none() {
        changes.liquidation_strategy = Some(LiquidationStrategy::legacy());
    }
    if let Some(Product::Perps(perps)) = changes.instrument.product.as_mut() {
        default_initial_trigger(&mut perps.data_source_spec_for_settlement_schedule, enactment_secs);
    }
}

pub fn apply_update_market_defaults(um: &mut UpdateMarket, enactment_secs: i64) {
    if let Some(UpdateProduct::Perps(perps)) = um.changes.instrument.product.as_mut() {
        default_initial_trigger(&mut perps.data_source_spec_for_settlement_schedule, enactment_secs);
    }
}

fn default_initial_trigger(def: &mut DataSourceDefinition, enactment_secs: i64) {
    if let DataSourceDefinition::InternalTimeTrigger(tt) = def {
        for trigger in tt.triggers.iter_mut() {
            if trigger.initial.is_none() {
                trigger.initial = Some(enactment_secs);
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// DATA SOURCES
// ════════════════════════════════════════════════════════════════════════════

fn check_chain_id(
    def: &DataSourceDefinition,
    chain_ids: &[u64],
    reason: ProposalError,
) -> ValidationResult {
    match def.source_chain_id() {
        Some(id) if !chain_ids.contains(&id) => Err(Rejection::msg(
            reason,
            "invalid source chain id in ethereum oracle spec",
        )),
        _ => Ok(()),
    }
}

fn check_settlement_source(
    def: &DataSourceDefinition,
    chain_ids: &[u64],
    reason: ProposalError,
) -> ValidationResult {
    check_chain_id(def, chain_ids, reason)?;
    if !def.has_content() {
        return Err(Rejection::msg(
            reason,
            "missing data source spec for settlement data",
        ));
    }
    if !def.is_external() {
        return Err(Rejection::msg(
            reason,
            "settlement with internal data source is not allowed",
        ));
    }
    Ok(())
}

fn check_termination_source(
    def: &DataSourceDefinition,
    chain_ids: &[u64],
    et: &EnactmentTime,
) -> ValidationResult {
    let reason = ProposalError::InvalidFutureProduct;
    check_chain_id(def, chain_ids, reason)?;
    if !def.has_content() {
        return Err(Rejection::msg(
            reason,
            "missing data source spec for trading termination",
        ));
    }
    if matches!(def, DataSourceDefinition::InternalTimeTrigger(_)) {
        return Err(Rejection::msg(
            reason,
            "setting internal time trigger for future termination is not allowed",
        ));
    }
    for filter in def.filters() {
        if filter.key.property_type != PropertyType::Timestamp {
            continue;
        }
        for cond in &filter.conditions {
            let v: i64 = cond.value.parse().map_err(|_| {
                Rejection::msg(reason, format!("invalid timestamp {:?}", cond.value))
            })?;
            if !et.should_not_verify && v <= et.current {
                return Err(Rejection::msg(
                    reason,
                    "data source spec termination time before enactment",
                ));
            }
        }
    }
    Ok(())
}

fn ensure_boundable(
    def: &DataSourceDefinition,
    property: &str,
    expected: &[PropertyType],
    what: &str,
    reason: ProposalError,
) -> ValidationResult {
    match def.property_type(property) {
        Some(t) if expected.contains(&t) => Ok(()),
        Some(t) => Err(Rejection::msg(
            reason,
            format!("invalid oracle spec binding for {what}: property {property:?} has type {t:?}"),
        )),
        None => Err(Rejection::msg(
            reason,
            format!("invalid oracle spec binding for {what}: property {property:?} is not filtered"),
        )),
    }
}

fn check_future_binding(
    binding: Option<&DataSourceSpecBinding>,
    settlement: &DataSourceDefinition,
    termination: &DataSourceDefinition,
) -> ValidationResult {
    let reason = ProposalError::InvalidFutureProduct;
    let binding = binding
        .ok_or_else(|| Rejection::msg(reason, "missing data source spec binding"))?;
    ensure_boundable(
        settlement,
        &binding.settlement_data_property,
        &[PropertyType::Decimal, PropertyType::Integer],
        "settlement data",
        reason,
    )?;
    let termination_types: &[PropertyType] =
        if binding.trading_termination_property == BUILTIN_TIMESTAMP {
            &[PropertyType::Timestamp]
        } else {
            &[PropertyType::Boolean, PropertyType::Timestamp]
        };
    ensure_boundable(
        termination,
        &binding.trading_termination_property,
        termination_types,
        "trading termination",
        reason,
    )
}

fn check_perps_schedule(
    schedule: &DataSourceDefinition,
    binding: Option<&PerpsDataSourceBinding>,
    settlement: &DataSourceDefinition,
    chain_ids: &[u64],
    et: &EnactmentTime,
    now_secs: i64,
) -> ValidationResult {
    let reason = ProposalError::InvalidPerpsProduct;
    check_chain_id(schedule, chain_ids, reason)?;
    if !schedule.has_content() {
        return Err(Rejection::msg(
            reason,
            "missing data source spec for settlement schedule",
        ));
    }
    let binding = binding
        .ok_or_else(|| Rejection::msg(reason, "missing data source spec binding"))?;
    ensure_boundable(
        settlement,
        &binding.settlement_data_property,
        &[PropertyType::Decimal, PropertyType::Integer],
        "settlement data",
        reason,
    )?;

    if binding.settlement_schedule_property != BUILTIN_TIME_TRIGGER {
        return Err(Rejection::msg(reason, "time trigger only supported for now"));
    }
    let DataSourceDefinition::InternalTimeTrigger(tt) = schedule else {
        return Err(Rejection::msg(
            reason,
            "settlement schedule must be an internal time trigger",
        ));
    };
    if tt.triggers.len() != 1 {
        return Err(Rejection::msg(
            reason,
            "invalid settlement schedule, only 1 trigger allowed",
        ));
    }
    let initial = tt.triggers[0].initial.unwrap_or(et.current);
    if initial < now_secs {
        return Err(Rejection::msg(reason, "time trigger starts in the past"));
    }
    ensure_boundable(
        schedule,
        &binding.settlement_schedule_property,
        &[PropertyType::Timestamp],
        "settlement schedule",
        reason,
    )
}

// ════════════════════════════════════════════════════════════════════════════
// PRODUCTS
// ════════════════════════════════════════════════════════════════════════════

fn validate_future_cap(cap: Option<&FutureCap>, tick_size: u128) -> ValidationResult {
    let Some(cap) = cap else {
        return Ok(());
    };
    let invalid = || {
        Rejection::msg(
            ProposalError::InvalidFutureProduct,
            "invalid capped future configuration: max price for capped future must be greater than zero",
        )
    };
    if cap.max_price == 0 {
        return Err(invalid());
    }
    if tick_size > 1 && cap.max_price % tick_size != 0 {
        return Err(invalid());
    }
    Ok(())
}

/// Asset used for settlement or as quote: decimals must fit the asset's.
pub fn validate_asset(
    ctx: &ValidationContext<'_>,
    asset_id: &str,
    decimals: u64,
    position_decimals: i64,
) -> ValidationResult {
    if asset_id.is_empty() {
        return Err(Rejection::msg(ProposalError::InvalidAsset, "missing asset ID"));
    }
    if !ctx.deep_check {
        return Ok(());
    }
    let asset = ctx
        .assets
        .get(asset_id)
        .map_err(|e| Rejection::new(ProposalError::InvalidAsset, e.into()))?;
    if !ctx.assets.is_enabled(asset_id) {
        return Err(Rejection::msg(
            ProposalError::InvalidAsset,
            format!("asset is not enabled {asset_id}"),
        ));
    }
    let total = i128::from(decimals) + i128::from(position_decimals);
    if total > i128::from(asset.details.decimals) {
        return Err(Rejection::msg(
            ProposalError::TooManyMarketDecimalPlaces,
            "market decimal + position decimals must be less than or equal to asset decimals",
        ));
    }
    Ok(())
}

/// Spot base asset: only the size decimals are bound by it.
fn validate_asset_basic(
    ctx: &ValidationContext<'_>,
    asset_id: &str,
    position_decimals: i64,
) -> ValidationResult {
    if asset_id.is_empty() {
        return Err(Rejection::msg(ProposalError::InvalidAsset, "missing asset ID"));
    }
    if !ctx.deep_check {
        return Ok(());
    }
    let asset = ctx
        .assets
        .get(asset_id)
        .map_err(|e| Rejection::new(ProposalError::InvalidAsset, e.into()))?;
    if !ctx.assets.is_enabled(asset_id) {
        return Err(Rejection::msg(
            ProposalError::InvalidAsset,
            format!("asset is not enabled {asset_id}"),
        ));
    }
    if i128::from(position_decimals) > i128::from(asset.details.decimals) {
        return Err(Rejection::msg(
            ProposalError::InvalidSizeDecimalPlaces,
            "number of position decimal places must be less than or equal to the number base asset decimal places",
        ));
    }
    Ok(())
}

fn validate_future(
    ctx: &ValidationContext<'_>,
    future: &FutureProduct,
    decimals: u64,
    position_decimals: i64,
    et: &EnactmentTime,
    chain_ids: &[u64],
    tick_size: u128,
) -> ValidationResult {
    check_settlement_source(
        &future.data_source_spec_for_settlement_data,
        chain_ids,
        ProposalError::InvalidFutureProduct,
    )?;
    check_termination_source(&future.data_source_spec_for_trading_termination, chain_ids, et)?;
    check_future_binding(
        future.data_source_spec_binding.as_ref(),
        &future.data_source_spec_for_settlement_data,
        &future.data_source_spec_for_trading_termination,
    )?;
    validate_future_cap(future.cap.as_ref(), tick_size)?;
    validate_asset(ctx, &future.settlement_asset, decimals, position_decimals)
}

fn validate_perps(
    ctx: &ValidationContext<'_>,
    perps: &PerpsProduct,
    decimals: u64,
    position_decimals: i64,
    et: &EnactmentTime,
    chain_ids: &[u64],
) -> ValidationResult {
    check_settlement_source(
        &perps.data_source_spec_for_settlement_data,
        chain_ids,
        ProposalError::InvalidPerpsProduct,
    )?;
    check_perps_schedule(
        &perps.data_source_spec_for_settlement_schedule,
        perps.data_source_spec_binding.as_ref(),
        &perps.data_source_spec_for_settlement_data,
        chain_ids,
        et,
        ctx.now.unix(),
    )?;
    validate_asset(ctx, &perps.settlement_asset, decimals, position_decimals)
}

fn validate_spot(
    ctx: &ValidationContext<'_>,
    spot: &SpotProduct,
    decimals: u64,
    position_decimals: i64,
) -> ValidationResult {
    validate_asset(ctx, &spot.quote_asset, decimals, position_decimals)?;
    validate_asset_basic(ctx, &spot.base_asset, position_decimals)
}

fn validate_new_instrument(
    ctx: &ValidationContext<'_>,
    instrument: &InstrumentConfiguration,
    decimals: u64,
    position_decimals: i64,
    et: &EnactmentTime,
    chain_ids: &[u64],
    tick_size: u128,
) -> ValidationResult {
    match &instrument.product {
        None => Err(Rejection::msg(ProposalError::NoProduct, "missing product")),
        Some(Product::Future(f)) => {
            validate_future(ctx, f, decimals, position_decimals, et, chain_ids, tick_size)
        }
        Some(Product::Perps(p)) => validate_perps(ctx, p, decimals, position_decimals, et, chain_ids),
        Some(Product::Spot(s)) => validate_spot(ctx, s, decimals, position_decimals),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// NEW MARKETS
// ════════════════════════════════════════════════════════════════════════════

fn validate_insurance_pool_fraction(frac: Decimal) -> ValidationResult {
    if frac.is_negative() || frac > Decimal::ONE {
        return Err(Rejection::msg(
            ProposalError::InvalidSuccessorMarket,
            format!("insurance pool fraction should be in range 0-1, was {frac}"),
        ));
    }
    Ok(())
}

fn validate_parent_product(nm: &NewMarket, parent: &Market) -> ValidationResult {
    let proposed = nm.changes.instrument.product.as_ref().and_then(Product::future);
    let (Some(proposed), Some(existing)) = (proposed, parent.future()) else {
        return Err(Rejection::msg(
            ProposalError::InvalidSuccessorMarket,
            "parent and successor markets must both be future markets",
        ));
    };
    if proposed.settlement_asset != existing.settlement_asset {
        return Err(Rejection::msg(
            ProposalError::InvalidSuccessorMarket,
            format!("successor market must use asset {}", existing.settlement_asset),
        ));
    }
    if proposed.quote_name != existing.quote_name {
        return Err(Rejection::msg(
            ProposalError::InvalidSuccessorMarket,
            format!("successor market must use quote name {}", existing.quote_name),
        ));
    }
    Ok(())
}

/// Successor checks. A restored successor may have lost its parent, which
/// is fine.
pub fn validate_successor_market(
    nm: &NewMarket,
    parent: Option<&Market>,
    restore: bool,
) -> ValidationResult {
    let Some(successor) = nm.successor() else {
        return Ok(());
    };
    let Some(parent) = parent else {
        if restore {
            return Ok(());
        }
        return Err(Rejection::new(
            ProposalError::InvalidSuccessorMarket,
            GovernanceError::ParentMarketDoesNotExist,
        ));
    };
    validate_insurance_pool_fraction(successor.insurance_pool_fraction)?;
    validate_parent_product(nm, parent)
}

pub fn validate_new_market_change(
    ctx: &ValidationContext<'_>,
    nm: &NewMarket,
    opening_auction: Duration,
    et: &EnactmentTime,
    parent: Option<&Market>,
    restore: bool,
) -> ValidationResult {
    let changes = &nm.changes;
    let chain_ids = evm_chain_ids(ctx.netp)?;
    validate_new_instrument(
        ctx,
        &changes.instrument,
        changes.decimal_places,
        changes.position_decimal_places,
        et,
        &chain_ids,
        changes.tick_size,
    )?;
    if !et.cp_load {
        validate_auction_duration(opening_auction, ctx.netp)?;
    }
    validate_successor_market(nm, parent, restore)?;
    validate_risk_parameters(changes.risk_parameters.as_ref())?;
    if let Some(pm) = &changes.price_monitoring_parameters {
        validate_price_monitoring_triggers(pm.triggers.len(), ctx.limits)?;
    }
    validate_lp_sla_params(changes.liquidity_sla_parameters.as_ref(), ctx.limits)?;
    validate_slippage_factor(changes.linear_slippage_factor, true, ctx.limits)?;
    validate_slippage_factor(changes.quadratic_slippage_factor, false, ctx.limits)?;
    // The implied legacy strategy is accepted as is.
    match &changes.liquidation_strategy {
        Some(ls) if *ls == LiquidationStrategy::legacy() => Ok(()),
        ls => validate_liquidation_strategy(ls.as_ref()),
    }
}

pub fn validate_new_spot_market_change(
    ctx: &ValidationContext<'_>,
    nsm: &NewSpotMarket,
    opening_auction: Duration,
    et: &EnactmentTime,
) -> ValidationResult {
    let changes = &nsm.changes;
    let chain_ids = evm_chain_ids(ctx.netp)?;
    validate_new_instrument(
        ctx,
        &changes.instrument,
        changes.price_decimal_places,
        changes.size_decimal_places,
        et,
        &chain_ids,
        changes.tick_size,
    )?;
    validate_auction_duration(opening_auction, ctx.netp)?;
    if let Some(pm) = &changes.price_monitoring_parameters {
        validate_price_monitoring_triggers(pm.triggers.len(), ctx.limits)?;
    }
    validate_risk_parameters(changes.risk_parameters.as_ref())?;
    validate_lp_sla_params(changes.sla_params.as_ref(), ctx.limits)
}

// ════════════════════════════════════════════════════════════════════════════
// MARKET UPDATES
// ════════════════════════════════════════════════════════════════════════════

fn different_product(reason: ProposalError) -> Rejection {
    Rejection::msg(reason, "cannot update a market to a different product type")
}

fn validate_update_future(
    future: &UpdateFutureProduct,
    market: &Market,
    et: &EnactmentTime,
    chain_ids: &[u64],
) -> ValidationResult {
    if market.future().is_none() {
        return Err(different_product(ProposalError::InvalidFutureProduct));
    }
    check_settlement_source(
        &future.data_source_spec_for_settlement_data,
        chain_ids,
        ProposalError::InvalidFutureProduct,
    )?;
    check_termination_source(&future.data_source_spec_for_trading_termination, chain_ids, et)?;
    check_future_binding(
        future.data_source_spec_binding.as_ref(),
        &future.data_source_spec_for_settlement_data,
        &future.data_source_spec_for_trading_termination,
    )
}

fn validate_update_perps(
    perps: &UpdatePerpsProduct,
    market: &Market,
    et: &EnactmentTime,
    now_secs: i64,
    chain_ids: &[u64],
) -> ValidationResult {
    if !matches!(market.product(), Product::Perps(_)) {
        return Err(different_product(ProposalError::InvalidPerpsProduct));
    }
    check_settlement_source(
        &perps.data_source_spec_for_settlement_data,
        chain_ids,
        ProposalError::InvalidPerpsProduct,
    )?;
    check_perps_schedule(
        &perps.data_source_spec_for_settlement_schedule,
        perps.data_source_spec_binding.as_ref(),
        &perps.data_source_spec_for_settlement_data,
        chain_ids,
        et,
        now_secs,
    )
}

pub fn validate_update_market_change(
    ctx: &ValidationContext<'_>,
    um: &UpdateMarket,
    market: &Market,
    et: &EnactmentTime,
) -> ValidationResult {
    let changes = &um.changes;
    let chain_ids = evm_chain_ids(ctx.netp)?;
    match &changes.instrument.product {
        None => return Err(Rejection::msg(ProposalError::NoProduct, "missing product")),
        Some(UpdateProduct::Future(f)) => validate_update_future(f, market, et, &chain_ids)?,
        Some(UpdateProduct::Perps(p)) => {
            validate_update_perps(p, market, et, ctx.now.unix(), &chain_ids)?
        }
    }
    validate_risk_parameters(changes.risk_parameters.as_ref())?;
    validate_lp_sla_params(changes.liquidity_sla_parameters.as_ref(), ctx.limits)?;
    validate_slippage_factor(changes.linear_slippage_factor, true, ctx.limits)?;
    validate_slippage_factor(changes.quadratic_slippage_factor, false, ctx.limits)?;
    validate_liquidation_strategy(changes.liquidation_strategy.as_ref())
}

pub fn validate_update_spot_market_change(
    ctx: &ValidationContext<'_>,
    usm: &UpdateSpotMarket,
) -> ValidationResult {
    validate_risk_parameters(usm.changes.risk_parameters.as_ref())?;
    validate_lp_sla_params(usm.changes.sla_params.as_ref(), ctx.limits)
}
