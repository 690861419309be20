//! # Market Proposal Types
//!
//! Configuration carried by new/update market proposals, and the materialized
//! [`Market`] handed to the execution engine.
//!
//! | Type | Role |
//! |------|------|
//! | `DataSourceDefinition` | Oracle or internal time source plus filters |
//! | `Product` | Future, perpetual or spot product definition |
//! | `RiskParameters` | Simple or log-normal risk model |
//! | `NewMarketConfiguration` | Full derivative market proposal |
//! | `NewSpotMarketConfiguration` | Spot market proposal |
//! | `UpdateMarketConfiguration` | Changes to an existing derivative market |
//! | `Market` | Market object built from a proposal |

use serde::{Deserialize, Serialize};
use tradegov_common::Decimal;

/// Property key of the builtin timestamp source.
pub const BUILTIN_TIMESTAMP: &str = "vegaprotocol.builtin.timestamp";
/// Property key of the builtin time-trigger source.
pub const BUILTIN_TIME_TRIGGER: &str = "vegaprotocol.builtin.timetrigger";

// ════════════════════════════════════════════════════════════════════════════
// DATA SOURCES
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Empty,
    Integer,
    String,
    Boolean,
    Decimal,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    Equals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyKey {
    pub name: String,
    pub property_type: PropertyType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceFilter {
    pub key: PropertyKey,
    pub conditions: Vec<Condition>,
}

/// Data pushed by external signers, optionally read from an EVM chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDataSource {
    pub signers: Vec<String>,
    /// Set when the data is read from an EVM chain contract.
    pub source_chain_id: Option<u64>,
    pub filters: Vec<DataSourceFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTrigger {
    /// First trigger, unix seconds. Defaults to the enactment time.
    pub initial: Option<i64>,
    /// Period between triggers in seconds.
    pub every: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTriggerConfiguration {
    pub triggers: Vec<TimeTrigger>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceDefinition {
    /// No content; only valid where the source is optional.
    Empty,
    External(ExternalDataSource),
    /// Fires on the builtin block timestamp.
    InternalTime { conditions: Vec<Condition> },
    InternalTimeTrigger(TimeTriggerConfiguration),
}

impl DataSourceDefinition {
    pub fn has_content(&self) -> bool {
        !matches!(self, DataSourceDefinition::Empty)
    }

    pub fn is_external(&self) -> bool {
        matches!(self, DataSourceDefinition::External(_))
    }

    /// Filters the source applies, including the implicit builtin ones of
    /// internal sources.
    pub fn filters(&self) -> Vec<DataSourceFilter> {
        match self {
            DataSourceDefinition::Empty => Vec::new(),
            DataSourceDefinition::External(ext) => ext.filters.clone(),
            DataSourceDefinition::InternalTime { conditions } => vec![DataSourceFilter {
                key: PropertyKey {
                    name: BUILTIN_TIMESTAMP.to_string(),
                    property_type: PropertyType::Timestamp,
                },
                conditions: conditions.clone(),
            }],
            DataSourceDefinition::InternalTimeTrigger(tt) => vec![DataSourceFilter {
                key: PropertyKey {
                    name: BUILTIN_TIME_TRIGGER.to_string(),
                    property_type: PropertyType::Timestamp,
                },
                conditions: tt.conditions.clone(),
            }],
        }
    }

    /// Type of the filtered property `name`, if the source filters on it.
    pub fn property_type(&self, name: &str) -> Option<PropertyType> {
        self.filters()
            .into_iter()
            .find(|f| f.key.name == name)
            .map(|f| f.key.property_type)
    }

    pub fn source_chain_id(&self) -> Option<u64> {
        match self {
            DataSourceDefinition::External(ext) => ext.source_chain_id,
            _ => None,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// PRODUCTS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceSpecBinding {
    pub settlement_data_property: String,
    pub trading_termination_property: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpsDataSourceBinding {
    pub settlement_data_property: String,
    pub settlement_schedule_property: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureCap {
    pub max_price: u128,
    pub binary_settlement: bool,
    pub fully_collateralised: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureProduct {
    pub settlement_asset: String,
    pub quote_name: String,
    pub data_source_spec_for_settlement_data: DataSourceDefinition,
    pub data_source_spec_for_trading_termination: DataSourceDefinition,
    pub data_source_spec_binding: Option<DataSourceSpecBinding>,
    pub cap: Option<FutureCap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpsProduct {
    pub settlement_asset: String,
    pub quote_name: String,
    pub margin_funding_factor: Decimal,
    pub interest_rate: Decimal,
    pub clamp_lower_bound: Decimal,
    pub clamp_upper_bound: Decimal,
    pub data_source_spec_for_settlement_data: DataSourceDefinition,
    pub data_source_spec_for_settlement_schedule: DataSourceDefinition,
    pub data_source_spec_binding: Option<PerpsDataSourceBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotProduct {
    pub base_asset: String,
    pub quote_asset: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Product {
    Future(FutureProduct),
    Perps(PerpsProduct),
    Spot(SpotProduct),
}

impl Product {
    pub fn future(&self) -> Option<&FutureProduct> {
        match self {
            Product::Future(f) => Some(f),
            _ => None,
        }
    }

    /// Assets the product settles or trades in.
    pub fn assets(&self) -> Vec<&str> {
        match self {
            Product::Future(f) => vec![f.settlement_asset.as_str()],
            Product::Perps(p) => vec![p.settlement_asset.as_str()],
            Product::Spot(s) => vec![s.base_asset.as_str(), s.quote_asset.as_str()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfiguration {
    pub name: String,
    pub code: String,
    pub product: Option<Product>,
}

// ════════════════════════════════════════════════════════════════════════════
// RISK, LIQUIDITY AND MONITORING
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleModelParams {
    pub factor_long: Decimal,
    pub factor_short: Decimal,
    pub max_move_up: Decimal,
    pub min_move_down: Decimal,
    pub probability_of_trading: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogNormalModelParams {
    pub mu: Decimal,
    pub r: Decimal,
    pub sigma: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogNormalRiskModel {
    pub risk_aversion_parameter: Decimal,
    pub tau: Decimal,
    pub params: Option<LogNormalModelParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskParameters {
    Simple(SimpleModelParams),
    LogNormal(LogNormalRiskModel),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMonitoringTrigger {
    /// Seconds.
    pub horizon: i64,
    pub probability: Decimal,
    /// Seconds.
    pub auction_extension: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMonitoringParameters {
    pub triggers: Vec<PriceMonitoringTrigger>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquiditySlaParams {
    pub price_range: Decimal,
    pub commitment_min_time_fraction: Decimal,
    pub performance_hysteresis_epochs: u64,
    pub sla_competition_factor: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationStrategy {
    pub disposal_time_step_secs: u64,
    pub disposal_fraction: Decimal,
    pub full_disposal_size: u64,
    pub max_fraction_consumed: Decimal,
    pub disposal_slippage: Decimal,
}

impl LiquidationStrategy {
    /// Strategy implied when a proposal does not specify one.
    pub fn legacy() -> Self {
        LiquidationStrategy {
            disposal_time_step_secs: 0,
            disposal_fraction: Decimal::ONE,
            full_disposal_size: u64::MAX,
            max_fraction_consumed: Decimal::ONE,
            disposal_slippage: Decimal::new(1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessorConfiguration {
    pub parent_market_id: String,
    pub insurance_pool_fraction: Decimal,
}

// ════════════════════════════════════════════════════════════════════════════
// PROPOSAL CONFIGURATIONS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMarketConfiguration {
    pub instrument: InstrumentConfiguration,
    pub decimal_places: u64,
    pub position_decimal_places: i64,
    pub metadata: Vec<String>,
    pub price_monitoring_parameters: Option<PriceMonitoringParameters>,
    pub risk_parameters: Option<RiskParameters>,
    pub linear_slippage_factor: Decimal,
    pub quadratic_slippage_factor: Decimal,
    pub liquidity_sla_parameters: Option<LiquiditySlaParams>,
    pub liquidation_strategy: Option<LiquidationStrategy>,
    pub successor: Option<SuccessorConfiguration>,
    pub tick_size: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMarket {
    pub changes: NewMarketConfiguration,
}

impl NewMarket {
    pub fn successor(&self) -> Option<&SuccessorConfiguration> {
        self.changes.successor.as_ref()
    }

    pub fn parent_market_id(&self) -> Option<&str> {
        self.successor().map(|s| s.parent_market_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpotMarketConfiguration {
    pub instrument: InstrumentConfiguration,
    pub price_decimal_places: u64,
    pub size_decimal_places: i64,
    pub metadata: Vec<String>,
    pub price_monitoring_parameters: Option<PriceMonitoringParameters>,
    pub risk_parameters: Option<RiskParameters>,
    pub sla_params: Option<LiquiditySlaParams>,
    pub tick_size: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpotMarket {
    pub changes: NewSpotMarketConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFutureProduct {
    pub quote_name: String,
    pub data_source_spec_for_settlement_data: DataSourceDefinition,
    pub data_source_spec_for_trading_termination: DataSourceDefinition,
    pub data_source_spec_binding: Option<DataSourceSpecBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePerpsProduct {
    pub quote_name: String,
    pub margin_funding_factor: Decimal,
    pub interest_rate: Decimal,
    pub clamp_lower_bound: Decimal,
    pub clamp_upper_bound: Decimal,
    pub data_source_spec_for_settlement_data: DataSourceDefinition,
    pub data_source_spec_for_settlement_schedule: DataSourceDefinition,
    pub data_source_spec_binding: Option<PerpsDataSourceBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateProduct {
    Future(UpdateFutureProduct),
    Perps(UpdatePerpsProduct),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInstrumentConfiguration {
    pub name: String,
    pub code: String,
    pub product: Option<UpdateProduct>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMarketConfiguration {
    pub instrument: UpdateInstrumentConfiguration,
    pub metadata: Vec<String>,
    pub price_monitoring_parameters: Option<PriceMonitoringParameters>,
    pub risk_parameters: Option<RiskParameters>,
    pub linear_slippage_factor: Decimal,
    pub quadratic_slippage_factor: Decimal,
    pub liquidity_sla_parameters: Option<LiquiditySlaParams>,
    pub liquidation_strategy: Option<LiquidationStrategy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMarket {
    pub market_id: String,
    pub changes: UpdateMarketConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSpotMarketConfiguration {
    pub metadata: Vec<String>,
    pub price_monitoring_parameters: Option<PriceMonitoringParameters>,
    pub risk_parameters: Option<RiskParameters>,
    pub sla_params: Option<LiquiditySlaParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSpotMarket {
    pub market_id: String,
    pub changes: UpdateSpotMarketConfiguration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStateUpdateType {
    Terminate,
    Suspend,
    Resume,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStateUpdate {
    pub market_id: String,
    pub update_type: MarketStateUpdateType,
    /// Final settlement price when terminating.
    pub price: Option<u128>,
}

// ════════════════════════════════════════════════════════════════════════════
// MATERIALIZED MARKET
// ════════════════════════════════════════════════════════════════════════════

/// Lifecycle state reported by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketState {
    Proposed,
    Pending,
    Active,
    Suspended,
    SuspendedViaGovernance,
    TradingTerminated,
    Settled,
    Cancelled,
    Rejected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginScalingFactors {
    pub search_level: Decimal,
    pub initial_margin: Decimal,
    pub collateral_release: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    pub code: String,
    pub name: String,
    pub metadata: Vec<String>,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradableInstrument {
    pub instrument: Instrument,
    pub risk_model: RiskParameters,
    pub margin_scaling_factors: MarginScalingFactors,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub tradable_instrument: TradableInstrument,
    pub decimal_places: u64,
    pub position_decimal_places: i64,
    /// Opening auction length in seconds.
    pub opening_auction_duration: i64,
    pub price_monitoring: PriceMonitoringParameters,
    pub liquidity_sla_params: Option<LiquiditySlaParams>,
    pub linear_slippage_factor: Decimal,
    pub quadratic_slippage_factor: Decimal,
    pub liquidation_strategy: Option<LiquidationStrategy>,
    pub parent_market_id: Option<String>,
    pub insurance_pool_fraction: Decimal,
    pub tick_size: u128,
    pub state: MarketState,
}

impl Market {
    pub fn product(&self) -> &Product {
        &self.tradable_instrument.instrument.product
    }

    pub fn future(&self) -> Option<&FutureProduct> {
        self.product().future()
    }
}
