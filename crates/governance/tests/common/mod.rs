//! Shared harness for governance integration tests.
//!
//! Every collaborator is an in-memory mock guarded by `parking_lot` locks so
//! tests can both drive the engine and inspect what it asked for.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tradegov_governance::collaborators::{
    Assets, Banking, Broker, Markets, NetParams, StakingAccounts, TimeService, Witness,
    WitnessCallback, WitnessResource,
};
use tradegov_governance::types::asset::{AssetDetails, AssetSource, BuiltinAsset, Erc20, NewAsset};
use tradegov_governance::types::market::{
    Condition, ConditionOperator, DataSourceDefinition, DataSourceFilter, DataSourceSpecBinding,
    ExternalDataSource, FutureProduct, Instrument, InstrumentConfiguration, LiquidationStrategy,
    LiquiditySlaParams, MarginScalingFactors, Market, MarketState, NewMarket,
    NewMarketConfiguration, NewSpotMarket, NewSpotMarketConfiguration, PriceMonitoringParameters,
    Product, PropertyKey, PropertyType, RiskParameters, SimpleModelParams, SpotProduct,
    SuccessorConfiguration, TradableInstrument, UpdateFutureProduct,
    UpdateInstrumentConfiguration, UpdateMarket, UpdateMarketConfiguration, UpdateProduct,
    BUILTIN_TIMESTAMP,
};
use tradegov_governance::types::transfer::GovernanceTransfer;
use tradegov_governance::types::{
    Asset, BatchProposalChange, BatchProposalSubmission, BatchProposalTerms, NetworkParameter,
    NewFreeform, Proposal, ProposalChange, ProposalRationale, ProposalSubmission, ProposalTerms,
    UpdateNetworkParameter, Vote, VoteSubmission, VoteValue,
};
use tradegov_common::time::parse_duration;
use tradegov_governance::params::{default_network_parameters, keys};
use tradegov_governance::{
    CollaboratorError, Collaborators, Config, Decimal, Engine, GovernanceEvent, Timestamp,
};

/// Block time every harness starts at, unix seconds.
pub const START: i64 = 1_700_000_000;
pub const HOUR: i64 = 3600;
pub const DAY: i64 = 24 * HOUR;

// ════════════════════════════════════════════════════════════════════════════
// MOCK COLLABORATORS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct TestAccounts {
    pub balances: Mutex<BTreeMap<String, u128>>,
    pub supply: Mutex<u128>,
}

impl StakingAccounts for TestAccounts {
    fn get_available_balance(&self, party: &str) -> Result<u128, CollaboratorError> {
        Ok(self.balances.lock().get(party).copied().unwrap_or(0))
    }

    fn get_staking_asset_total_supply(&self) -> u128 {
        *self.supply.lock()
    }
}

#[derive(Default)]
pub struct TestMarkets {
    pub markets: Mutex<BTreeMap<String, Market>>,
    pub els: Mutex<BTreeMap<(String, String), Decimal>>,
    pub succeeded: Mutex<BTreeSet<String>>,
    /// Markets the execution engine no longer knows about on restore.
    pub gone: Mutex<BTreeSet<String>>,
    pub restored: Mutex<Vec<String>>,
    pub auctions: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<Market>>,
}

impl Markets for TestMarkets {
    fn market_exists(&self, market_id: &str) -> bool {
        self.markets.lock().contains_key(market_id)
    }

    fn get_market(&self, market_id: &str, _settled_ok: bool) -> Option<Market> {
        self.markets.lock().get(market_id).cloned()
    }

    fn get_market_state(&self, market_id: &str) -> Result<MarketState, CollaboratorError> {
        self.markets
            .lock()
            .get(market_id)
            .map(|m| m.state)
            .ok_or(CollaboratorError::MarketDoesNotExist)
    }

    fn get_equity_like_share_for_market_and_party(&self, market_id: &str, party: &str) -> Decimal {
        self.els
            .lock()
            .get(&(market_id.to_string(), party.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn restore_market(&self, market: &Market) -> Result<(), CollaboratorError> {
        if self.gone.lock().contains(&market.id) {
            return Err(CollaboratorError::MarketDoesNotExist);
        }
        self.restored.lock().push(market.id.clone());
        self.markets.lock().insert(market.id.clone(), market.clone());
        Ok(())
    }

    fn start_opening_auction(&self, market_id: &str) -> Result<(), CollaboratorError> {
        self.auctions.lock().push(market_id.to_string());
        Ok(())
    }

    fn update_market(&self, market: &Market) -> Result<(), CollaboratorError> {
        self.updated.lock().push(market.clone());
        Ok(())
    }

    fn is_succeeded(&self, market_id: &str) -> bool {
        self.succeeded.lock().contains(market_id)
    }
}

#[derive(Default)]
pub struct TestAssets {
    pub assets: Mutex<BTreeMap<String, Asset>>,
    pub enabled: Mutex<BTreeSet<String>>,
    pub rejected: Mutex<Vec<String>>,
    pub pending_listing: Mutex<Vec<String>>,
    /// Lowercase contract addresses of registered ERC20 assets.
    pub erc20: Mutex<BTreeSet<String>>,
}

impl TestAssets {
    pub fn add_enabled(&self, id: &str, decimals: u64) {
        self.assets.lock().insert(
            id.to_string(),
            Asset {
                id: id.to_string(),
                details: AssetDetails {
                    name: id.to_string(),
                    symbol: id.to_string(),
                    decimals,
                    quantum: Decimal::ONE,
                    source: Some(AssetSource::Builtin(BuiltinAsset {
                        max_faucet_amount_mint: 1,
                    })),
                },
            },
        );
        self.enabled.lock().insert(id.to_string());
    }
}

impl Assets for TestAssets {
    fn new_asset(&self, asset_id: &str, details: &AssetDetails) -> Result<(), CollaboratorError> {
        self.assets.lock().insert(
            asset_id.to_string(),
            Asset {
                id: asset_id.to_string(),
                details: details.clone(),
            },
        );
        Ok(())
    }

    fn get(&self, asset_id: &str) -> Result<Asset, CollaboratorError> {
        self.assets
            .lock()
            .get(asset_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(asset_id.to_string()))
    }

    fn is_enabled(&self, asset_id: &str) -> bool {
        self.enabled.lock().contains(asset_id)
    }

    fn set_rejected(&self, asset_id: &str) {
        self.rejected.lock().push(asset_id.to_string());
    }

    fn set_pending_listing(&self, asset_id: &str) {
        self.pending_listing.lock().push(asset_id.to_string());
    }

    fn validate_asset(&self, _asset_id: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn exists_for_ethereum_address(&self, address: &str) -> bool {
        self.erc20.lock().contains(&address.to_lowercase())
    }
}

/// Parameter store seeded with the canonical defaults. A value of `"bad"`
/// never validates, and the auction duration bounds are checked against each
/// other.
pub struct TestNetParams {
    pub values: Mutex<HashMap<String, String>>,
}

impl Default for TestNetParams {
    fn default() -> Self {
        TestNetParams {
            values: Mutex::new(default_network_parameters().into_iter().collect()),
        }
    }
}

impl TestNetParams {
    pub fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }
}

impl NetParams for TestNetParams {
    fn get(&self, key: &str) -> Result<String, CollaboratorError> {
        self.values
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(key.to_string()))
    }

    fn validate(&self, key: &str, value: &str) -> Result<(), CollaboratorError> {
        if !self.values.lock().contains_key(key) {
            return Err(CollaboratorError::NotFound(key.to_string()));
        }
        let invalid = |message: &str| CollaboratorError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if value == "bad" {
            return Err(invalid("rejected by test store"));
        }
        // The auction bounds must never cross.
        let (min, max) = match key {
            keys::MARKET_AUCTION_MIN_DURATION => {
                (value.to_string(), self.get(keys::MARKET_AUCTION_MAX_DURATION)?)
            }
            keys::MARKET_AUCTION_MAX_DURATION => {
                (self.get(keys::MARKET_AUCTION_MIN_DURATION)?, value.to_string())
            }
            _ => return Ok(()),
        };
        let min = parse_duration(&min).map_err(|e| invalid(&e.to_string()))?;
        let max = parse_duration(&max).map_err(|e| invalid(&e.to_string()))?;
        if min > max {
            return Err(invalid("minimum auction duration above maximum"));
        }
        Ok(())
    }

    fn update(&self, key: &str, value: &str) -> Result<(), CollaboratorError> {
        self.set(key, value);
        Ok(())
    }
}

#[derive(Default)]
pub struct TestBroker {
    pub events: Mutex<Vec<GovernanceEvent>>,
}

impl TestBroker {
    pub fn proposals(&self) -> Vec<Proposal> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.proposal().cloned())
            .collect()
    }

    /// Most recent event for proposal `id`.
    pub fn last_proposal(&self, id: &str) -> Option<Proposal> {
        self.proposals().into_iter().rev().find(|p| p.id == id)
    }

    pub fn votes(&self) -> Vec<Vote> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.vote().cloned())
            .collect()
    }

    pub fn vote_parties(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.vote().map(|v| v.party_id.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Broker for TestBroker {
    fn send(&self, event: GovernanceEvent) {
        self.events.lock().push(event);
    }

    fn send_batch(&self, events: Vec<GovernanceEvent>) {
        self.events.lock().extend(events);
    }
}

pub struct TestTime {
    pub now: Mutex<Timestamp>,
}

impl TimeService for TestTime {
    fn get_time_now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Holds every started check until the test resolves it.
#[derive(Default)]
pub struct TestWitness {
    pub checks: Mutex<Vec<(String, WitnessCallback)>>,
}

impl TestWitness {
    pub fn resolve(&self, id: &str, ok: bool) {
        for (rid, cb) in self.checks.lock().iter() {
            if rid == id {
                cb(ok);
            }
        }
    }
}

impl Witness for TestWitness {
    fn start_check(
        &self,
        resource: Arc<dyn WitnessResource>,
        on_done: WitnessCallback,
        _check_until: Timestamp,
    ) -> Result<(), CollaboratorError> {
        self.checks.lock().push((resource.id().to_string(), on_done));
        Ok(())
    }

    fn restore_resource(
        &self,
        resource: Arc<dyn WitnessResource>,
        on_done: WitnessCallback,
    ) -> Result<(), CollaboratorError> {
        self.checks.lock().push((resource.id().to_string(), on_done));
        Ok(())
    }
}

pub struct TestBanking;

impl Banking for TestBanking {
    fn verify_governance_transfer(&self, _transfer: &GovernanceTransfer) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn verify_cancel_governance_transfer(&self, _transfer_id: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HARNESS
// ════════════════════════════════════════════════════════════════════════════

pub struct Harness {
    pub engine: Engine,
    pub accounts: Arc<TestAccounts>,
    pub markets: Arc<TestMarkets>,
    pub assets: Arc<TestAssets>,
    pub netp: Arc<TestNetParams>,
    pub broker: Arc<TestBroker>,
    pub time: Arc<TestTime>,
    pub witness: Arc<TestWitness>,
}

impl Harness {
    pub fn new() -> Self {
        let accounts = Arc::new(TestAccounts::default());
        let markets = Arc::new(TestMarkets::default());
        let assets = Arc::new(TestAssets::default());
        let netp = Arc::new(TestNetParams::default());
        let broker = Arc::new(TestBroker::default());
        let time = Arc::new(TestTime {
            now: Mutex::new(Timestamp::from_unix(START)),
        });
        let witness = Arc::new(TestWitness::default());

        let collab = Collaborators {
            accounts: accounts.clone(),
            time: time.clone(),
            broker: broker.clone(),
            assets: assets.clone(),
            witness: witness.clone(),
            markets: markets.clone(),
            netp: netp.clone(),
            banking: Arc::new(TestBanking),
        };

        Harness {
            engine: Engine::new(collab, Config::default()),
            accounts,
            markets,
            assets,
            netp,
            broker,
            time,
            witness,
        }
    }

    pub fn fund(&self, party: &str, balance: u128) {
        self.accounts.balances.lock().insert(party.to_string(), balance);
    }

    pub fn set_supply(&self, supply: u128) {
        *self.accounts.supply.lock() = supply;
    }

    pub fn set_time(&self, secs: i64) {
        *self.time.now.lock() = Timestamp::from_unix(secs);
    }

    /// Moves block time to `secs` and ticks the engine.
    pub fn tick(
        &mut self,
        secs: i64,
    ) -> (Vec<tradegov_governance::ToEnact>, Vec<tradegov_governance::VoteClosed>) {
        self.set_time(secs);
        self.engine.on_tick(Timestamp::from_unix(secs))
    }

    pub fn vote(&mut self, proposal_id: &str, party: &str, value: VoteValue) {
        self.engine
            .add_vote(
                VoteSubmission {
                    proposal_id: proposal_id.to_string(),
                    value,
                },
                party,
            )
            .unwrap();
    }

    pub fn add_spot_market(&self, id: &str, state: MarketState) {
        let product = Product::Spot(SpotProduct {
            base_asset: "BTC".to_string(),
            quote_asset: "USD".to_string(),
        });
        self.insert_market(existing_market(id, product, state));
    }

    /// Running BTC future settled in USD, a valid parent for `new_market()`.
    pub fn add_future_market(&self, id: &str, state: MarketState) {
        self.insert_market(existing_market(id, Product::Future(btc_future()), state));
    }

    pub fn insert_market(&self, market: Market) {
        self.markets.markets.lock().insert(market.id.clone(), market);
    }
}

/// Market as the execution engine would report it.
pub fn existing_market(id: &str, product: Product, state: MarketState) -> Market {
    Market {
        id: id.to_string(),
        tradable_instrument: TradableInstrument {
            instrument: Instrument {
                id: id.to_string(),
                code: "BTC".to_string(),
                name: "Bitcoin".to_string(),
                metadata: Vec::new(),
                product,
            },
            risk_model: simple_risk(),
            margin_scaling_factors: MarginScalingFactors {
                search_level: Decimal::ZERO,
                initial_margin: Decimal::ZERO,
                collateral_release: Decimal::ZERO,
            },
        },
        decimal_places: 2,
        position_decimal_places: 2,
        opening_auction_duration: HOUR,
        price_monitoring: PriceMonitoringParameters::default(),
        liquidity_sla_params: Some(sla()),
        linear_slippage_factor: Decimal::ZERO,
        quadratic_slippage_factor: Decimal::ZERO,
        liquidation_strategy: Some(LiquidationStrategy::legacy()),
        parent_market_id: None,
        insurance_pool_fraction: Decimal::ZERO,
        tick_size: 1,
        state,
    }
}

// ════════════════════════════════════════════════════════════════════════════
// PROPOSAL FIXTURES
// ════════════════════════════════════════════════════════════════════════════

/// Closing time comfortably inside the default bounds.
pub const CLOSING: i64 = START + 3 * DAY;
pub const ENACTMENT: i64 = CLOSING + DAY;

pub fn rationale() -> ProposalRationale {
    ProposalRationale {
        title: "test proposal".to_string(),
        description: "a proposal made by a test".to_string(),
    }
}

pub fn submission(change: ProposalChange, closing: i64, enactment: i64) -> ProposalSubmission {
    ProposalSubmission {
        reference: "ref".to_string(),
        terms: ProposalTerms {
            closing_timestamp: closing,
            enactment_timestamp: enactment,
            validation_timestamp: 0,
            change: Some(change),
        },
        rationale: rationale(),
    }
}

pub fn freeform() -> ProposalSubmission {
    submission(ProposalChange::NewFreeform(NewFreeform), CLOSING, ENACTMENT)
}

pub fn netparam_change(key: &str, value: &str) -> ProposalChange {
    ProposalChange::UpdateNetworkParameter(UpdateNetworkParameter {
        changes: NetworkParameter {
            key: key.to_string(),
            value: value.to_string(),
        },
    })
}

pub fn netparam(key: &str, value: &str) -> ProposalSubmission {
    submission(netparam_change(key, value), CLOSING, ENACTMENT)
}

pub fn new_asset(validation: i64) -> ProposalSubmission {
    let mut sub = submission(
        ProposalChange::NewAsset(NewAsset {
            changes: AssetDetails {
                name: "Gold".to_string(),
                symbol: "GLD".to_string(),
                decimals: 5,
                quantum: Decimal::ONE,
                source: Some(AssetSource::Builtin(BuiltinAsset {
                    max_faucet_amount_mint: 1_000,
                })),
            },
        }),
        CLOSING,
        ENACTMENT,
    );
    sub.terms.validation_timestamp = validation;
    sub
}

pub fn simple_risk() -> RiskParameters {
    RiskParameters::Simple(SimpleModelParams {
        factor_long: Decimal::new(15, 2),
        factor_short: Decimal::new(25, 2),
        max_move_up: Decimal::from_i64(10),
        min_move_down: Decimal::from_i64(-10),
        probability_of_trading: Decimal::new(1, 1),
    })
}

pub fn sla() -> LiquiditySlaParams {
    LiquiditySlaParams {
        price_range: Decimal::new(5, 1),
        commitment_min_time_fraction: Decimal::new(5, 1),
        performance_hysteresis_epochs: 1,
        sla_competition_factor: Decimal::new(5, 1),
    }
}

pub fn new_spot_market() -> ProposalSubmission {
    let change = ProposalChange::NewSpotMarket(NewSpotMarket {
        changes: NewSpotMarketConfiguration {
            instrument: InstrumentConfiguration {
                name: "Bitcoin spot".to_string(),
                code: "BTC/USD".to_string(),
                product: Some(Product::Spot(SpotProduct {
                    base_asset: "BTC".to_string(),
                    quote_asset: "USD".to_string(),
                })),
            },
            price_decimal_places: 2,
            size_decimal_places: 2,
            metadata: vec!["base:BTC".to_string()],
            price_monitoring_parameters: None,
            risk_parameters: Some(simple_risk()),
            sla_params: Some(sla()),
            tick_size: 1,
        },
    });
    submission(change, CLOSING, CLOSING + HOUR)
}

pub fn batch(changes: Vec<ProposalChange>) -> BatchProposalSubmission {
    BatchProposalSubmission {
        reference: "batch-ref".to_string(),
        terms: BatchProposalTerms {
            closing_timestamp: CLOSING,
            changes: changes
                .into_iter()
                .map(|change| BatchProposalChange {
                    enactment_timestamp: ENACTMENT,
                    validation_timestamp: 0,
                    change: Some(change),
                })
                .collect(),
        },
        rationale: rationale(),
    }
}

fn btc_price_feed() -> DataSourceDefinition {
    DataSourceDefinition::External(ExternalDataSource {
        signers: vec!["0xfeed".to_string()],
        source_chain_id: None,
        filters: vec![DataSourceFilter {
            key: PropertyKey {
                name: "prices.BTC.value".to_string(),
                property_type: PropertyType::Integer,
            },
            conditions: Vec::new(),
        }],
    })
}

fn terminates_after_enactment() -> DataSourceDefinition {
    DataSourceDefinition::InternalTime {
        conditions: vec![Condition {
            operator: ConditionOperator::GreaterThanOrEqual,
            value: (ENACTMENT + 30 * DAY).to_string(),
        }],
    }
}

fn btc_binding() -> DataSourceSpecBinding {
    DataSourceSpecBinding {
        settlement_data_property: "prices.BTC.value".to_string(),
        trading_termination_property: BUILTIN_TIMESTAMP.to_string(),
    }
}

/// Cash-settled future on an external price feed, terminating on block time.
pub fn btc_future() -> FutureProduct {
    FutureProduct {
        settlement_asset: "USD".to_string(),
        quote_name: "USD".to_string(),
        data_source_spec_for_settlement_data: btc_price_feed(),
        data_source_spec_for_trading_termination: terminates_after_enactment(),
        data_source_spec_binding: Some(btc_binding()),
        cap: None,
    }
}

pub fn new_market_change(successor: Option<SuccessorConfiguration>) -> ProposalChange {
    ProposalChange::NewMarket(NewMarket {
        changes: NewMarketConfiguration {
            instrument: InstrumentConfiguration {
                name: "BTC future".to_string(),
                code: "BTC.FUT".to_string(),
                product: Some(Product::Future(btc_future())),
            },
            decimal_places: 2,
            position_decimal_places: 2,
            metadata: Vec::new(),
            price_monitoring_parameters: None,
            risk_parameters: Some(simple_risk()),
            linear_slippage_factor: Decimal::new(1, 1),
            quadratic_slippage_factor: Decimal::new(1, 1),
            liquidity_sla_parameters: Some(sla()),
            liquidation_strategy: None,
            successor,
            tick_size: 1,
        },
    })
}

pub fn new_market() -> ProposalSubmission {
    submission(new_market_change(None), CLOSING, CLOSING + HOUR)
}

/// New market taking over from `parent` with half its insurance pool.
pub fn successor_market(parent: &str, enactment: i64) -> ProposalSubmission {
    let successor = SuccessorConfiguration {
        parent_market_id: parent.to_string(),
        insurance_pool_fraction: Decimal::new(5, 1),
    };
    submission(new_market_change(Some(successor)), CLOSING, enactment)
}

/// Renames the running future `market_id` and tags its metadata.
pub fn update_market(market_id: &str) -> ProposalSubmission {
    let change = ProposalChange::UpdateMarket(UpdateMarket {
        market_id: market_id.to_string(),
        changes: UpdateMarketConfiguration {
            instrument: UpdateInstrumentConfiguration {
                name: "BTC future v2".to_string(),
                code: "BTC.FUT2".to_string(),
                product: Some(UpdateProduct::Future(UpdateFutureProduct {
                    quote_name: "USD".to_string(),
                    data_source_spec_for_settlement_data: btc_price_feed(),
                    data_source_spec_for_trading_termination: terminates_after_enactment(),
                    data_source_spec_binding: Some(btc_binding()),
                })),
            },
            metadata: vec!["updated".to_string()],
            price_monitoring_parameters: None,
            risk_parameters: Some(simple_risk()),
            linear_slippage_factor: Decimal::new(2, 1),
            quadratic_slippage_factor: Decimal::new(2, 1),
            liquidity_sla_parameters: Some(sla()),
            liquidation_strategy: None,
        },
    });
    submission(change, CLOSING, ENACTMENT)
}

pub fn new_erc20_asset(contract_address: &str) -> ProposalSubmission {
    let mut sub = submission(
        ProposalChange::NewAsset(NewAsset {
            changes: AssetDetails {
                name: "Wrapped Ether".to_string(),
                symbol: "WETH".to_string(),
                decimals: 18,
                quantum: Decimal::ONE,
                source: Some(AssetSource::Erc20(Erc20 {
                    chain_id: "1".to_string(),
                    contract_address: contract_address.to_string(),
                    lifetime_limit: 1_000,
                    withdraw_threshold: 10,
                })),
            },
        }),
        CLOSING,
        ENACTMENT,
    );
    sub.terms.validation_timestamp = START + HOUR;
    sub
}
