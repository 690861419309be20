//! # Collaborator Interfaces
//!
//! The engine owns proposals only. Markets, balances, assets, network
//! parameters, transfers, events, block time and external checks all live in
//! other subsystems and are reached through the traits below.
//!
//! Every call is synchronous and expected to return immediately; the engine
//! is driven serially from block processing and never calls a collaborator
//! concurrently with itself.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tradegov_common::time::parse_duration;
use tradegov_common::{Decimal, Timestamp};

use crate::error::CollaboratorError;
use crate::events::GovernanceEvent;
use crate::types::market::{Market, MarketState};
use crate::types::transfer::GovernanceTransfer;
use crate::types::{Asset, AssetDetails};

/// Market lookups and mutations on the execution engine.
pub trait Markets: Send + Sync {
    fn market_exists(&self, market_id: &str) -> bool;

    /// `settled_ok` also returns markets that are settled but still retained.
    fn get_market(&self, market_id: &str, settled_ok: bool) -> Option<Market>;

    fn get_market_state(&self, market_id: &str) -> Result<MarketState, CollaboratorError>;

    /// Zero when the party holds no share in the market.
    fn get_equity_like_share_for_market_and_party(&self, market_id: &str, party: &str) -> Decimal;

    fn restore_market(&self, market: &Market) -> Result<(), CollaboratorError>;

    fn start_opening_auction(&self, market_id: &str) -> Result<(), CollaboratorError>;

    fn update_market(&self, market: &Market) -> Result<(), CollaboratorError>;

    fn is_succeeded(&self, market_id: &str) -> bool;
}

/// Governance token balances.
pub trait StakingAccounts: Send + Sync {
    fn get_available_balance(&self, party: &str) -> Result<u128, CollaboratorError>;

    fn get_staking_asset_total_supply(&self) -> u128;
}

/// Asset registry.
pub trait Assets: Send + Sync {
    /// Registers a proposed asset under `asset_id`, pending external checks.
    fn new_asset(&self, asset_id: &str, details: &AssetDetails) -> Result<(), CollaboratorError>;

    fn get(&self, asset_id: &str) -> Result<Asset, CollaboratorError>;

    fn is_enabled(&self, asset_id: &str) -> bool;

    fn set_rejected(&self, asset_id: &str);

    fn set_pending_listing(&self, asset_id: &str);

    /// External confirmation that the asset exists on its source chain.
    fn validate_asset(&self, asset_id: &str) -> Result<(), CollaboratorError>;

    fn exists_for_ethereum_address(&self, address: &str) -> bool;
}

/// Network parameter store.
pub trait NetParams: Send + Sync {
    fn get(&self, key: &str) -> Result<String, CollaboratorError>;

    /// Checks `value` is acceptable for `key` given the current parameters.
    fn validate(&self, key: &str, value: &str) -> Result<(), CollaboratorError>;

    fn update(&self, key: &str, value: &str) -> Result<(), CollaboratorError>;

    fn get_decimal(&self, key: &str) -> Result<Decimal, CollaboratorError> {
        let raw = self.get(key)?;
        raw.trim().parse().map_err(|e| invalid(key, e))
    }

    fn get_uint(&self, key: &str) -> Result<u128, CollaboratorError> {
        let raw = self.get(key)?;
        raw.trim().parse().map_err(|e| invalid(key, e))
    }

    fn get_int(&self, key: &str) -> Result<i64, CollaboratorError> {
        let raw = self.get(key)?;
        raw.trim().parse().map_err(|e| invalid(key, e))
    }

    fn get_duration(&self, key: &str) -> Result<Duration, CollaboratorError> {
        let raw = self.get(key)?;
        parse_duration(raw.trim()).map_err(|e| invalid(key, e))
    }
}

fn invalid(key: &str, e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    }
}

/// Decodes a JSON-valued network parameter.
pub fn get_json_struct<T: DeserializeOwned>(
    netp: &dyn NetParams,
    key: &str,
) -> Result<T, CollaboratorError> {
    let raw = netp.get(key)?;
    serde_json::from_str(&raw).map_err(|e| invalid(key, e))
}

/// Transfer verification on the banking subsystem.
pub trait Banking: Send + Sync {
    fn verify_governance_transfer(&self, transfer: &GovernanceTransfer) -> Result<(), CollaboratorError>;

    fn verify_cancel_governance_transfer(&self, transfer_id: &str) -> Result<(), CollaboratorError>;
}

pub trait Broker: Send + Sync {
    fn send(&self, event: GovernanceEvent);

    fn send_batch(&self, events: Vec<GovernanceEvent>);
}

/// Source of the current block time.
pub trait TimeService: Send + Sync {
    fn get_time_now(&self) -> Timestamp;
}

/// Something the witness service checks against an external chain.
pub trait WitnessResource: Send + Sync {
    fn id(&self) -> &str;

    fn check(&self) -> Result<(), CollaboratorError>;
}

/// Invoked by the witness once validators agree on a resource; `true` when
/// the resource was confirmed.
pub type WitnessCallback = Box<dyn Fn(bool) + Send + Sync>;

/// External-check service run by validators.
pub trait Witness: Send + Sync {
    fn start_check(
        &self,
        resource: Arc<dyn WitnessResource>,
        on_done: WitnessCallback,
        check_until: Timestamp,
    ) -> Result<(), CollaboratorError>;

    /// Re-registers a pending check after restart.
    fn restore_resource(
        &self,
        resource: Arc<dyn WitnessResource>,
        on_done: WitnessCallback,
    ) -> Result<(), CollaboratorError>;
}

/// Everything the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub accounts: Arc<dyn StakingAccounts>,
    pub time: Arc<dyn TimeService>,
    pub broker: Arc<dyn Broker>,
    pub assets: Arc<dyn Assets>,
    pub witness: Arc<dyn Witness>,
    pub markets: Arc<dyn Markets>,
    pub netp: Arc<dyn NetParams>,
    pub banking: Arc<dyn Banking>,
}
