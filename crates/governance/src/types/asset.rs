//! Asset proposal types.

use serde::{Deserialize, Serialize};
use tradegov_common::Decimal;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinAsset {
    pub max_faucet_amount_mint: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20 {
    pub chain_id: String,
    pub contract_address: String,
    pub lifetime_limit: u128,
    pub withdraw_threshold: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetSource {
    Builtin(BuiltinAsset),
    Erc20(Erc20),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDetails {
    pub name: String,
    pub symbol: String,
    pub decimals: u64,
    pub quantum: Decimal,
    pub source: Option<AssetSource>,
}

impl AssetDetails {
    pub fn erc20(&self) -> Option<&Erc20> {
        match &self.source {
            Some(AssetSource::Erc20(e)) => Some(e),
            _ => None,
        }
    }
}

/// Asset as held by the asset registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub details: AssetDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAsset {
    pub changes: AssetDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Update {
    pub lifetime_limit: u128,
    pub withdraw_threshold: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetUpdateSource {
    Erc20(Erc20Update),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDetailsUpdate {
    pub quantum: Decimal,
    pub source: Option<AssetUpdateSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAsset {
    pub asset_id: String,
    pub changes: AssetDetailsUpdate,
}
