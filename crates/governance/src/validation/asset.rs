//! Asset proposal checks.

use crate::error::{GovernanceError, Rejection, ValidationResult};
use crate::types::asset::{AssetSource, AssetUpdateSource, NewAsset, UpdateAsset};
use crate::types::ProposalError;

fn invalid_details(details: &str) -> Rejection {
    Rejection::msg(ProposalError::InvalidAssetDetails, details)
}

/// Structural checks on a new asset; collisions are checked by the engine.
pub fn validate_new_asset(asset: &NewAsset) -> ValidationResult {
    let d = &asset.changes;
    if d.name.trim().is_empty() {
        return Err(invalid_details("asset name is required"));
    }
    if d.symbol.trim().is_empty() {
        return Err(invalid_details("asset symbol is required"));
    }
    if !d.quantum.is_positive() {
        return Err(invalid_details("asset quantum must be positive"));
    }
    match &d.source {
        None => Err(Rejection::new(
            ProposalError::InvalidAsset,
            GovernanceError::UnsupportedAssetSourceType,
        )),
        Some(AssetSource::Builtin(b)) => {
            if b.max_faucet_amount_mint == 0 {
                return Err(Rejection::msg(
                    ProposalError::MissingBuiltinAssetField,
                    "builtin asset requires a max faucet amount",
                ));
            }
            Ok(())
        }
        Some(AssetSource::Erc20(e)) => {
            if e.contract_address.trim().is_empty() {
                return Err(Rejection::msg(
                    ProposalError::MissingErc20ContractAddress,
                    "erc20 asset requires a contract address",
                ));
            }
            if e.chain_id.trim().is_empty() {
                return Err(invalid_details("erc20 asset requires a chain id"));
            }
            if e.lifetime_limit == 0 {
                return Err(invalid_details("erc20 lifetime limit must be positive"));
            }
            Ok(())
        }
    }
}

pub fn validate_update_asset(update: &UpdateAsset) -> ValidationResult {
    if update.asset_id.is_empty() {
        return Err(Rejection::msg(ProposalError::InvalidAsset, "missing asset ID"));
    }
    if !update.changes.quantum.is_positive() {
        return Err(invalid_details("asset quantum must be positive"));
    }
    match &update.changes.source {
        None => Err(Rejection::new(
            ProposalError::InvalidAsset,
            GovernanceError::UnsupportedAssetSourceType,
        )),
        Some(AssetUpdateSource::Erc20(e)) => {
            if e.lifetime_limit == 0 {
                return Err(invalid_details("erc20 lifetime limit must be positive"));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::asset::{AssetDetails, AssetDetailsUpdate, BuiltinAsset, Erc20, Erc20Update};
    use tradegov_common::Decimal;

    fn erc20_asset(address: &str) -> NewAsset {
        NewAsset {
            changes: AssetDetails {
                name: "Wrapped Ether".into(),
                symbol: "WETH".into(),
                decimals: 18,
                quantum: Decimal::ONE,
                source: Some(AssetSource::Erc20(Erc20 {
                    chain_id: "1".into(),
                    contract_address: address.into(),
                    lifetime_limit: 1_000,
                    withdraw_threshold: 10,
                })),
            },
        }
    }

    #[test]
    fn test_new_erc20_asset() {
        assert!(validate_new_asset(&erc20_asset("0xabc")).is_ok());
        let err = validate_new_asset(&erc20_asset("")).unwrap_err();
        assert_eq!(err.reason, ProposalError::MissingErc20ContractAddress);
    }

    #[test]
    fn test_new_builtin_asset_requires_faucet() {
        let mut asset = erc20_asset("0xabc");
        asset.changes.source = Some(AssetSource::Builtin(BuiltinAsset {
            max_faucet_amount_mint: 0,
        }));
        let err = validate_new_asset(&asset).unwrap_err();
        assert_eq!(err.reason, ProposalError::MissingBuiltinAssetField);
    }

    #[test]
    fn test_new_asset_details() {
        let mut asset = erc20_asset("0xabc");
        asset.changes.quantum = Decimal::ZERO;
        assert_eq!(
            validate_new_asset(&asset).unwrap_err().reason,
            ProposalError::InvalidAssetDetails
        );
        let mut asset = erc20_asset("0xabc");
        asset.changes.source = None;
        let err = validate_new_asset(&asset).unwrap_err();
        assert_eq!(err.error, GovernanceError::UnsupportedAssetSourceType);
    }

    #[test]
    fn test_update_asset() {
        let mut update = UpdateAsset {
            asset_id: "weth".into(),
            changes: AssetDetailsUpdate {
                quantum: Decimal::ONE,
                source: Some(AssetUpdateSource::Erc20(Erc20Update {
                    lifetime_limit: 10,
                    withdraw_threshold: 1,
                })),
            },
        };
        assert!(validate_update_asset(&update).is_ok());
        update.changes.quantum = Decimal::from_i64(-1);
        assert_eq!(
            validate_update_asset(&update).unwrap_err().reason,
            ProposalError::InvalidAssetDetails
        );
    }
}
