//! Typed reasons attached permanently to rejected, declined and failed
//! proposals. The `Display` form is the stable identifier observers key on.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! proposal_errors {
    ($($variant:ident => $name:literal,)*) => {
        /// Why a proposal left the lifecycle without being enacted.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ProposalError {
            #[default]
            Unspecified,
            $($variant,)*
        }

        impl ProposalError {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    ProposalError::Unspecified => "PROPOSAL_ERROR_UNSPECIFIED",
                    $(ProposalError::$variant => $name,)*
                }
            }
        }
    };
}

proposal_errors! {
    CloseTimeTooSoon => "PROPOSAL_ERROR_CLOSE_TIME_TOO_SOON",
    CloseTimeTooLate => "PROPOSAL_ERROR_CLOSE_TIME_TOO_LATE",
    EnactTimeTooSoon => "PROPOSAL_ERROR_ENACT_TIME_TOO_SOON",
    EnactTimeTooLate => "PROPOSAL_ERROR_ENACT_TIME_TOO_LATE",
    InsufficientTokens => "PROPOSAL_ERROR_INSUFFICIENT_TOKENS",
    NoProduct => "PROPOSAL_ERROR_NO_PRODUCT",
    UnsupportedProduct => "PROPOSAL_ERROR_UNSUPPORTED_PRODUCT",
    NodeValidationFailed => "PROPOSAL_ERROR_NODE_VALIDATION_FAILED",
    MissingBuiltinAssetField => "PROPOSAL_ERROR_MISSING_BUILTIN_ASSET_FIELD",
    MissingErc20ContractAddress => "PROPOSAL_ERROR_MISSING_ERC20_CONTRACT_ADDRESS",
    InvalidAsset => "PROPOSAL_ERROR_INVALID_ASSET",
    IncompatibleTimestamps => "PROPOSAL_ERROR_INCOMPATIBLE_TIMESTAMPS",
    NoRiskParameters => "PROPOSAL_ERROR_NO_RISK_PARAMETERS",
    NetworkParameterInvalidKey => "PROPOSAL_ERROR_NETWORK_PARAMETER_INVALID_KEY",
    NetworkParameterInvalidValue => "PROPOSAL_ERROR_NETWORK_PARAMETER_INVALID_VALUE",
    NetworkParameterValidationFailed => "PROPOSAL_ERROR_NETWORK_PARAMETER_VALIDATION_FAILED",
    OpeningAuctionDurationTooSmall => "PROPOSAL_ERROR_OPENING_AUCTION_DURATION_TOO_SMALL",
    OpeningAuctionDurationTooLarge => "PROPOSAL_ERROR_OPENING_AUCTION_DURATION_TOO_LARGE",
    CouldNotInstantiateMarket => "PROPOSAL_ERROR_COULD_NOT_INSTANTIATE_MARKET",
    InvalidFutureProduct => "PROPOSAL_ERROR_INVALID_FUTURE_PRODUCT",
    InvalidRiskParameter => "PROPOSAL_ERROR_INVALID_RISK_PARAMETER",
    MajorityThresholdNotReached => "PROPOSAL_ERROR_MAJORITY_THRESHOLD_NOT_REACHED",
    ParticipationThresholdNotReached => "PROPOSAL_ERROR_PARTICIPATION_THRESHOLD_NOT_REACHED",
    InvalidAssetDetails => "PROPOSAL_ERROR_INVALID_ASSET_DETAILS",
    UnknownType => "PROPOSAL_ERROR_UNKNOWN_TYPE",
    UnknownRiskParameterType => "PROPOSAL_ERROR_UNKNOWN_RISK_PARAMETER_TYPE",
    InvalidFreeform => "PROPOSAL_ERROR_INVALID_FREEFORM",
    InsufficientEquityLikeShare => "PROPOSAL_ERROR_INSUFFICIENT_EQUITY_LIKE_SHARE",
    InvalidMarket => "PROPOSAL_ERROR_INVALID_MARKET",
    TooManyMarketDecimalPlaces => "PROPOSAL_ERROR_TOO_MANY_MARKET_DECIMAL_PLACES",
    TooManyPriceMonitoringTriggers => "PROPOSAL_ERROR_TOO_MANY_PRICE_MONITORING_TRIGGERS",
    Erc20AddressAlreadyInUse => "PROPOSAL_ERROR_ERC20_ADDRESS_ALREADY_IN_USE",
    LinearSlippageOutOfRange => "PROPOSAL_ERROR_LINEAR_SLIPPAGE_FACTOR_OUT_OF_RANGE",
    QuadraticSlippageOutOfRange => "PROPOSAL_ERROR_QUADRATIC_SLIPPAGE_FACTOR_OUT_OF_RANGE",
    InvalidGovernanceTransfer => "PROPOSAL_ERROR_INVALID_GOVERNANCE_TRANSFER",
    FailedGovernanceTransfer => "PROPOSAL_ERROR_GOVERNANCE_TRANSFER_PROPOSAL_FAILED",
    FailedGovernanceTransferCancel => "PROPOSAL_ERROR_GOVERNANCE_CANCEL_TRANSFER_PROPOSAL_INVALID",
    InvalidSpot => "PROPOSAL_ERROR_INVALID_SPOT",
    SpotNotEnabled => "PROPOSAL_ERROR_SPOT_PRODUCT_DISABLED",
    InvalidSuccessorMarket => "PROPOSAL_ERROR_INVALID_SUCCESSOR_MARKET",
    InvalidStateUpdate => "PROPOSAL_ERROR_INVALID_MARKET_STATE_UPDATE",
    MissingSlaParams => "PROPOSAL_ERROR_MISSING_SLA_PARAMS",
    InvalidSlaParams => "PROPOSAL_ERROR_INVALID_SLA_PARAMS",
    InvalidPerpsProduct => "PROPOSAL_ERROR_INVALID_PERPS_PRODUCT",
    InvalidReferralProgram => "PROPOSAL_ERROR_INVALID_REFERRAL_PROGRAM",
    InvalidVolumeDiscountProgram => "PROPOSAL_ERROR_INVALID_VOLUME_DISCOUNT_PROGRAM",
    ProposalInBatchRejected => "PROPOSAL_ERROR_PROPOSAL_IN_BATCH_REJECTED",
    ProposalInBatchDeclined => "PROPOSAL_ERROR_PROPOSAL_IN_BATCH_DECLINED",
    InvalidSizeDecimalPlaces => "PROPOSAL_ERROR_INVALID_SIZE_DECIMAL_PLACES",
    InvalidVolumeRebateProgram => "PROPOSAL_ERROR_INVALID_VOLUME_REBATE_PROGRAM",
    InvalidProtocolAutomatedPurchase => "PROPOSAL_ERROR_INVALID_PROTOCOL_AUTOMATED_PURCHASE",
}

impl ProposalError {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, ProposalError::Unspecified)
    }
}

impl fmt::Display for ProposalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
