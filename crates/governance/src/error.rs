//! Error types for the governance engine.
//!
//! Two classes exist side by side:
//!
//! - [`GovernanceError`]: returned from the call that attempted a mutation
//!   (duplicate submission, vote on a missing proposal, a failed validation).
//! - [`ProposalError`]: the typed reason stored on a rejected, declined or
//!   failed proposal and surfaced to observers through events.
//!
//! Validation helpers produce a [`Rejection`] pairing both.

use thiserror::Error;

use crate::types::ProposalError;

/// Failures reported by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The market is unknown to the execution engine, or already gone.
    #[error("market does not exist")]
    MarketDoesNotExist,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceError {
    #[error("proposal does not exist")]
    ProposalDoesNotExist,

    #[error("market does not exist")]
    MarketDoesNotExist,

    #[error("market state does not allow for state update")]
    MarketStateUpdateNotAllowed,

    #[error("original market proposal is still open")]
    MarketProposalStillOpen,

    #[error("proposal is not open for votes")]
    ProposalNotOpenForVotes,

    #[error("proposal with given ID already exists")]
    ProposalIsDuplicate,

    #[error("vote requires tokens or equity-like share")]
    VoterInsufficientTokensAndEquityLikeShare,

    #[error("vote requires more tokens than the party has")]
    VoterInsufficientTokens,

    #[error("unsupported proposal type")]
    UnsupportedProposalType,

    #[error("unsupported asset source type")]
    UnsupportedAssetSourceType,

    #[error("expected an ERC20 asset but was not")]
    ExpectedErc20Asset,

    #[error("erc20 address already in use")]
    Erc20AddressAlreadyInUse,

    #[error("market to succeed does not exist")]
    ParentMarketDoesNotExist,

    #[error("the parent market was already succeeded by a prior proposal")]
    ParentMarketAlreadySucceeded,

    #[error("the parent market has been succeeded by a competing proposal")]
    ParentMarketSucceededByCompeting,

    /// A validation failure without a dedicated sentinel.
    #[error("{details} ({reason})")]
    Rejected { reason: ProposalError, details: String },

    #[error("network parameter {key}: {message}")]
    NetworkParameter { key: String, message: String },

    #[error("collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("codec failure: {0}")]
    Codec(String),

    #[error("unknown snapshot key {0:?}")]
    UnknownSnapshotKey(String),
}

impl From<bincode::Error> for GovernanceError {
    fn from(e: bincode::Error) -> Self {
        GovernanceError::Codec(e.to_string())
    }
}

/// A typed proposal error together with the error returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: ProposalError,
    pub error: GovernanceError,
}

impl Rejection {
    pub fn new(reason: ProposalError, error: GovernanceError) -> Self {
        Rejection { reason, error }
    }

    /// Rejection carrying a free-form explanation.
    pub fn msg(reason: ProposalError, details: impl Into<String>) -> Self {
        Rejection {
            reason,
            error: GovernanceError::Rejected {
                reason,
                details: details.into(),
            },
        }
    }

    /// Text stored in a proposal's error details.
    pub fn details(&self) -> String {
        match &self.error {
            GovernanceError::Rejected { details, .. } => details.clone(),
            other => other.to_string(),
        }
    }
}

impl From<Rejection> for GovernanceError {
    fn from(r: Rejection) -> Self {
        r.error
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;

/// Validation outcome; `Ok` means the change is acceptable.
pub type ValidationResult = std::result::Result<(), Rejection>;
