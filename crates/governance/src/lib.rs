//! # Trading Governance Engine
//!
//! Deterministic governance for a trading protocol: participants submit
//! proposals to create or change markets, assets, network parameters,
//! transfers and incentive programs; token holders vote; proposals are
//! tallied when voting closes and enacted at their enactment time.
//!
//! ## Modules
//! - `engine`: the [`Engine`] state machine (submit, vote, tick, enact)
//! - `batch`: all-or-nothing batch proposals sharing one vote set
//! - `tally`: vote sets and the token and equity-like-share tallies
//! - `node_validation`: proposals held until validators confirm an asset
//! - `validation`: per-change validation rules
//! - `builder`: market construction from proposals
//! - `params`: per-type voting thresholds read from network parameters
//! - `checkpoint`, `snapshot`: state persistence
//! - `collaborators`: the traits the engine calls out through
//! - `outputs`, `events`: what the engine hands back and broadcasts
//!
//! ## Flow
//!
//! ```text
//! submit_proposal ──▶ [node validation] ──▶ active (Open)
//!                                              │ add_vote
//!                                              ▼
//!            on_tick: close ──▶ Passed ──▶ ToEnact ──▶ finalise_enactment
//!                          └──▶ Declined ──▶ removed
//! ```
//!
//! The engine never reads a wall clock and iterates only ordered
//! collections, so every validator computes the same state and the same
//! [`Engine::hash`].

pub mod batch;
pub mod builder;
pub mod checkpoint;
pub mod collaborators;
pub mod engine;
pub mod error;
pub mod events;
pub mod node_validation;
pub mod outputs;
pub mod params;
pub mod snapshot;
pub mod tally;
pub mod types;
pub mod validation;

pub use batch::TrackedBatch;
pub use collaborators::Collaborators;
pub use engine::Engine;
pub use error::{CollaboratorError, GovernanceError, Rejection, Result};
pub use events::GovernanceEvent;
pub use outputs::{ToEnact, ToEnactKind, ToSubmit, VoteClosed};
pub use tally::{TrackedProposal, VoteSet};
pub use tradegov_common::{Config, Decimal, Timestamp};
