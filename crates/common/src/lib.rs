//! # Trading Governance Common Crate
//!
//! Deterministic primitives shared by the governance engine.
//!
//! ## Modules
//! - `num`: fixed-point `Decimal` and wide mul-div helpers
//! - `time`: block `Timestamp` and network-parameter duration parsing
//! - `crypto`: sha3-256 digest helpers and fixed-width id slots
//! - `config`: TOML engine configuration
//!
//! Nothing in this crate reads the wall clock or uses floating point, so the
//! same inputs give the same bytes on every validator.

pub mod config;
pub mod crypto;
pub mod num;
pub mod time;

pub use config::Config;
pub use num::Decimal;
pub use time::Timestamp;
