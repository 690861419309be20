//! Engine config loader using TOML and serde.
//!
//! Every field has a default so an empty file (or no file at all) yields the
//! canonical settings. These values are consensus-relevant: all validators
//! must run with the same limits.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Default lower bound between submission and node-validation time (seconds).
pub const DEFAULT_MIN_VALIDATION_PERIOD_SECS: u64 = 1;
/// Default upper bound between submission and node-validation time (48h).
pub const DEFAULT_MAX_VALIDATION_PERIOD_SECS: u64 = 48 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeValidationConfig {
    /// Validation timestamp must be at least this far after block time.
    pub min_period_secs: u64,
    /// Validation timestamp must be at most this far after block time.
    pub max_period_secs: u64,
}

impl Default for NodeValidationConfig {
    fn default() -> Self {
        NodeValidationConfig {
            min_period_secs: DEFAULT_MIN_VALIDATION_PERIOD_SECS,
            max_period_secs: DEFAULT_MAX_VALIDATION_PERIOD_SECS,
        }
    }
}

/// Fixed ceilings applied by market validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub max_price_monitoring_triggers: usize,
    /// Inclusive upper bound for linear and quadratic slippage factors.
    pub max_slippage_factor: u64,
    /// Inclusive upper bound for the LP SLA price range.
    pub max_lp_price_range: u64,
    pub max_performance_hysteresis_epochs: u64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        ValidationLimits {
            max_price_monitoring_triggers: 100,
            max_slippage_factor: 1_000_000,
            max_lp_price_range: 100,
            max_performance_hysteresis_epochs: 366,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_validation: NodeValidationConfig,
    pub limits: ValidationLimits,
}

/// Load config from a TOML file path.
/// If file is missing or parse fails, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let p = path.as_ref();
    let s = fs::read_to_string(p)
        .with_context(|| format!("reading governance config {}", p.display()))?;
    let cfg: Config = toml::from_str(&s)
        .with_context(|| format!("parsing governance config {}", p.display()))?;
    Ok(cfg)
}
