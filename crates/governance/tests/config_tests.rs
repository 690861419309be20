//! Integration tests for loading and reloading engine configuration.
//! Run with: cargo test -p tradegov-governance --test config_tests

mod common;

use std::io::Write;

use anyhow::Result;
use common::*;
use tradegov_common::config::load_from_file;
use tradegov_governance::types::ProposalError;
use tradegov_governance::GovernanceError;

fn write_config(body: &str) -> Result<tempfile::NamedTempFile> {
    let mut tmp = tempfile::NamedTempFile::new()?;
    write!(tmp, "{body}")?;
    Ok(tmp)
}

fn rejection_reason(err: GovernanceError) -> Option<ProposalError> {
    match err {
        GovernanceError::Rejected { reason, .. } => Some(reason),
        _ => None,
    }
}

#[test]
fn test_reload_narrows_node_validation_window() -> Result<()> {
    let mut h = Harness::new();
    h.fund("alice", 7);
    h.engine.submit_proposal(new_asset(START + 2 * HOUR), "a1", "alice")?;

    let file = write_config(
        r#"
        [node_validation]
        max_period_secs = 3600
        "#,
    )?;
    h.engine.reload_conf(load_from_file(file.path())?);

    let err = h
        .engine
        .submit_proposal(new_asset(START + 2 * HOUR), "a2", "alice")
        .unwrap_err();
    assert_eq!(rejection_reason(err), Some(ProposalError::IncompatibleTimestamps));
    assert!(h.engine.get_proposal("a1").is_some());
    assert!(h.engine.get_proposal("a2").is_none());
    Ok(())
}

#[test]
fn test_reload_applies_validation_limits() -> Result<()> {
    let mut h = Harness::new();
    h.fund("alice", 7);
    h.assets.add_enabled("BTC", 8);
    h.assets.add_enabled("USD", 6);

    let file = write_config(
        r#"
        [limits]
        max_lp_price_range = 0
        "#,
    )?;
    h.engine.reload_conf(load_from_file(file.path())?);

    let err = h
        .engine
        .submit_proposal(new_spot_market(), "spot1", "alice")
        .unwrap_err();
    assert_eq!(rejection_reason(err), Some(ProposalError::InvalidSlaParams));
    Ok(())
}
