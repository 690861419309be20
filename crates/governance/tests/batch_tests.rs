//! Integration tests for batch proposals.
//! Run with: cargo test -p tradegov-governance --test batch_tests

mod common;

use common::*;
use tradegov_governance::batch::batch_member_id;
use tradegov_governance::params::keys;
use tradegov_governance::types::{
    NewFreeform, ProposalChange, ProposalError, ProposalState, VoteSubmission, VoteValue,
};
use tradegov_governance::{GovernanceError, ToEnactKind};

fn last_batch_event(h: &Harness) -> tradegov_governance::types::BatchProposal {
    h.broker
        .events
        .lock()
        .iter()
        .rev()
        .find_map(|e| e.batch().cloned())
        .unwrap()
}

#[test]
fn test_one_invalid_member_rejects_whole_batch() {
    let mut h = Harness::new();
    h.fund("alice", 10);

    let sub = batch(vec![
        ProposalChange::NewFreeform(NewFreeform),
        netparam_change(keys::MARKET_FEE_TREASURY, "0.001"),
        netparam_change(keys::MARKET_FEE_BUYBACK, ""),
    ]);
    let err = h.engine.submit_batch_proposal(sub, "b1", "alice").unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::Rejected {
            reason: ProposalError::NetworkParameterInvalidValue,
            ..
        }
    ));

    let wrapper = last_batch_event(&h);
    assert_eq!(wrapper.state, ProposalState::Rejected);
    assert_eq!(wrapper.reason, ProposalError::ProposalInBatchRejected);
    assert_eq!(wrapper.proposals.len(), 3);
    for p in &wrapper.proposals {
        assert_eq!(p.state, ProposalState::Rejected);
        assert_eq!(p.reason, ProposalError::ProposalInBatchRejected);
        assert_eq!(p.batch_id.as_deref(), Some("b1"));
    }
    assert_eq!(
        wrapper.proposals[0].error_details,
        "another proposal in the batch was rejected"
    );
    assert_ne!(wrapper.proposals[2].error_details, wrapper.proposals[0].error_details);

    for i in 0..3 {
        let member = h.broker.last_proposal(&batch_member_id("b1", i)).unwrap();
        assert_eq!(member.reason, ProposalError::ProposalInBatchRejected);
    }
    assert_eq!(h.engine.active_proposals().count(), 0);
}

#[test]
fn test_under_funded_proposer_rejects_whole_batch() {
    let mut h = Harness::new();
    h.netp.set("governance.proposal.updateNetParam.minProposerBalance", "5");
    h.fund("alice", 3);

    // Enough for the freeform member, not for the parameter change.
    let sub = batch(vec![
        ProposalChange::NewFreeform(NewFreeform),
        netparam_change(keys::MARKET_FEE_TREASURY, "0.001"),
        ProposalChange::NewFreeform(NewFreeform),
    ]);
    let err = h.engine.submit_batch_proposal(sub, "b1", "alice").unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::Rejected {
            reason: ProposalError::InsufficientTokens,
            ..
        }
    ));

    let wrapper = last_batch_event(&h);
    assert_eq!(wrapper.state, ProposalState::Rejected);
    assert_eq!(wrapper.reason, ProposalError::ProposalInBatchRejected);
    assert!(wrapper.error_details.contains("insufficient governance token"));
    assert!(wrapper
        .proposals
        .iter()
        .all(|p| p.state == ProposalState::Rejected && p.reason == ProposalError::ProposalInBatchRejected));
    assert_eq!(wrapper.proposals[1].error_details, wrapper.error_details);
    assert_eq!(
        wrapper.proposals[0].error_details,
        "another proposal in the batch was rejected"
    );

    // Nothing is left to vote on.
    let err = h
        .engine
        .add_vote(
            VoteSubmission {
                proposal_id: "b1".to_string(),
                value: VoteValue::Yes,
            },
            "alice",
        )
        .unwrap_err();
    assert_eq!(err, GovernanceError::ProposalDoesNotExist);

    // A proposer with no tokens at all fails on the first member.
    let sub = batch(vec![
        ProposalChange::NewFreeform(NewFreeform),
        netparam_change(keys::MARKET_FEE_TREASURY, "0.001"),
    ]);
    assert!(h.engine.submit_batch_proposal(sub, "b2", "carol").is_err());
    let wrapper = last_batch_event(&h);
    assert_eq!(wrapper.id, "b2");
    assert!(wrapper.proposals[0].error_details.contains("insufficient governance token"));
    assert_eq!(h.engine.active_proposals().count(), 0);
}

#[test]
fn test_node_validated_member_not_allowed() {
    let mut h = Harness::new();
    h.fund("alice", 10);

    let asset = new_asset(START + HOUR).terms.change.unwrap();
    let sub = batch(vec![ProposalChange::NewFreeform(NewFreeform), asset]);
    assert!(h.engine.submit_batch_proposal(sub, "b1", "alice").is_err());
    assert_eq!(last_batch_event(&h).state, ProposalState::Rejected);
    assert!(h.assets.assets.lock().is_empty());
}

#[test]
fn test_batch_passes_and_members_enact_individually() {
    let mut h = Harness::new();
    h.set_supply(9);
    h.fund("alice", 7);
    h.fund("bob", 1);

    let sub = batch(vec![
        ProposalChange::NewFreeform(NewFreeform),
        netparam_change(keys::MARKET_FEE_TREASURY, "0.001"),
    ]);
    let out = h.engine.submit_batch_proposal(sub, "b1", "alice").unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].proposal.id, batch_member_id("b1", 0));
    assert_eq!(out[1].proposal.terms.closing_timestamp, CLOSING);

    h.vote("b1", "alice", VoteValue::Yes);
    h.vote("b1", "bob", VoteValue::No);

    let (to_enact, closed) = h.tick(CLOSING + 1);
    assert!(to_enact.is_empty());
    assert_eq!(closed.len(), 2);
    assert!(closed.iter().all(|vc| vc.proposal.state == ProposalState::Passed));
    assert_eq!(last_batch_event(&h).state, ProposalState::Passed);
    assert_eq!(h.engine.active_proposals().count(), 2);

    let (to_enact, _) = h.tick(CLOSING + 2);
    assert_eq!(to_enact.len(), 1);
    assert_eq!(to_enact[0].kind, ToEnactKind::NewFreeform);

    let (to_enact, _) = h.tick(ENACTMENT + 1);
    assert_eq!(to_enact.len(), 1);
    assert!(matches!(to_enact[0].kind, ToEnactKind::NetworkParameter(_)));
    assert_eq!(h.engine.active_proposals().count(), 0);
}

#[test]
fn test_one_declined_member_declines_the_batch() {
    let mut h = Harness::new();
    h.netp.set("governance.proposal.freeform.requiredMajority", "0.9");
    h.set_supply(9);
    h.fund("alice", 8);
    h.fund("bob", 1);

    let sub = batch(vec![
        ProposalChange::NewFreeform(NewFreeform),
        netparam_change(keys::MARKET_FEE_TREASURY, "0.001"),
    ]);
    h.engine.submit_batch_proposal(sub, "b1", "alice").unwrap();
    h.vote("b1", "alice", VoteValue::Yes);
    h.vote("b1", "bob", VoteValue::No);

    let (to_enact, closed) = h.tick(CLOSING + 1);
    assert!(to_enact.is_empty());
    assert_eq!(closed.len(), 2);
    assert_eq!(closed[0].proposal.state, ProposalState::Declined);
    assert_eq!(closed[0].proposal.reason, ProposalError::MajorityThresholdNotReached);
    assert_eq!(closed[1].proposal.state, ProposalState::Declined);
    assert_eq!(closed[1].proposal.reason, ProposalError::ProposalInBatchDeclined);

    assert_eq!(last_batch_event(&h).state, ProposalState::Declined);
    assert_eq!(h.engine.active_proposals().count(), 0);
}

#[test]
fn test_members_cannot_be_voted_directly() {
    let mut h = Harness::new();
    h.fund("alice", 7);
    let sub = batch(vec![ProposalChange::NewFreeform(NewFreeform)]);
    h.engine.submit_batch_proposal(sub, "b1", "alice").unwrap();

    let err = h
        .engine
        .add_vote(
            VoteSubmission {
                proposal_id: batch_member_id("b1", 0),
                value: VoteValue::Yes,
            },
            "alice",
        )
        .unwrap_err();
    assert_eq!(err, GovernanceError::ProposalDoesNotExist);

    let dup = batch(vec![ProposalChange::NewFreeform(NewFreeform)]);
    assert_eq!(
        h.engine.submit_batch_proposal(dup, "b1", "alice").unwrap_err(),
        GovernanceError::ProposalIsDuplicate
    );
}
