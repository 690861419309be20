//! # Vote Tally
//!
//! Decides whether a closing proposal passed, and records per-vote weights.
//!
//! ## Token tally
//!
//! Balances are re-fetched at close since a party's stake can change between
//! casting and closing. With `total = yes + no`:
//!
//! - `total == 0` always declines with `ParticipationThresholdNotReached`
//! - passed iff `yes >= total * required_majority` and
//!   `total >= supply * required_participation`
//! - otherwise participation is reported before majority
//!
//! ## Equity-like share tally
//!
//! Market updates declined for participation get a second tally using each
//! voter's equity-like share in the market, with the LP thresholds and no
//! zero short-circuit. It may overturn the decline.
//!
//! Votes left with neither tokens nor equity-like share move to the invalid
//! bucket once the tally is done.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tradegov_common::Decimal;

use crate::collaborators::{Markets, StakingAccounts};
use crate::error::GovernanceError;
use crate::types::{Proposal, ProposalError, ProposalState, Vote, VoteValue};

/// Yes, no and invalid votes keyed (and so ordered) by party.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSet {
    pub yes: BTreeMap<String, Vote>,
    pub no: BTreeMap<String, Vote>,
    pub invalid: BTreeMap<String, Vote>,
}

impl VoteSet {
    /// Records the party's latest vote, dropping any earlier opposite vote.
    pub fn cast(&mut self, vote: Vote) {
        let party = vote.party_id.clone();
        match vote.value {
            VoteValue::Yes => {
                self.no.remove(&party);
                self.yes.insert(party, vote);
            }
            VoteValue::No => {
                self.yes.remove(&party);
                self.no.insert(party, vote);
            }
        }
    }

    /// Moves the vote cast under `old` to `new` in whichever bucket holds
    /// it, returning the re-keyed votes.
    pub fn rekey(&mut self, old: &str, new: &str) -> Vec<Vote> {
        let mut moved = Vec::new();
        for bucket in [&mut self.yes, &mut self.no, &mut self.invalid] {
            if let Some(mut vote) = bucket.remove(old) {
                vote.party_id = new.to_string();
                bucket.insert(new.to_string(), vote.clone());
                moved.push(vote);
            }
        }
        moved
    }

    /// Every vote, ordered by party.
    pub fn sorted(&self) -> Vec<Vote> {
        let mut all: Vec<Vote> = self
            .yes
            .values()
            .chain(self.no.values())
            .chain(self.invalid.values())
            .cloned()
            .collect();
        all.sort_by(|a, b| a.party_id.cmp(&b.party_id));
        all
    }

    pub fn counts(&self) -> (u64, u64, u64) {
        (
            self.yes.len() as u64,
            self.no.len() as u64,
            self.invalid.len() as u64,
        )
    }
}

/// A proposal with its live votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedProposal {
    pub proposal: Proposal,
    pub votes: VoteSet,
}

impl TrackedProposal {
    pub fn new(proposal: Proposal) -> Self {
        TrackedProposal {
            proposal,
            votes: VoteSet::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.proposal.id
    }

    pub fn add_vote(&mut self, vote: Vote) -> Result<(), GovernanceError> {
        if !self.proposal.is_open_for_votes() {
            return Err(GovernanceError::ProposalNotOpenForVotes);
        }
        self.votes.cast(vote);
        Ok(())
    }

    /// Tallies the votes and moves the proposal to `Passed` or `Declined`.
    ///
    /// Only an `Open` proposal is tallied; later calls are no-ops.
    pub fn close(&mut self, accounts: &dyn StakingAccounts, markets: &dyn Markets) {
        if !self.proposal.is_open() {
            return;
        }
        close_with(&mut self.proposal, &mut self.votes, accounts, markets);
    }
}

/// Tally shared by single proposals and batch members. The caller guarantees
/// the proposal is open.
pub fn close_with(
    proposal: &mut Proposal,
    votes: &mut VoteSet,
    accounts: &dyn StakingAccounts,
    markets: &dyn Markets,
) {
    let (state, reason) = tally_tokens(proposal, votes, accounts);
    proposal.state = state;
    proposal.reason = reason;

    if state == ProposalState::Declined && reason == ProposalError::ParticipationThresholdNotReached {
        if let Some(market_id) = proposal.equity_like_share_market().map(str::to_string) {
            let (state, reason) = tally_equity_like_share(proposal, votes, &market_id, markets);
            proposal.state = state;
            proposal.reason = reason;
        }
    }

    purge_blank_votes(votes);
}

fn count_tokens(votes: &mut BTreeMap<String, Vote>, accounts: &dyn StakingAccounts) -> u128 {
    let mut tally: u128 = 0;
    for vote in votes.values_mut() {
        vote.total_governance_token_balance =
            accounts.get_available_balance(&vote.party_id).unwrap_or(0);
        tally = tally.saturating_add(vote.total_governance_token_balance);
    }
    tally
}

fn weight_votes(votes: &mut BTreeMap<String, Vote>, total: u128) {
    for vote in votes.values_mut() {
        vote.total_governance_token_weight =
            Decimal::from_ratio(vote.total_governance_token_balance, total);
    }
}

fn tally_tokens(
    proposal: &Proposal,
    votes: &mut VoteSet,
    accounts: &dyn StakingAccounts,
) -> (ProposalState, ProposalError) {
    let supply = accounts.get_staking_asset_total_supply();
    let yes = count_tokens(&mut votes.yes, accounts);
    let no = count_tokens(&mut votes.no, accounts);
    let total = yes.saturating_add(no);

    if total == 0 {
        return (
            ProposalState::Declined,
            ProposalError::ParticipationThresholdNotReached,
        );
    }

    weight_votes(&mut votes.yes, total);
    weight_votes(&mut votes.no, total);

    let majority = proposal.required_majority.mul_ceil_u128(total);
    let participation = proposal.required_participation.mul_ceil_u128(supply);

    if yes >= majority && total >= participation {
        return (ProposalState::Passed, ProposalError::Unspecified);
    }
    if total < participation {
        return (
            ProposalState::Declined,
            ProposalError::ParticipationThresholdNotReached,
        );
    }
    (
        ProposalState::Declined,
        ProposalError::MajorityThresholdNotReached,
    )
}

fn count_equity_like_share(
    votes: &mut BTreeMap<String, Vote>,
    market_id: &str,
    markets: &dyn Markets,
) -> Decimal {
    let mut tally = Decimal::ZERO;
    for vote in votes.values_mut() {
        vote.total_equity_like_share_weight =
            markets.get_equity_like_share_for_market_and_party(market_id, &vote.party_id);
        tally = tally.saturating_add(vote.total_equity_like_share_weight);
    }
    tally
}

fn tally_equity_like_share(
    proposal: &Proposal,
    votes: &mut VoteSet,
    market_id: &str,
    markets: &dyn Markets,
) -> (ProposalState, ProposalError) {
    let yes = count_equity_like_share(&mut votes.yes, market_id, markets);
    let no = count_equity_like_share(&mut votes.no, market_id, markets);
    let total = yes.saturating_add(no);

    let majority = total.saturating_mul(proposal.required_lp_majority);
    let participation = proposal.required_lp_participation;

    if yes >= majority && total >= participation {
        return (ProposalState::Passed, ProposalError::Unspecified);
    }
    if total < participation {
        return (
            ProposalState::Declined,
            ProposalError::ParticipationThresholdNotReached,
        );
    }
    (
        ProposalState::Declined,
        ProposalError::MajorityThresholdNotReached,
    )
}

fn purge_blank_votes(votes: &mut VoteSet) {
    let blank = |v: &Vote| {
        v.total_governance_token_balance == 0 && v.total_equity_like_share_weight.is_zero()
    };
    for bucket in [&mut votes.yes, &mut votes.no] {
        let parties: Vec<String> = bucket
            .iter()
            .filter(|(_, v)| blank(v))
            .map(|(k, _)| k.clone())
            .collect();
        for party in parties {
            if let Some(vote) = bucket.remove(&party) {
                votes.invalid.insert(party, vote);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::types::market::{Market, MarketState};
    use crate::types::{ProposalRationale, ProposalTerms};
    use std::collections::HashMap;

    struct Balances {
        balances: HashMap<&'static str, u128>,
        supply: u128,
    }

    impl StakingAccounts for Balances {
        fn get_available_balance(&self, party: &str) -> Result<u128, CollaboratorError> {
            self.balances
                .get(party)
                .copied()
                .ok_or_else(|| CollaboratorError::NotFound(party.to_string()))
        }
        fn get_staking_asset_total_supply(&self) -> u128 {
            self.supply
        }
    }

    struct NoMarkets;

    impl Markets for NoMarkets {
        fn market_exists(&self, _: &str) -> bool {
            false
        }
        fn get_market(&self, _: &str, _: bool) -> Option<Market> {
            None
        }
        fn get_market_state(&self, _: &str) -> Result<MarketState, CollaboratorError> {
            Err(CollaboratorError::MarketDoesNotExist)
        }
        fn get_equity_like_share_for_market_and_party(&self, _: &str, _: &str) -> Decimal {
            Decimal::ZERO
        }
        fn restore_market(&self, _: &Market) -> Result<(), CollaboratorError> {
            Ok(())
        }
        fn start_opening_auction(&self, _: &str) -> Result<(), CollaboratorError> {
            Ok(())
        }
        fn update_market(&self, _: &Market) -> Result<(), CollaboratorError> {
            Ok(())
        }
        fn is_succeeded(&self, _: &str) -> bool {
            false
        }
    }

    fn open_proposal(majority: Decimal, participation: Decimal) -> TrackedProposal {
        TrackedProposal::new(Proposal {
            id: "p1".into(),
            batch_id: None,
            reference: String::new(),
            party: "proposer".into(),
            state: ProposalState::Open,
            timestamp: 0,
            terms: ProposalTerms {
                closing_timestamp: 10,
                enactment_timestamp: 20,
                validation_timestamp: 0,
                change: None,
            },
            rationale: ProposalRationale::default(),
            reason: ProposalError::Unspecified,
            error_details: String::new(),
            required_majority: majority,
            required_participation: participation,
            required_lp_majority: Decimal::ZERO,
            required_lp_participation: Decimal::ZERO,
        })
    }

    fn vote(party: &str, value: VoteValue) -> Vote {
        Vote {
            party_id: party.into(),
            proposal_id: "p1".into(),
            value,
            timestamp: 0,
            total_governance_token_balance: 0,
            total_governance_token_weight: Decimal::ZERO,
            total_equity_like_share_weight: Decimal::ZERO,
        }
    }

    #[test]
    fn test_passes_with_majority_and_participation() {
        let accounts = Balances {
            balances: HashMap::from([("a", 7), ("b", 1)]),
            supply: 9,
        };
        let mut p = open_proposal(Decimal::new(66, 2), Decimal::new(1, 5));
        p.add_vote(vote("a", VoteValue::Yes)).unwrap();
        p.add_vote(vote("b", VoteValue::No)).unwrap();
        p.close(&accounts, &NoMarkets);

        assert_eq!(p.proposal.state, ProposalState::Passed);
        assert_eq!(p.votes.yes["a"].total_governance_token_balance, 7);
        assert_eq!(
            p.votes.yes["a"].total_governance_token_weight,
            Decimal::from_ratio(7, 8)
        );
    }

    #[test]
    fn test_zero_votes_always_decline() {
        let accounts = Balances {
            balances: HashMap::new(),
            supply: 9,
        };
        let mut p = open_proposal(Decimal::ZERO, Decimal::ZERO);
        p.close(&accounts, &NoMarkets);
        assert_eq!(p.proposal.state, ProposalState::Declined);
        assert_eq!(p.proposal.reason, ProposalError::ParticipationThresholdNotReached);
    }

    #[test]
    fn test_majority_failure_reported_after_participation() {
        let accounts = Balances {
            balances: HashMap::from([("a", 3), ("b", 5)]),
            supply: 9,
        };
        let mut p = open_proposal(Decimal::new(66, 2), Decimal::new(1, 5));
        p.add_vote(vote("a", VoteValue::Yes)).unwrap();
        p.add_vote(vote("b", VoteValue::No)).unwrap();
        p.close(&accounts, &NoMarkets);
        assert_eq!(p.proposal.reason, ProposalError::MajorityThresholdNotReached);

        let mut p = open_proposal(Decimal::new(66, 2), Decimal::ONE);
        p.add_vote(vote("a", VoteValue::Yes)).unwrap();
        p.close(&accounts, &NoMarkets);
        assert_eq!(p.proposal.reason, ProposalError::ParticipationThresholdNotReached);
    }

    #[test]
    fn test_second_close_is_noop() {
        let mut accounts = Balances {
            balances: HashMap::from([("a", 7)]),
            supply: 9,
        };
        let mut p = open_proposal(Decimal::new(66, 2), Decimal::new(1, 5));
        p.add_vote(vote("a", VoteValue::Yes)).unwrap();
        p.close(&accounts, &NoMarkets);
        accounts.balances.insert("a", 70);
        p.close(&accounts, &NoMarkets);
        assert_eq!(p.votes.yes["a"].total_governance_token_balance, 7);
    }

    #[test]
    fn test_blank_votes_become_invalid() {
        let accounts = Balances {
            balances: HashMap::from([("a", 7), ("gone", 0)]),
            supply: 9,
        };
        let mut p = open_proposal(Decimal::new(66, 2), Decimal::new(1, 5));
        p.add_vote(vote("a", VoteValue::Yes)).unwrap();
        p.add_vote(vote("gone", VoteValue::No)).unwrap();
        p.close(&accounts, &NoMarkets);
        assert!(p.votes.no.is_empty());
        assert!(p.votes.invalid.contains_key("gone"));
        assert_eq!(p.votes.counts(), (1, 0, 1));
    }

    #[test]
    fn test_vote_overwrite_moves_between_buckets() {
        let mut p = open_proposal(Decimal::ZERO, Decimal::ZERO);
        p.add_vote(vote("a", VoteValue::Yes)).unwrap();
        p.add_vote(vote("a", VoteValue::No)).unwrap();
        assert!(p.votes.yes.is_empty());
        assert!(p.votes.no.contains_key("a"));
    }

    #[test]
    fn test_rekey_moves_vote() {
        let mut set = VoteSet::default();
        set.cast(vote("old", VoteValue::Yes));
        let moved = set.rekey("old", "new");
        assert_eq!(moved.len(), 1);
        assert_eq!(set.yes["new"].party_id, "new");
        assert!(!set.yes.contains_key("old"));
    }
}
