//! # Checkpoints
//!
//! A checkpoint carries only the enacted proposals: enough to rebuild the
//! markets governance created when a chain restarts from it.
//!
//! On load:
//!
//! - enacted new markets are restored and restart their opening auction;
//!   when their enactment is already past, closing moves to now and
//!   enactment to now plus the longer of the minimum enactment period and
//!   the original auction
//! - a market the execution engine no longer knows is dropped silently
//! - market updates collapse to the latest enactment per market before the
//!   market is updated
//!
//! Any other collaborator failure during load is fatal.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tradegov_common::Timestamp;

use crate::engine::{secs_between, Engine};
use crate::error::{CollaboratorError, GovernanceError, Result};
use crate::events::GovernanceEvent;
use crate::params::keys;
use crate::types::{Proposal, ProposalChange};

pub const CHECKPOINT_NAME: &str = "governance";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Checkpoint {
    proposals: Vec<Proposal>,
}

impl Engine {
    pub fn checkpoint_name(&self) -> &'static str {
        CHECKPOINT_NAME
    }

    /// Serialized enacted proposals; empty when nothing was enacted.
    pub fn checkpoint(&self) -> Result<Vec<u8>> {
        if self.enacted.is_empty() {
            return Ok(Vec::new());
        }
        let cp = Checkpoint {
            proposals: self.enacted.clone(),
        };
        Ok(bincode::serialize(&cp)?)
    }

    /// Restores enacted proposals from `data`.
    ///
    /// # Panics
    ///
    /// If a market cannot be rebuilt, restored, started or updated for any
    /// reason other than it no longer existing.
    pub fn load_checkpoint(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let cp: Checkpoint = bincode::deserialize(data)?;
        let now = self.now();
        let min_enact = self
            .collab
            .netp
            .get_duration(keys::MARKET_MIN_ENACT)
            .map_err(|e| GovernanceError::NetworkParameter {
                key: keys::MARKET_MIN_ENACT.to_string(),
                message: e.to_string(),
            })?;

        let mut restored = Vec::with_capacity(cp.proposals.len());
        // Latest enactment per market, in first-seen order.
        let mut latest_updates: Vec<Proposal> = Vec::new();

        for mut p in cp.proposals {
            match &p.terms.change {
                Some(ProposalChange::NewMarket(_)) if p.is_enacted() => {
                    // A market whose auction is already over gets a fresh one.
                    if p.terms.enactment_timestamp < now.unix() {
                        let auction =
                            secs_between(p.terms.closing_timestamp, p.terms.enactment_timestamp);
                        let delay = min_enact.max(auction);
                        p.terms.closing_timestamp = now.unix();
                        p.terms.enactment_timestamp = now.add(delay).unix();
                    }
                    if !self.restore_market(&p, now) {
                        continue;
                    }
                }
                Some(ProposalChange::UpdateMarket(um)) => {
                    let market_id = um.market_id.clone();
                    let seen = latest_updates.iter_mut().find(|prev| {
                        prev.terms
                            .update_market()
                            .is_some_and(|u| u.market_id == market_id)
                    });
                    match seen {
                        Some(prev) if prev.terms.enactment_timestamp <= p.terms.enactment_timestamp => {
                            *prev = p.clone();
                        }
                        Some(_) => {}
                        None => latest_updates.push(p.clone()),
                    }
                }
                _ => {}
            }
            restored.push(p);
        }

        for p in &latest_updates {
            self.replay_market_update(p, now);
        }

        info!("restored {} enacted proposals from checkpoint", restored.len());
        let events = restored
            .iter()
            .cloned()
            .map(GovernanceEvent::Proposal)
            .collect();
        for p in restored {
            self.upsert_enacted(p);
        }
        self.collab.broker.send_batch(events);
        Ok(())
    }

    /// Recreates the market of an enacted new market proposal and starts
    /// its opening auction. False when the market is gone.
    fn restore_market(&self, p: &Proposal, now: Timestamp) -> bool {
        let market = match self.into_to_submit(p, now, true, true) {
            Ok(Some(market)) => market,
            Ok(None) => return false,
            Err(r) => panic!("failed to rebuild market {} from checkpoint: {}", p.id, r.error),
        };
        let markets = self.collab.markets.as_ref();
        match markets.restore_market(&market) {
            Ok(()) => {}
            Err(CollaboratorError::MarketDoesNotExist) => {
                debug!("market {} no longer exists, dropping from checkpoint", market.id);
                return false;
            }
            Err(e) => panic!("failed to restore market {}: {e}", market.id),
        }
        if let Err(e) = markets.start_opening_auction(&market.id) {
            panic!("failed to start opening auction for market {}: {e}", market.id);
        }
        true
    }

    fn replay_market_update(&self, p: &Proposal, now: Timestamp) {
        let Some(um) = p.terms.update_market() else {
            return;
        };
        let market = match self.updated_market_from_proposal(p, um, now) {
            Ok(m) => m,
            Err(r) => {
                warn!(proposal_id = %p.id, error = %r.error, "skipping market update from checkpoint");
                return;
            }
        };
        match self.collab.markets.update_market(&market) {
            Ok(()) => {}
            Err(CollaboratorError::MarketDoesNotExist) => {
                debug!("market {} no longer exists, update not replayed", market.id);
            }
            Err(e) => panic!("failed to update market {} from checkpoint: {e}", market.id),
        }
    }
}
