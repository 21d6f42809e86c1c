//! In-memory storage collaborator.
//!
//! Locking is scoped per poll: each poll carries its own vote-table mutex,
//! so concurrent submissions to unrelated polls never serialize against
//! each other. Within one poll, the duplicate check and the insert happen
//! under the same mutex, which makes [`MemoryStore::record_vote`] the
//! atomic race-resolution point the admission gate relies on.

use async_trait::async_trait;
use livepoll_common::{AppError, AppResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::records::{OptionRecord, PollRecord, Tally, VoteRecord};
use crate::PollStore;

/// Per-poll vote table. Guarded by one mutex per poll.
#[derive(Default)]
struct VoteTable {
    votes: Vec<VoteRecord>,
    voters: HashSet<String>,
}

/// All state belonging to one poll.
struct PollState {
    record: RwLock<PollRecord>,
    options: RwLock<Vec<OptionRecord>>,
    // Lock order: votes before record. deactivate_poll takes both in that
    // order, so once it returns no further votes can be admitted.
    votes: Mutex<VoteTable>,
}

/// In-memory implementation of [`PollStore`].
#[derive(Default)]
pub struct MemoryStore {
    polls: RwLock<HashMap<String, Arc<PollState>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn poll_state(&self, poll_id: &str) -> AppResult<Arc<PollState>> {
        let polls = self.polls.read().await;
        polls
            .get(poll_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create_poll(&self, poll: PollRecord) -> AppResult<()> {
        let mut polls = self.polls.write().await;
        if polls.contains_key(&poll.id) {
            return Err(AppError::Internal(format!(
                "Poll ID collision: {}",
                poll.id
            )));
        }
        polls.insert(
            poll.id.clone(),
            Arc::new(PollState {
                record: RwLock::new(poll),
                options: RwLock::new(Vec::new()),
                votes: Mutex::new(VoteTable::default()),
            }),
        );
        Ok(())
    }

    async fn create_option(&self, option: OptionRecord) -> AppResult<()> {
        let state = self.poll_state(&option.poll_id).await?;
        if !state.record.read().await.is_active {
            return Err(AppError::Validation(format!(
                "Poll is not active: {}",
                option.poll_id
            )));
        }
        state.options.write().await.push(option);
        Ok(())
    }

    async fn record_vote(&self, vote: VoteRecord) -> AppResult<()> {
        let state = self.poll_state(&vote.poll_id).await?;

        // Write-time invariant: the denormalized poll_id must match the
        // option's owning poll. Cross-poll option IDs are rejected here.
        {
            let options = state.options.read().await;
            if !options.iter().any(|o| o.id == vote.option_id) {
                return Err(AppError::Validation(format!(
                    "Option {} does not belong to poll {}",
                    vote.option_id, vote.poll_id
                )));
            }
        }

        let mut table = state.votes.lock().await;
        // Inactive polls are reported as not found, same as the admission
        // gate's own check, so the outcome of a vote racing a deactivation
        // does not depend on which check sees the flag first.
        if !state.record.read().await.is_active {
            return Err(AppError::NotFound(format!(
                "Poll not found: {}",
                vote.poll_id
            )));
        }
        if !table.voters.insert(vote.voter_key.clone()) {
            return Err(AppError::AlreadyVoted(vote.poll_id.clone()));
        }
        table.votes.push(vote);
        Ok(())
    }

    async fn get_poll(&self, poll_id: &str) -> AppResult<Option<PollRecord>> {
        let polls = self.polls.read().await;
        match polls.get(poll_id) {
            Some(state) => Ok(Some(state.record.read().await.clone())),
            None => Ok(None),
        }
    }

    async fn get_options(&self, poll_id: &str) -> AppResult<Vec<OptionRecord>> {
        let state = self.poll_state(poll_id).await?;
        let options = state.options.read().await;
        Ok(options.clone())
    }

    async fn list_active_polls(&self) -> AppResult<Vec<PollRecord>> {
        let states: Vec<Arc<PollState>> = {
            let polls = self.polls.read().await;
            polls.values().cloned().collect()
        };

        let mut active = Vec::new();
        for state in states {
            let record = state.record.read().await;
            if record.is_active {
                active.push(record.clone());
            }
        }
        // Most recent first; ULIDs break created_at ties in creation order.
        active.sort_by(|a, b| (&b.created_at, &b.id).cmp(&(&a.created_at, &a.id)));
        Ok(active)
    }

    async fn deactivate_poll(&self, poll_id: &str) -> AppResult<()> {
        let state = self.poll_state(poll_id).await?;
        let _table = state.votes.lock().await;
        let mut record = state.record.write().await;
        record.is_active = false;
        Ok(())
    }

    async fn get_tally(&self, poll_id: &str) -> AppResult<Tally> {
        let state = self.poll_state(poll_id).await?;
        let options = state.options.read().await;
        let mut tally = Tally::zeroed(options.iter().map(|o| o.id.as_str()));
        drop(options);

        let table = state.votes.lock().await;
        for vote in &table.votes {
            if let Some(count) = tally.counts.get_mut(&vote.option_id) {
                *count += 1;
            }
            tally.total += 1;
        }
        Ok(tally)
    }

    async fn has_voted(&self, poll_id: &str, voter_key: &str) -> AppResult<bool> {
        let state = self.poll_state(poll_id).await?;
        let table = state.votes.lock().await;
        Ok(table.voters.contains(voter_key))
    }
}
