//! Broadcast hub for live tally streams.
//!
//! One watch channel per poll. Watch channels hold only the latest
//! snapshot, so delivery is last-value-wins by construction: a slow
//! subscriber coalesces missed updates into the newest snapshot and never
//! blocks delivery to anyone else. Dropping a [`Subscription`] releases
//! everything it held; there are no per-subscriber tasks or timers to leak.

use livepoll_common::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};

use crate::services::tally::TallySnapshot;

/// Live handle on one poll's snapshot sequence.
///
/// Yields the snapshot current at subscribe time first, then each
/// subsequent one until the poll is deactivated (graceful end of the
/// sequence, not an error).
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<TallySnapshot>,
}

impl Subscription {
    /// The latest snapshot without waiting.
    #[must_use]
    pub fn latest(&self) -> TallySnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next unseen snapshot. Returns `None` once the poll's
    /// channel closes after its final snapshot was observed.
    pub async fn next(&mut self) -> Option<TallySnapshot> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Unwrap into the underlying watch receiver, for adapters that bridge
    /// the subscription onto a transport stream.
    #[must_use]
    pub fn into_receiver(self) -> watch::Receiver<TallySnapshot> {
        self.rx
    }
}

/// Per-poll set of live subscribers.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<RwLock<HashMap<String, watch::Sender<TallySnapshot>>>>,
}

impl BroadcastHub {
    /// Create a hub with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel for a freshly created poll, seeded with its initial
    /// (all-zero) snapshot.
    pub async fn register(&self, poll_id: &str, initial: TallySnapshot) {
        let (tx, _) = watch::channel(initial);
        let mut channels = self.channels.write().await;
        channels.insert(poll_id.to_string(), tx);
    }

    /// Subscribe to a poll's live snapshots. Fails with `NotFound` when the
    /// poll is missing or already deactivated.
    pub async fn subscribe(&self, poll_id: &str) -> AppResult<Subscription> {
        let channels = self.channels.read().await;
        let tx = channels
            .get(poll_id)
            .ok_or_else(|| AppError::NotFound(format!("No live stream for poll: {poll_id}")))?;
        Ok(Subscription { rx: tx.subscribe() })
    }

    /// Push a new snapshot to every subscriber of the poll. Subscribers
    /// that lag simply skip to this value.
    ///
    /// Totals only grow while a poll is active, so a snapshot carrying a
    /// lower total than the current value is a publisher that lost the
    /// race; it is dropped to keep delivery monotonic.
    pub async fn publish(&self, poll_id: &str, snapshot: TallySnapshot) -> AppResult<()> {
        let channels = self.channels.read().await;
        let tx = channels
            .get(poll_id)
            .ok_or_else(|| AppError::NotFound(format!("No live stream for poll: {poll_id}")))?;
        tx.send_if_modified(|current| {
            if snapshot.total_votes >= current.total_votes {
                *current = snapshot;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    /// Close a poll's channel: subscribers observe `final_snapshot` and
    /// then their stream terminates. Idempotent.
    pub async fn close(&self, poll_id: &str, final_snapshot: Option<TallySnapshot>) {
        let tx = {
            let mut channels = self.channels.write().await;
            channels.remove(poll_id)
        };
        if let Some(tx) = tx
            && let Some(snapshot) = final_snapshot
        {
            tx.send_replace(snapshot);
        }
        // tx drops here; every receiver's stream ends after the last value.
    }

    /// Number of live subscribers across a poll's channel.
    pub async fn subscriber_count(&self, poll_id: &str) -> usize {
        let channels = self.channels.read().await;
        channels.get(poll_id).map_or(0, watch::Sender::receiver_count)
    }
}
