//! Vote admission gate.
//!
//! The correctness-critical path: validates the vote target, records the
//! vote through the storage collaborator (whose atomic insert resolves
//! duplicate races), and only after the commit updates the in-memory tally
//! and pushes a fresh snapshot to the poll's subscribers. Post-commit
//! failures are logged and swallowed: a missed live update is acceptable,
//! losing a committed vote is not.

use livepoll_common::{AppError, AppResult, IdGenerator};
use livepoll_store::{SharedPollStore, VoteRecord};
use std::time::Duration;
use tokio::time::timeout;

use crate::services::broadcast::BroadcastHub;
use crate::services::tally::{TallyService, TallySnapshot};

/// Voter identity as seen by the admission gate.
///
/// The key is the first entry of the forwarded-address list when present,
/// else the direct peer address. Voters behind a shared NAT or proxy
/// collide on the same key; that is a documented limitation of
/// address-derived identity, not something the gate tries to repair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Voter {
    pub key: String,
    pub user_agent: String,
}

impl Voter {
    /// Derive a voter from the `X-Forwarded-For` header value and the
    /// direct peer address.
    #[must_use]
    pub fn derive(forwarded_for: Option<&str>, peer_addr: &str, user_agent: &str) -> Self {
        let key = forwarded_for
            .and_then(|list| list.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty())
            .unwrap_or(peer_addr)
            .to_string();
        Self {
            key,
            user_agent: user_agent.to_string(),
        }
    }
}

/// Vote admission gate.
#[derive(Clone)]
pub struct AdmissionGate {
    store: SharedPollStore,
    tally: TallyService,
    hub: BroadcastHub,
    id_gen: IdGenerator,
    storage_timeout: Duration,
}

impl AdmissionGate {
    /// Create a new admission gate.
    #[must_use]
    pub const fn new(
        store: SharedPollStore,
        tally: TallyService,
        hub: BroadcastHub,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tally,
            hub,
            id_gen: IdGenerator::new(),
            storage_timeout,
        }
    }

    /// Submit a vote. Returns the new vote's ID.
    ///
    /// Exactly one of N concurrent submissions with the same
    /// `(poll_id, voter_key)` succeeds; the rest fail with `AlreadyVoted`.
    pub async fn submit_vote(
        &self,
        poll_id: &str,
        option_id: &str,
        voter: &Voter,
    ) -> AppResult<String> {
        let poll = self
            .bounded(self.store.get_poll(poll_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;
        if !poll.is_active {
            return Err(AppError::NotFound(format!("Poll not found: {poll_id}")));
        }

        let options = self.bounded(self.store.get_options(poll_id)).await?;
        let Some(option) = options.iter().find(|o| o.id == option_id) else {
            return Err(AppError::Validation(format!(
                "Option {option_id} does not belong to poll {poll_id}"
            )));
        };

        let vote = VoteRecord {
            id: self.id_gen.generate(),
            option_id: option.id.clone(),
            // Denormalized at write time; the store re-checks the match.
            poll_id: option.poll_id.clone(),
            voter_key: voter.key.clone(),
            user_agent: voter.user_agent.clone(),
            created_at: chrono::Utc::now(),
        };
        let vote_id = vote.id.clone();

        // The atomic check-and-insert. AlreadyVoted and Storage errors
        // surface to the caller; nothing below can undo this commit.
        self.bounded(self.store.record_vote(vote)).await?;

        match self.tally.increment(poll_id, option_id).await {
            Ok(tally) => {
                let snapshot = TallySnapshot::assemble(&poll, &options, &tally);
                if let Err(err) = self.hub.publish(poll_id, snapshot).await {
                    tracing::warn!(poll_id = %poll_id, error = %err, "Snapshot publish failed after committed vote");
                }
            }
            Err(err) => {
                tracing::warn!(poll_id = %poll_id, error = %err, "Tally update failed after committed vote");
            }
        }

        tracing::debug!(poll_id = %poll_id, option_id = %option_id, vote_id = %vote_id, "Vote admitted");
        Ok(vote_id)
    }

    /// Run a storage call under the configured timeout. An expired call
    /// surfaces as a retryable storage error instead of hanging.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = AppResult<T>> + Send,
    ) -> AppResult<T> {
        timeout(self.storage_timeout, call).await.map_err(|_| {
            AppError::Storage(format!(
                "Storage call exceeded {}ms",
                self.storage_timeout.as_millis()
            ))
        })?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::registry::PollRegistry;
    use livepoll_store::MemoryStore;
    use std::sync::Arc;

    struct Fixture {
        registry: PollRegistry,
        gate: AdmissionGate,
        tally: TallyService,
        hub: BroadcastHub,
        store: SharedPollStore,
    }

    fn fixture() -> Fixture {
        let store: SharedPollStore = Arc::new(MemoryStore::new());
        let tally = TallyService::new();
        let hub = BroadcastHub::new();
        Fixture {
            registry: PollRegistry::new(Arc::clone(&store), tally.clone(), hub.clone()),
            gate: AdmissionGate::new(
                Arc::clone(&store),
                tally.clone(),
                hub.clone(),
                Duration::from_secs(5),
            ),
            tally,
            hub,
            store,
        }
    }

    fn voter(key: &str) -> Voter {
        Voter {
            key: key.to_string(),
            user_agent: "test".to_string(),
        }
    }

    async fn fruit_poll(fx: &Fixture) -> (String, String, String) {
        let (poll, options) = fx
            .registry
            .create_poll(
                "Best fruit",
                "",
                vec!["Apple".to_string(), "Banana".to_string()],
            )
            .await
            .unwrap();
        (poll.id, options[0].id.clone(), options[1].id.clone())
    }

    #[test]
    fn test_voter_key_derivation() {
        let direct = Voter::derive(None, "203.0.113.9", "ua");
        assert_eq!(direct.key, "203.0.113.9");

        let forwarded = Voter::derive(Some("198.51.100.1, 10.0.0.2"), "203.0.113.9", "ua");
        assert_eq!(forwarded.key, "198.51.100.1");

        let blank = Voter::derive(Some("  "), "203.0.113.9", "ua");
        assert_eq!(blank.key, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_best_fruit_scenario() {
        let fx = fixture();
        let (poll_id, apple, banana) = fruit_poll(&fx).await;
        let alice = voter("10.0.0.1");

        fx.gate.submit_vote(&poll_id, &apple, &alice).await.unwrap();
        let tally = fx.tally.get_tally(&poll_id).await.unwrap();
        assert_eq!(tally.count(&apple), 1);
        assert_eq!(tally.count(&banana), 0);
        assert_eq!(tally.total, 1);

        // Second vote by the same voter, any option: rejected, tally unchanged.
        let err = fx
            .gate
            .submit_vote(&poll_id, &banana, &alice)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyVoted(_)));
        let tally = fx.tally.get_tally(&poll_id).await.unwrap();
        assert_eq!(tally.count(&apple), 1);
        assert_eq!(tally.count(&banana), 0);
        assert_eq!(tally.total, 1);
    }

    #[tokio::test]
    async fn test_cross_poll_option_is_validation_error() {
        let fx = fixture();
        let (poll_id, _, _) = fruit_poll(&fx).await;
        let (_, other_options) = fx
            .registry
            .create_poll("Other", "", vec!["X".to_string(), "Y".to_string()])
            .await
            .unwrap();

        let err = fx
            .gate
            .submit_vote(&poll_id, &other_options[0].id, &voter("10.0.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_vote_on_deactivated_poll_is_not_found() {
        let fx = fixture();
        let (poll_id, apple, _) = fruit_poll(&fx).await;
        fx.registry.deactivate(&poll_id).await.unwrap();

        let err = fx
            .gate
            .submit_vote(&poll_id, &apple, &voter("10.0.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_vote_publishes_snapshot() {
        let fx = fixture();
        let (poll_id, apple, _) = fruit_poll(&fx).await;

        let mut sub = fx.hub.subscribe(&poll_id).await.unwrap();
        assert_eq!(sub.latest().total_votes, 0);

        fx.gate
            .submit_vote(&poll_id, &apple, &voter("10.0.0.1"))
            .await
            .unwrap();

        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.total_votes, 1);
        let apple_line = snapshot
            .results
            .iter()
            .find(|r| r.option_id == apple)
            .unwrap();
        assert_eq!(apple_line.votes, 1);
        assert_eq!(apple_line.percentage, 100.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_votes() {
        let fx = fixture();
        let (poll_id, apple, banana) = fruit_poll(&fx).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let gate = fx.gate.clone();
            let poll_id = poll_id.clone();
            let option = if i % 2 == 0 { apple.clone() } else { banana.clone() };
            handles.push(tokio::spawn(async move {
                gate.submit_vote(&poll_id, &option, &voter("10.0.0.1")).await
            }));
        }

        let mut successes = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::AlreadyVoted(_)) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(fx.tally.get_tally(&poll_id).await.unwrap().total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_hundred_distinct_voters_split_60_40() {
        let fx = fixture();
        let (poll_id, apple, banana) = fruit_poll(&fx).await;

        let mut handles = Vec::new();
        for i in 0..100 {
            let gate = fx.gate.clone();
            let poll_id = poll_id.clone();
            let option = if i < 60 { apple.clone() } else { banana.clone() };
            handles.push(tokio::spawn(async move {
                gate.submit_vote(&poll_id, &option, &voter(&format!("10.0.1.{i}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let tally = fx.tally.get_tally(&poll_id).await.unwrap();
        assert_eq!(tally.count(&apple), 60);
        assert_eq!(tally.count(&banana), 40);
        assert_eq!(tally.total, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscriber_snapshot_matches_tally_at_quiescence() {
        let fx = fixture();
        let (poll_id, apple, banana) = fruit_poll(&fx).await;
        let sub = fx.hub.subscribe(&poll_id).await.unwrap();

        // Concurrent publishers race each other; the channel must end up
        // holding the newest snapshot, never a regressed one.
        let mut handles = Vec::new();
        for i in 0..16 {
            let gate = fx.gate.clone();
            let poll_id = poll_id.clone();
            let option = if i % 2 == 0 { apple.clone() } else { banana.clone() };
            handles.push(tokio::spawn(async move {
                gate.submit_vote(&poll_id, &option, &voter(&format!("10.0.4.{i}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let tally = fx.tally.get_tally(&poll_id).await.unwrap();
        assert_eq!(tally.total, 16);
        assert_eq!(sub.latest().total_votes, tally.total);
    }

    #[tokio::test]
    async fn test_tally_rebuilt_from_durable_votes_after_restart() {
        let fx = fixture();
        let (poll_id, apple, banana) = fruit_poll(&fx).await;

        for i in 0..5 {
            let option = if i < 3 { &apple } else { &banana };
            fx.gate
                .submit_vote(&poll_id, option, &voter(&format!("10.0.2.{i}")))
                .await
                .unwrap();
        }
        let before = fx.tally.get_tally(&poll_id).await.unwrap();

        // Simulated restart: fresh counters over the same durable store.
        let rebuilt = TallyService::new();
        rebuilt.rebuild(&fx.store).await.unwrap();
        let after = rebuilt.get_tally(&poll_id).await.unwrap();

        assert_eq!(before, after);
        assert_eq!(after.count(&apple), 3);
        assert_eq!(after.count(&banana), 2);
        assert_eq!(after.total, 5);
    }

    #[tokio::test]
    async fn test_deactivation_mid_stream_ends_with_final_snapshot() {
        let fx = fixture();
        let (poll_id, apple, _) = fruit_poll(&fx).await;

        let mut sub = fx.hub.subscribe(&poll_id).await.unwrap();
        fx.gate
            .submit_vote(&poll_id, &apple, &voter("10.0.0.1"))
            .await
            .unwrap();
        fx.registry.deactivate(&poll_id).await.unwrap();

        // Final snapshot reflects the committed vote, then the stream ends.
        let final_snapshot = sub.next().await.unwrap();
        assert_eq!(final_snapshot.total_votes, 1);
        assert!(sub.next().await.is_none());
        assert!(fx.hub.subscribe(&poll_id).await.is_err());
    }
}
