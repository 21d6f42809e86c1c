//! Tally store service.
//!
//! Per-poll in-memory counters mirroring the durable vote records. The
//! admission gate increments after a vote commits; reads are
//! read-your-writes within the process. On startup the counters are
//! rebuilt by a full recount from the storage collaborator, never trusted
//! across restarts.

use chrono::{DateTime, Utc};
use livepoll_common::{AppError, AppResult};
use livepoll_store::{OptionRecord, PollRecord, SharedPollStore, Tally};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Per-option result line inside a snapshot.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    pub option_id: String,
    pub text: String,
    pub votes: u64,
    /// Share of the total, rounded to one decimal place.
    pub percentage: f64,
}

/// Point-in-time tally payload delivered to stream subscribers and the
/// results endpoint.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TallySnapshot {
    pub poll_id: String,
    pub title: String,
    pub total_votes: u64,
    pub results: Vec<OptionResult>,
    pub timestamp: DateTime<Utc>,
}

impl TallySnapshot {
    /// Assemble a snapshot from a poll, its options in display order, and
    /// the current tally.
    #[must_use]
    pub fn assemble(poll: &PollRecord, options: &[OptionRecord], tally: &Tally) -> Self {
        let results = options
            .iter()
            .map(|option| {
                let votes = tally.count(&option.id);
                OptionResult {
                    option_id: option.id.clone(),
                    text: option.text.clone(),
                    votes,
                    percentage: percentage(votes, tally.total),
                }
            })
            .collect();

        Self {
            poll_id: poll.id.clone(),
            title: poll.title.clone(),
            total_votes: tally.total,
            results,
            timestamp: Utc::now(),
        }
    }
}

fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (votes as f64 / total as f64 * 1000.0).round() / 10.0
}

/// In-memory tally counters, one slot per poll.
///
/// Counters for one poll share a mutex, so increments are serialized per
/// poll and never across polls.
#[derive(Clone, Default)]
pub struct TallyService {
    tallies: Arc<RwLock<HashMap<String, Arc<Mutex<Tally>>>>>,
}

impl TallyService {
    /// Create an empty tally store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register zeroed counters for a freshly created poll.
    pub async fn register<'a, I: IntoIterator<Item = &'a str>>(
        &self,
        poll_id: &str,
        option_ids: I,
    ) {
        let mut tallies = self.tallies.write().await;
        tallies.insert(
            poll_id.to_string(),
            Arc::new(Mutex::new(Tally::zeroed(option_ids))),
        );
    }

    async fn slot(&self, poll_id: &str) -> AppResult<Arc<Mutex<Tally>>> {
        let tallies = self.tallies.read().await;
        tallies
            .get(poll_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("No tally for poll: {poll_id}")))
    }

    /// Increment the counter for one option. Called by the admission gate
    /// only after the vote is durably recorded. Returns the updated tally.
    pub async fn increment(&self, poll_id: &str, option_id: &str) -> AppResult<Tally> {
        let slot = self.slot(poll_id).await?;
        let mut tally = slot.lock().await;
        *tally.counts.entry(option_id.to_string()).or_insert(0) += 1;
        tally.total += 1;
        Ok(tally.clone())
    }

    /// Current counts for a poll. Reflects every vote admitted before this
    /// call returns.
    pub async fn get_tally(&self, poll_id: &str) -> AppResult<Tally> {
        let slot = self.slot(poll_id).await?;
        let tally = slot.lock().await;
        Ok(tally.clone())
    }

    /// Drop the counters of a deactivated poll.
    pub async fn remove(&self, poll_id: &str) {
        let mut tallies = self.tallies.write().await;
        tallies.remove(poll_id);
    }

    /// Rebuild all counters from durable vote records, one recount per
    /// active poll. Run at process start before serving traffic.
    pub async fn rebuild(&self, store: &SharedPollStore) -> AppResult<()> {
        let polls = store.list_active_polls().await?;
        let mut rebuilt = HashMap::with_capacity(polls.len());
        for poll in polls {
            let tally = store.get_tally(&poll.id).await?;
            tracing::debug!(poll_id = %poll.id, total = tally.total, "Rebuilt tally");
            rebuilt.insert(poll.id, Arc::new(Mutex::new(tally)));
        }

        let mut tallies = self.tallies.write().await;
        *tallies = rebuilt;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_and_read_back() {
        let service = TallyService::new();
        service.register("p1", ["a", "b"]).await;

        service.increment("p1", "a").await.unwrap();
        service.increment("p1", "a").await.unwrap();
        service.increment("p1", "b").await.unwrap();

        let tally = service.get_tally("p1").await.unwrap();
        assert_eq!(tally.count("a"), 2);
        assert_eq!(tally.count("b"), 1);
        assert_eq!(tally.total, 3);
    }

    #[tokio::test]
    async fn test_unknown_poll() {
        let service = TallyService::new();
        assert!(matches!(
            service.get_tally("nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.increment("nope", "a").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_lossless() {
        let service = TallyService::new();
        service.register("p1", ["a", "b"]).await;

        let mut handles = Vec::new();
        for i in 0..100 {
            let service = service.clone();
            let option = if i < 60 { "a" } else { "b" };
            handles.push(tokio::spawn(async move {
                service.increment("p1", option).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let tally = service.get_tally("p1").await.unwrap();
        assert_eq!(tally.count("a"), 60);
        assert_eq!(tally.count("b"), 40);
        assert_eq!(tally.total, 100);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 1), 100.0);
    }

    #[test]
    fn test_snapshot_shape() {
        use chrono::Utc;
        let poll = PollRecord {
            id: "p1".to_string(),
            title: "Best fruit".to_string(),
            description: String::new(),
            created_at: Utc::now(),
            is_active: true,
        };
        let options = vec![
            OptionRecord {
                id: "apple".to_string(),
                poll_id: "p1".to_string(),
                text: "Apple".to_string(),
                created_at: Utc::now(),
            },
            OptionRecord {
                id: "banana".to_string(),
                poll_id: "p1".to_string(),
                text: "Banana".to_string(),
                created_at: Utc::now(),
            },
        ];
        let mut tally = Tally::zeroed(["apple", "banana"]);
        tally.counts.insert("apple".to_string(), 1);
        tally.total = 1;

        let snapshot = TallySnapshot::assemble(&poll, &options, &tally);
        assert_eq!(snapshot.total_votes, 1);
        assert_eq!(snapshot.results.len(), 2);
        assert_eq!(snapshot.results[0].text, "Apple");
        assert_eq!(snapshot.results[0].votes, 1);
        assert_eq!(snapshot.results[0].percentage, 100.0);
        assert_eq!(snapshot.results[1].votes, 0);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["pollId"], "p1");
        assert_eq!(json["totalVotes"], 1);
        assert_eq!(json["results"][0]["optionId"], "apple");
        assert_eq!(json["results"][0]["percentage"], 100.0);
    }
}
