//! Durable record types for polls, options and votes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A poll record.
///
/// Immutable after creation except for `is_active`, which is flipped by
/// explicit deactivation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// An option belonging to exactly one poll.
///
/// Options are stored in insertion order, which is also display order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRecord {
    pub id: String,
    /// Back-reference to the owning poll, not ownership.
    pub poll_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A recorded vote.
///
/// `poll_id` is a denormalized copy of the option's poll so the hot paths
/// (duplicate check, recount) never join through the option. The store
/// enforces `vote.poll_id == option.poll_id` at write time; it is never
/// re-derived on read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: String,
    pub option_id: String,
    pub poll_id: String,
    /// Opaque voter identity, derived from the network address. Shared or
    /// proxied addresses collide; this is a documented limitation.
    pub voter_key: String,
    /// Caller's User-Agent header. Recorded only, never used as identity.
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Vote counts for one poll: per-option counters plus the total.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Count per option ID. Every option of the poll has an entry, zero
    /// included.
    pub counts: HashMap<String, u64>,
    /// Total votes across all options.
    pub total: u64,
}

impl Tally {
    /// Tally with a zero counter for each of the given options.
    #[must_use]
    pub fn zeroed<'a, I: IntoIterator<Item = &'a str>>(option_ids: I) -> Self {
        Self {
            counts: option_ids
                .into_iter()
                .map(|id| (id.to_string(), 0))
                .collect(),
            total: 0,
        }
    }

    /// Count for a single option, zero when unknown.
    #[must_use]
    pub fn count(&self, option_id: &str) -> u64 {
        self.counts.get(option_id).copied().unwrap_or(0)
    }
}
