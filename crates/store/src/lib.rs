//! Storage collaborator for livepoll.
//!
//! The rest of the system talks to durable storage through the
//! [`PollStore`] trait: poll and option creation, atomic vote recording,
//! recounts and duplicate checks. The concrete engine behind the trait is
//! deliberately out of scope; [`MemoryStore`] is the in-process
//! implementation used by the server and by tests.

pub mod memory;
pub mod records;

use async_trait::async_trait;
use livepoll_common::AppResult;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use records::{OptionRecord, PollRecord, Tally, VoteRecord};

/// Durable storage interface for polls, options and votes.
///
/// Implementations must make [`record_vote`](Self::record_vote) the
/// race-resolution point for duplicate submissions: the duplicate check
/// and the insert are one atomic unit per poll, so two concurrent calls
/// with the same `(poll_id, voter_key)` yield exactly one success and one
/// [`AppError::AlreadyVoted`](livepoll_common::AppError::AlreadyVoted).
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Persist a new poll record.
    async fn create_poll(&self, poll: PollRecord) -> AppResult<()>;

    /// Persist a new option. Fails with `NotFound` if the poll is missing
    /// and `Validation` if it is inactive.
    async fn create_option(&self, option: OptionRecord) -> AppResult<()>;

    /// Atomically record a vote.
    ///
    /// Enforces at write time:
    /// - the poll exists and is active,
    /// - the option belongs to `vote.poll_id` (cross-poll IDs rejected),
    /// - no earlier vote by `vote.voter_key` exists in this poll.
    async fn record_vote(&self, vote: VoteRecord) -> AppResult<()>;

    /// Fetch a poll by ID.
    async fn get_poll(&self, poll_id: &str) -> AppResult<Option<PollRecord>>;

    /// Options of a poll in insertion order. Fails with `NotFound` for an
    /// unknown poll.
    async fn get_options(&self, poll_id: &str) -> AppResult<Vec<OptionRecord>>;

    /// Active polls, most recent first.
    async fn list_active_polls(&self) -> AppResult<Vec<PollRecord>>;

    /// Mark a poll inactive. Idempotent; no further votes are accepted
    /// once this returns. Vote records survive for recounts.
    async fn deactivate_poll(&self, poll_id: &str) -> AppResult<()>;

    /// Recount votes per option for a poll, straight from the durable
    /// vote records.
    async fn get_tally(&self, poll_id: &str) -> AppResult<Tally>;

    /// Whether `voter_key` has already voted in `poll_id`.
    async fn has_voted(&self, poll_id: &str, voter_key: &str) -> AppResult<bool>;
}

/// Shared handle to a storage collaborator.
pub type SharedPollStore = Arc<dyn PollStore>;
