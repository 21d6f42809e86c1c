//! Poll registry service.
//!
//! Lifecycle of polls and options: creation with validation, lookup,
//! listing and idempotent deactivation. Creating a poll also opens its
//! tally counters and broadcast channel; deactivating it closes both after
//! a final snapshot.

use livepoll_common::{AppError, AppResult, IdGenerator};
use livepoll_store::{OptionRecord, PollRecord, SharedPollStore};

use crate::services::broadcast::BroadcastHub;
use crate::services::tally::{TallyService, TallySnapshot};

const MAX_TITLE_LEN: usize = 200;
const MAX_OPTION_LEN: usize = 200;

/// Poll registry service.
#[derive(Clone)]
pub struct PollRegistry {
    store: SharedPollStore,
    tally: TallyService,
    hub: BroadcastHub,
    id_gen: IdGenerator,
}

impl PollRegistry {
    /// Create a new poll registry.
    #[must_use]
    pub const fn new(store: SharedPollStore, tally: TallyService, hub: BroadcastHub) -> Self {
        Self {
            store,
            tally,
            hub,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a poll with its options in one step.
    ///
    /// A poll opens for voting only with at least two non-empty options;
    /// empty option texts are dropped before the check, as the original
    /// creation flow does.
    pub async fn create_poll(
        &self,
        title: &str,
        description: &str,
        options: Vec<String>,
    ) -> AppResult<(PollRecord, Vec<OptionRecord>)> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Poll title must not be empty".into()));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "Poll title is too long (max {MAX_TITLE_LEN} chars)"
            )));
        }

        let texts: Vec<String> = options
            .iter()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();
        if texts.len() < 2 {
            return Err(AppError::Validation(
                "Poll must have at least 2 options".into(),
            ));
        }
        for text in &texts {
            if text.len() > MAX_OPTION_LEN {
                return Err(AppError::Validation(format!(
                    "Option text is too long (max {MAX_OPTION_LEN} chars)"
                )));
            }
        }

        let poll = PollRecord {
            id: self.id_gen.generate(),
            title: title.to_string(),
            description: description.trim().to_string(),
            created_at: chrono::Utc::now(),
            is_active: true,
        };
        self.store.create_poll(poll.clone()).await?;

        let mut created = Vec::with_capacity(texts.len());
        for text in texts {
            let option = OptionRecord {
                id: self.id_gen.generate(),
                poll_id: poll.id.clone(),
                text,
                created_at: chrono::Utc::now(),
            };
            self.store.create_option(option.clone()).await?;
            created.push(option);
        }

        // Open the live side: zeroed counters and a seeded stream channel.
        self.tally
            .register(&poll.id, created.iter().map(|o| o.id.as_str()))
            .await;
        let initial = TallySnapshot::assemble(
            &poll,
            &created,
            &self.tally.get_tally(&poll.id).await?,
        );
        self.hub.register(&poll.id, initial).await;

        tracing::info!(poll_id = %poll.id, options = created.len(), "Created poll");
        Ok((poll, created))
    }

    /// Append an option to an active poll.
    pub async fn add_option(&self, poll_id: &str, text: &str) -> AppResult<OptionRecord> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Option text must not be empty".into()));
        }
        if text.len() > MAX_OPTION_LEN {
            return Err(AppError::Validation(format!(
                "Option text is too long (max {MAX_OPTION_LEN} chars)"
            )));
        }

        // Missing and inactive polls are both reported as not found.
        let poll = self.get_active_poll(poll_id).await?;

        let option = OptionRecord {
            id: self.id_gen.generate(),
            poll_id: poll.id,
            text: text.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.store.create_option(option.clone()).await?;
        Ok(option)
    }

    /// Fetch a poll by ID.
    pub async fn get_poll(&self, poll_id: &str) -> AppResult<PollRecord> {
        self.store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))
    }

    /// Fetch a poll by ID, treating an inactive poll as missing.
    pub async fn get_active_poll(&self, poll_id: &str) -> AppResult<PollRecord> {
        let poll = self.get_poll(poll_id).await?;
        if !poll.is_active {
            return Err(AppError::NotFound(format!("Poll not found: {poll_id}")));
        }
        Ok(poll)
    }

    /// A poll together with its options in display order.
    pub async fn poll_with_options(
        &self,
        poll_id: &str,
    ) -> AppResult<(PollRecord, Vec<OptionRecord>)> {
        let poll = self.get_poll(poll_id).await?;
        let options = self.store.get_options(poll_id).await?;
        Ok((poll, options))
    }

    /// Active polls, most recent first.
    pub async fn list_active_polls(&self) -> AppResult<Vec<PollRecord>> {
        self.store.list_active_polls().await
    }

    /// Whether the given voter already voted in the poll.
    pub async fn has_voted(&self, poll_id: &str, voter_key: &str) -> AppResult<bool> {
        self.store.has_voted(poll_id, voter_key).await
    }

    /// Current results snapshot for an active poll.
    pub async fn results(&self, poll_id: &str) -> AppResult<TallySnapshot> {
        let poll = self.get_active_poll(poll_id).await?;
        let options = self.store.get_options(poll_id).await?;
        let tally = self.tally.get_tally(poll_id).await?;
        Ok(TallySnapshot::assemble(&poll, &options, &tally))
    }

    /// Deactivate a poll. Idempotent.
    ///
    /// Once this returns, the admission gate rejects further votes and the
    /// hub accepts no new subscriptions; open subscriptions receive one
    /// final snapshot and then end.
    pub async fn deactivate(&self, poll_id: &str) -> AppResult<()> {
        // Order matters: stop vote admission first, then close the stream.
        self.store.deactivate_poll(poll_id).await?;

        let final_snapshot = match self.tally.get_tally(poll_id).await {
            Ok(tally) => {
                let poll = self.get_poll(poll_id).await?;
                let options = self.store.get_options(poll_id).await?;
                Some(TallySnapshot::assemble(&poll, &options, &tally))
            }
            // Already closed by an earlier deactivation.
            Err(_) => None,
        };
        self.hub.close(poll_id, final_snapshot).await;
        self.tally.remove(poll_id).await;

        tracing::info!(poll_id = %poll_id, "Deactivated poll");
        Ok(())
    }
}
