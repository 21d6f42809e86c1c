//! Poll endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use livepoll_common::AppResult;
use livepoll_core::TallySnapshot;
use livepoll_store::{OptionRecord, PollRecord};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::extractors::VoterFingerprint;
use crate::state::AppState;

/// Create poll request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 2, message = "poll needs at least 2 options"))]
    pub options: Vec<String>,
}

/// Create poll response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollResponse {
    pub poll_id: String,
}

/// Poll summary for listings.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub poll_id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Poll detail with options and the caller's vote status.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDetail {
    pub poll_id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub options: Vec<OptionDetail>,
    /// Whether this caller's fingerprint already voted here. Counts are
    /// the only per-option state disclosed.
    pub has_voted: bool,
}

/// Option line inside a poll detail.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDetail {
    pub option_id: String,
    pub text: String,
}

impl PollSummary {
    fn from_record(poll: PollRecord) -> Self {
        Self {
            poll_id: poll.id,
            title: poll.title,
            description: poll.description,
            created_at: poll.created_at,
        }
    }
}

/// Vote request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[validate(length(min = 1))]
    pub option_id: String,
}

/// Vote response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub vote_id: String,
}

/// Create a poll with its options.
pub async fn create_poll(
    State(state): State<AppState>,
    Json(req): Json<CreatePollRequest>,
) -> AppResult<(StatusCode, Json<CreatePollResponse>)> {
    req.validate()?;
    let (poll, _) = state
        .registry
        .create_poll(&req.title, &req.description, req.options)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatePollResponse { poll_id: poll.id }),
    ))
}

/// List active polls, most recent first.
pub async fn list_polls(State(state): State<AppState>) -> AppResult<Json<Vec<PollSummary>>> {
    let polls = state.registry.list_active_polls().await?;
    Ok(Json(polls.into_iter().map(PollSummary::from_record).collect()))
}

/// Get poll details with options.
pub async fn show_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    VoterFingerprint(voter): VoterFingerprint,
) -> AppResult<Json<PollDetail>> {
    let (poll, options) = state.registry.poll_with_options(&poll_id).await?;
    let has_voted = state.registry.has_voted(&poll_id, &voter.key).await?;

    Ok(Json(PollDetail {
        poll_id: poll.id,
        title: poll.title,
        description: poll.description,
        created_at: poll.created_at,
        is_active: poll.is_active,
        options: options
            .into_iter()
            .map(|option: OptionRecord| OptionDetail {
                option_id: option.id,
                text: option.text,
            })
            .collect(),
        has_voted,
    }))
}

/// Cast a vote.
pub async fn vote(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    VoterFingerprint(voter): VoterFingerprint,
    Json(req): Json<VoteRequest>,
) -> AppResult<Json<VoteResponse>> {
    req.validate()?;
    let vote_id = state
        .admission
        .submit_vote(&poll_id, &req.option_id, &voter)
        .await?;
    Ok(Json(VoteResponse { vote_id }))
}

/// Current results snapshot.
pub async fn results(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<Json<TallySnapshot>> {
    Ok(Json(state.registry.results(&poll_id).await?))
}

/// Deactivate a poll. Open streams receive a final snapshot and close.
pub async fn deactivate_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<StatusCode> {
    // 404 for polls that never existed; repeat deletes stay idempotent.
    state.registry.get_poll(&poll_id).await?;
    state.registry.deactivate(&poll_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
