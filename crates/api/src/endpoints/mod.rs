//! API endpoints.

mod polls;

use axum::{
    Router,
    routing::{get, post},
};

use crate::sse::poll_stream;
use crate::state::AppState;

/// Create the API router.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/polls", post(polls::create_poll).get(polls::list_polls))
        .route(
            "/polls/{poll_id}",
            get(polls::show_poll).delete(polls::deactivate_poll),
        )
        .route("/polls/{poll_id}/votes", post(polls::vote))
        .route("/polls/{poll_id}/results", get(polls::results))
        .route("/polls/{poll_id}/stream", get(poll_stream))
}
