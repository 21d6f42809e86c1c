//! Server-Sent Events stream of live poll results.
//!
//! Each subscriber gets its own stream over the poll's watch channel: the
//! current snapshot arrives first, then every subsequent one until the
//! client disconnects (dropping the stream and with it the subscription)
//! or the poll is deactivated (final snapshot, then a clean end of
//! stream). Slow readers coalesce to the latest snapshot instead of
//! queueing.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::header,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use livepoll_common::AppResult;
use tokio_stream::{StreamExt, wrappers::WatchStream};

use crate::state::AppState;

/// Live results stream for one poll.
pub async fn poll_stream(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let subscription = state.hub.subscribe(&poll_id).await?;
    tracing::debug!(poll_id = %poll_id, "Stream subscriber connected");

    let stream = WatchStream::new(subscription.into_receiver()).map(|snapshot| {
        Ok::<Event, Infallible>(
            Event::default()
                .json_data(&snapshot)
                .unwrap_or_else(|_| Event::default().data("error")),
        )
    });

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.stream_keep_alive)
            .text("ping"),
    );

    // SSE responses must never be cached by intermediaries.
    Ok(([(header::CACHE_CONTROL, "no-cache")], sse))
}
