//! Server-Sent Events stream of analytics snapshots.
//!
//! Each frame is `event: analytics` with the serialized snapshot as data.
//! The first frame is computed when the stream opens; later frames are
//! whatever the broker delivers. When the client disconnects, axum drops
//! the stream, which drops the subscription and unregisters it.

use super::error::ApiError;
use super::AppState;
use crate::live::Watch;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use tracing::info;

/// SSE event name used for snapshot frames.
pub const ANALYTICS_EVENT: &str = "analytics";

fn analytics_event(payload: &str) -> Event {
    Event::default().event(ANALYTICS_EVENT).data(payload)
}

/// GET /api/forms/{id}/analytics/stream
pub async fn analytics_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Watch {
        initial,
        subscription,
    } = state.live.watch(&id)?;

    info!(form_id = %id, subscriber = %subscription.id(), "Analytics stream opened");

    let first = stream::once(async move { Ok(analytics_event(&initial)) });
    let updates = stream::unfold(subscription, |mut subscription| async move {
        let payload = subscription.recv().await?;
        Some((Ok::<_, Infallible>(analytics_event(&payload)), subscription))
    });

    Ok(Sse::new(first.chain(updates)).keep_alive(KeepAlive::new().interval(state.keep_alive)))
}
