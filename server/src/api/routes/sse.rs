//! SSE endpoint for realtime issue events
//!
//! Streams the org-scoped broadcast topic to dashboard clients. Delivery is
//! best-effort with per-connection backpressure: events above the per-second
//! cap are dropped, not buffered.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::Extension;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;

use crate::api::ApiState;
use crate::api::auth::AuthedKey;
use crate::api::types::ApiError;
use crate::core::constants::SSE_MAX_EVENTS_PER_SECOND;
use crate::data::sqlite::repositories::projects;
use crate::data::topics::TopicError;

/// Subscribe to the caller's organization event stream
pub async fn stream(
    State(state): State<ApiState>,
    Extension(AuthedKey(key)): Extension<AuthedKey>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Resolve the key's organization through its project
    let org_id = projects::get_project(state.database.pool(), Some(&state.cache), &key.project_id)
        .await?
        .map(|p| p.organization_id)
        .ok_or_else(|| ApiError::not_found("project not found"))?;

    let subscriber_result = state.realtime.subscribe(&org_id).await;
    let mut shutdown_rx = state.shutdown_rx.clone();

    let stream = async_stream::stream! {
        let mut subscriber = match subscriber_result {
            Ok(sub) => sub,
            Err(e) => {
                tracing::error!(error = %e, "Failed to subscribe to issue event topic");
                yield Ok(Event::default().event("error").data("subscription failed"));
                return;
            }
        };

        let mut events_this_second: u32 = 0;
        let mut second_start = Instant::now();
        let mut dropped_count: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        // Tell the client to reconnect elsewhere
                        yield Ok(Event::default().event("terminate").data("shutdown"));
                        break;
                    }
                }
                result = subscriber.recv() => {
                    match result {
                        Ok(event) => {
                            if second_start.elapsed() >= Duration::from_secs(1) {
                                if dropped_count > 0 {
                                    tracing::debug!(dropped = dropped_count, "SSE events dropped due to rate limit");
                                }
                                events_this_second = 0;
                                dropped_count = 0;
                                second_start = Instant::now();
                            }

                            if events_this_second >= SSE_MAX_EVENTS_PER_SECOND {
                                dropped_count += 1;
                                continue;
                            }

                            match serde_json::to_string(&event) {
                                Ok(data) => {
                                    events_this_second += 1;
                                    yield Ok(Event::default().event("issue").data(data));
                                }
                                Err(e) => {
                                    tracing::error!(error = %e, "Failed to serialize SSE event");
                                }
                            }
                        }
                        Err(TopicError::Lagged(n)) => {
                            tracing::warn!(lagged = n, "SSE subscriber lagged behind");
                        }
                        Err(TopicError::ChannelClosed) => break,
                        Err(_) => break,
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}
