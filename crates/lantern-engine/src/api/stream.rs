// SSE streaming endpoint with replay
//
// Reconnect semantics:
// 1. Register the live connection BEFORE replay, so events broadcast during
//    the replay phase queue up and are delivered after it - never lost.
// 2. If the client supplied a resume point, drain the replay buffer first.
// 3. Switch to the live queue indefinitely; a job filter skips non-matching
//    events instead of ending the stream.
// 4. Unregister the connection on every exit path via a drop guard.
//
// Session phases: REGISTERING -> REPLAYING (optional) -> LIVE -> CLOSED.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use lantern_core::{Event, Result as EngineResult};

use crate::broadcaster::{EventBroadcaster, StreamItem};
use crate::replay::ReplayBuffer;

use super::AppState;

/// Idle timeout after which a keepalive comment is emitted.
pub const STREAM_KEEPALIVE: Duration = Duration::from_secs(30);

/// Reconnect-delay hint sent to clients, in milliseconds.
pub const RETRY_HINT_MILLIS: u64 = 3000;

const KEEPALIVE_FRAME: &str = ": keepalive\n\n";

/// Query parameters for the stream endpoint
#[derive(Debug, Deserialize, IntoParams)]
pub struct StreamQuery {
    /// Resume from this sequence number (alternative to Last-Event-ID)
    pub resume_from: Option<i64>,
    /// Filter events by job id
    pub job_id: Option<String>,
}

/// GET /v1/stream - SSE event stream with at-least-once delivery and replay
#[utoipa::path(
    get,
    path = "/v1/stream",
    params(StreamQuery),
    responses(
        (status = 200, description = "SSE event stream", content_type = "text/event-stream"),
        (status = 401, description = "Missing or invalid auth token"),
        (status = 429, description = "Rate limited")
    ),
    tag = "stream"
)]
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    // Header wins over the query param, per the Last-Event-ID convention
    let header_resume = parse_last_event_id(
        headers
            .get("last-event-id")
            .and_then(|value| value.to_str().ok()),
    );
    let resume_from = header_resume.or(query.resume_from);

    let stream = session_stream(
        state.broadcaster.clone(),
        state.replay.clone(),
        resume_from,
        query.job_id,
        STREAM_KEEPALIVE,
    )
    .await;

    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no") // disable proxy buffering
        .body(body)
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "failed to build stream response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Unregisters the connection however the session ends.
struct ConnectionGuard {
    broadcaster: Arc<EventBroadcaster>,
    connection_id: Uuid,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.broadcaster.remove_connection(self.connection_id);
        tracing::debug!(connection_id = %self.connection_id, "stream session closed");
    }
}

struct Session {
    /// Some while replaying; None once live. REPLAYING -> LIVE is one-way.
    replaying: Option<BoxStream<'static, EngineResult<Event>>>,
    live: BoxStream<'static, StreamItem>,
    job_id: Option<String>,
    /// Highest sequence already delivered to this subscriber. An event
    /// broadcast while replay is in flight reaches the session twice (once
    /// from the store, once from the live queue); the watermark keeps the
    /// handoff duplicate-free.
    delivered_through: i64,
    retry_sent: bool,
    closed: bool,
    _guard: ConnectionGuard,
}

async fn session_stream(
    broadcaster: Arc<EventBroadcaster>,
    replay: ReplayBuffer,
    resume_from: Option<i64>,
    job_id: Option<String>,
    keepalive: Duration,
) -> impl Stream<Item = String> + Send + 'static {
    // Register before replay: anything broadcast while we replay is queued
    // on this connection and delivered after the replay drains
    let connection = broadcaster.add_connection();
    let connection_id = connection.id();
    let guard = ConnectionGuard {
        broadcaster: broadcaster.clone(),
        connection_id,
    };
    let live = broadcaster.events(connection, keepalive).boxed();

    let replaying = match resume_from {
        Some(after) => {
            let has_backlog = match replay.max_sequence().await {
                Ok(max) => max > after,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read max sequence, skipping replay");
                    false
                }
            };
            has_backlog.then(|| replay.replay_events(after, job_id.clone()).boxed())
        }
        None => None,
    };

    tracing::debug!(
        connection_id = %connection_id,
        resume_from = ?resume_from,
        replaying = replaying.is_some(),
        "stream session established"
    );

    let session = Session {
        replaying,
        live,
        job_id,
        delivered_through: resume_from.unwrap_or(0),
        retry_sent: false,
        closed: false,
        _guard: guard,
    };

    stream::unfold(session, |mut session| async move {
        loop {
            if session.closed {
                return None;
            }

            if !session.retry_sent {
                session.retry_sent = true;
                return Some((retry_directive(RETRY_HINT_MILLIS), session));
            }

            if let Some(replaying) = session.replaying.as_mut() {
                match replaying.next().await {
                    Some(Ok(event)) => {
                        session.delivered_through = event.sequence;
                        return Some((format_sse_event(&event), session));
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "replay failed, closing stream");
                        session.closed = true;
                    }
                    None => {
                        tracing::debug!("replay drained, switching to live stream");
                        session.replaying = None;
                    }
                }
                continue;
            }

            match session.live.next().await {
                Some(StreamItem::Event(event)) => {
                    // Already delivered by the replay phase
                    if event.sequence <= session.delivered_through {
                        continue;
                    }
                    // Filter skips silently rather than ending the stream
                    if let Some(job_id) = &session.job_id {
                        if event.job_id.as_deref() != Some(job_id.as_str()) {
                            continue;
                        }
                    }
                    session.delivered_through = event.sequence;
                    return Some((format_sse_event(&event), session));
                }
                Some(StreamItem::Keepalive) => {
                    return Some((KEEPALIVE_FRAME.to_string(), session))
                }
                None => session.closed = true,
            }
        }
    })
}

/// Format an event as an SSE message:
///
/// ```text
/// event: <event_type>
/// id: <sequence_number>
/// data: <json>
/// ```
pub fn format_sse_event(event: &Event) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!(
        "event: {}\nid: {}\ndata: {}\n\n",
        event.event_type, event.sequence, data
    )
}

/// SSE retry directive telling clients how long to wait before reconnecting.
pub fn retry_directive(millis: u64) -> String {
    format!("retry: {millis}\n\n")
}

/// Parse a Last-Event-ID value. Missing or non-numeric values mean "no
/// resume point", never an error.
pub fn parse_last_event_id(value: Option<&str>) -> Option<i64> {
    let value = value?;
    match value.trim().parse() {
        Ok(sequence) => Some(sequence),
        Err(_) => {
            tracing::warn!(value, "ignoring non-numeric Last-Event-ID");
            None
        }
    }
}
