// Integration tests for the Lantern engine HTTP surface
// Driven in-process with tower::ServiceExt::oneshot - no listener needed.
// Every test builds its own engine (own store, gate, rate limiter).

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::Request;
use axum::Router;
use futures::{Stream, StreamExt};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use lantern_core::{EventStore, NewEvent};
use lantern_engine::auth::{AuthGate, AuthState, FileStore, RateLimiter};
use lantern_engine::config::default_cors_origins;
use lantern_engine::{build_app, AppState, EventBroadcaster, EventPublisher};
use lantern_storage::InMemoryEventStore;

struct TestEngine {
    app: Router,
    token: String,
    broadcaster: Arc<EventBroadcaster>,
    publisher: EventPublisher,
    _data_dir: TempDir,
}

fn test_engine() -> TestEngine {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let broadcaster = Arc::new(EventBroadcaster::new(store.clone()));
    let publisher = EventPublisher::new(store.clone(), broadcaster.clone());

    let data_dir = tempfile::tempdir().expect("tempdir");
    let gate = Arc::new(AuthGate::new(Box::new(FileStore::new(
        data_dir.path().join(".auth_token"),
    ))));
    let token = gate.token().expect("token");
    let auth_state = AuthState::new(gate, Arc::new(RateLimiter::new()));

    let state = AppState::new(store, broadcaster.clone(), "file");
    let app = build_app(state, auth_state, &default_cors_origins());

    TestEngine {
        app,
        token,
        broadcaster,
        publisher,
        _data_dir: data_dir,
    }
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

async fn next_frame<S>(stream: &mut S) -> String
where
    S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
{
    let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended unexpectedly")
        .expect("body error");
    String::from_utf8(chunk.to_vec()).expect("frame is utf-8")
}

fn frame_id(frame: &str) -> i64 {
    frame
        .lines()
        .find_map(|line| line.strip_prefix("id: "))
        .expect("frame has an id line")
        .parse()
        .expect("numeric id")
}

#[tokio::test]
async fn test_root_is_public() {
    let engine = test_engine();

    let response = engine.app.oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = body_json(response).await;
    assert_eq!(body["name"], "Lantern Engine");
    assert_eq!(body["api"], "/v1");
}

#[tokio::test]
async fn test_openapi_spec_is_public() {
    let engine = test_engine();

    let response = engine
        .app
        .oneshot(get("/api-doc/openapi.json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let spec = body_json(response).await;
    assert_eq!(spec["info"]["title"], "Lantern Engine");
}

#[tokio::test]
async fn test_missing_auth_returns_401() {
    let engine = test_engine();

    let response = engine
        .app
        .oneshot(get("/v1/engine/status", None))
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let body = body_json(response).await;
    assert_eq!(body["error"], "E_AUTH_MISSING");
    assert_eq!(body["code"], "missing_auth");
}

#[tokio::test]
async fn test_malformed_auth_header_returns_401() {
    let engine = test_engine();

    let request = Request::builder()
        .uri("/v1/engine/status")
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let response = engine.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 401);

    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_auth");
}

#[tokio::test]
async fn test_wrong_token_returns_401() {
    let engine = test_engine();

    let response = engine
        .app
        .oneshot(get("/v1/engine/status", Some("lt_wrong-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_token");
}

#[tokio::test]
async fn test_status_with_valid_token() {
    let engine = test_engine();
    engine
        .publisher
        .publish(NewEvent::new("job.queued").with_job_id("j1"))
        .await
        .unwrap();

    let response = engine
        .app
        .oneshot(get("/v1/engine/status", Some(&engine.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let status = body_json(response).await;
    assert_eq!(status["name"], "Lantern Engine");
    assert_eq!(status["current_sequence"], 1);
    assert_eq!(status["active_connections"], 0);
    assert_eq!(status["secret_store"], "file");
}

#[tokio::test]
async fn test_cors_preflight_bypasses_auth() {
    let engine = test_engine();

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/v1/engine/status")
        .header("Origin", "http://localhost:1420")
        .header("Access-Control-Request-Method", "GET")
        .header("Access-Control-Request-Headers", "authorization")
        .body(Body::empty())
        .unwrap();
    let response = engine.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_rate_limit_rejects_before_token_comparison() {
    let engine = test_engine();

    // Ten failures from one client identity fill the window
    for _ in 0..10 {
        let response = engine
            .app
            .clone()
            .oneshot(get("/v1/engine/status", Some("lt_wrong-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
    }

    // The 11th attempt is throttled even with the correct token
    let response = engine
        .app
        .oneshot(get("/v1/engine/status", Some(&engine.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), 429);

    let body = body_json(response).await;
    assert_eq!(body["error"], "E_AUTH_RATE_LIMITED");
    assert_eq!(body["code"], "rate_limited");
}

#[tokio::test]
async fn test_stream_replays_then_goes_live() {
    let engine = test_engine();
    for i in 1..=3 {
        engine
            .publisher
            .publish(
                NewEvent::new("job.progress")
                    .with_job_id("j1")
                    .with_payload(json!({ "step": i })),
            )
            .await
            .unwrap();
    }

    let request = Request::builder()
        .uri("/v1/stream")
        .header("Authorization", format!("Bearer {}", engine.token))
        .header("Last-Event-ID", "0")
        .body(Body::empty())
        .unwrap();
    let response = engine.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

    let mut body = response.into_body().into_data_stream();

    // Reconnect hint first
    assert_eq!(next_frame(&mut body).await, "retry: 3000\n\n");

    // The backlog replays in order
    for expected in 1..=3 {
        let frame = next_frame(&mut body).await;
        assert!(frame.starts_with("event: job.progress\n"));
        assert_eq!(frame_id(&frame), expected);
    }

    // An event published after replay arrives on the live tail - no gap,
    // no duplicate at the boundary
    engine
        .publisher
        .publish(NewEvent::new("job.completed").with_job_id("j1"))
        .await
        .unwrap();
    let frame = next_frame(&mut body).await;
    assert!(frame.starts_with("event: job.completed\n"));
    assert_eq!(frame_id(&frame), 4);
}

#[tokio::test]
async fn test_no_duplicate_at_replay_live_boundary() {
    let engine = test_engine();
    for _ in 0..2 {
        engine
            .publisher
            .publish(NewEvent::new("job.progress").with_job_id("j1"))
            .await
            .unwrap();
    }

    let request = Request::builder()
        .uri("/v1/stream")
        .header("Authorization", format!("Bearer {}", engine.token))
        .header("Last-Event-ID", "0")
        .body(Body::empty())
        .unwrap();
    let response = engine.app.clone().oneshot(request).await.unwrap();
    let mut body = response.into_body().into_data_stream();
    assert_eq!(next_frame(&mut body).await, "retry: 3000\n\n");

    // The connection is registered but replay has not been polled yet, so
    // this event lands in BOTH the replay read and the live queue
    engine
        .publisher
        .publish(NewEvent::new("job.progress").with_job_id("j1"))
        .await
        .unwrap();

    for expected in 1..=3 {
        assert_eq!(frame_id(&next_frame(&mut body).await), expected);
    }

    // The live copy of event 3 must be suppressed: the next frame is the
    // next new event, not a duplicate
    engine
        .publisher
        .publish(NewEvent::new("job.completed").with_job_id("j1"))
        .await
        .unwrap();
    assert_eq!(frame_id(&next_frame(&mut body).await), 4);
}

#[tokio::test]
async fn test_non_numeric_resume_starts_live_only() {
    let engine = test_engine();
    engine
        .publisher
        .publish(NewEvent::new("job.queued"))
        .await
        .unwrap();

    let request = Request::builder()
        .uri("/v1/stream")
        .header("Authorization", format!("Bearer {}", engine.token))
        .header("Last-Event-ID", "not-a-number")
        .body(Body::empty())
        .unwrap();
    let response = engine.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);

    let mut body = response.into_body().into_data_stream();
    assert_eq!(next_frame(&mut body).await, "retry: 3000\n\n");

    // No replay of the existing backlog: the next frame is the live event
    engine
        .publisher
        .publish(NewEvent::new("job.started"))
        .await
        .unwrap();
    let frame = next_frame(&mut body).await;
    assert!(frame.starts_with("event: job.started\n"));
    assert_eq!(frame_id(&frame), 2);
}

#[tokio::test]
async fn test_stream_job_filter_skips_other_jobs() {
    let engine = test_engine();

    let request = Request::builder()
        .uri("/v1/stream?job_id=wanted")
        .header("Authorization", format!("Bearer {}", engine.token))
        .body(Body::empty())
        .unwrap();
    let response = engine.app.clone().oneshot(request).await.unwrap();
    let mut body = response.into_body().into_data_stream();
    assert_eq!(next_frame(&mut body).await, "retry: 3000\n\n");

    engine
        .publisher
        .publish(NewEvent::new("job.progress").with_job_id("other"))
        .await
        .unwrap();
    engine
        .publisher
        .publish(NewEvent::new("job.progress").with_job_id("wanted"))
        .await
        .unwrap();

    // The non-matching event is skipped silently, not an error
    let frame = next_frame(&mut body).await;
    assert_eq!(frame_id(&frame), 2);
    assert!(frame.contains("\"job_id\":\"wanted\""));
}

#[tokio::test]
async fn test_stream_cleanup_on_disconnect() {
    let engine = test_engine();

    let response = engine
        .app
        .clone()
        .oneshot(get("/v1/stream", Some(&engine.token)))
        .await
        .unwrap();
    let mut body = response.into_body().into_data_stream();
    assert_eq!(next_frame(&mut body).await, "retry: 3000\n\n");

    assert_eq!(engine.broadcaster.connection_count(), 1);

    // Client disconnect = dropping the body; cleanup must run unconditionally
    drop(body);
    assert_eq!(engine.broadcaster.connection_count(), 0);
}

#[tokio::test]
async fn test_stream_rejects_missing_auth() {
    let engine = test_engine();

    let response = engine.app.oneshot(get("/v1/stream", None)).await.unwrap();
    assert_eq!(response.status(), 401);
    let body = body_json(response).await;
    assert_eq!(body["code"], "missing_auth");
}
