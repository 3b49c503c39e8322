// Lantern Engine Library
// Decision: Shared library for the server binary and integration tests
//
// The engine streams persisted state-change events (job progress, status,
// logs) to live SSE subscribers. Nothing is ever delivered unless it was
// durably written first, and a disconnected subscriber can resume without
// gaps or duplicates. Every request passes the bearer-token auth gate.

// HTTP routes and OpenAPI doc
pub mod api;

// Authentication gate (token storage, validation, rate limiting, scrubbing)
pub mod auth;

// Fan-out engine and connection registry
pub mod broadcaster;

// Environment configuration
pub mod config;

// Persist-then-announce producer seam
pub mod publisher;

// Catch-up reads for reconnecting subscribers
pub mod replay;

// Re-exports for convenience
pub use api::{build_app, ApiDoc, AppState};
pub use broadcaster::{Connection, EventBroadcaster, StreamItem, DEFAULT_QUEUE_CAPACITY};
pub use config::EngineConfig;
pub use publisher::EventPublisher;
pub use replay::{ReplayBuffer, DEFAULT_CHUNK_SIZE};
