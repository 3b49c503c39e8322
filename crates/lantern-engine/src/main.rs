// Lantern Engine server
// Decision: Single shared bearer token per installation, keychain-first storage
// Decision: Default store is on-disk SQLite under the data dir; "memory" runs without one

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lantern_core::EventStore;
use lantern_engine::auth::{detect_secret_store, AuthGate, AuthState, RateLimiter, ScrubMakeWriter, SERVICE_NAME};
use lantern_engine::config::{EngineConfig, MEMORY_DATABASE_URL};
use lantern_engine::{build_app, AppState, EventBroadcaster};
use lantern_storage::{InMemoryEventStore, SqliteEventStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // All log output passes through the token scrubber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lantern_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(ScrubMakeWriter::default()))
        .init();

    tracing::info!("lantern-engine starting...");

    let config = EngineConfig::from_env().context("invalid engine configuration")?;

    // Open the event store
    let store: Arc<dyn EventStore> = match config.database_url.as_deref() {
        Some(MEMORY_DATABASE_URL) => {
            tracing::warn!("running on the in-memory event store; events are lost on restart");
            Arc::new(InMemoryEventStore::new())
        }
        Some(url) => {
            let store = SqliteEventStore::from_url(url)
                .await
                .context("failed to open event store")?;
            tracing::info!(url = %url, "event store opened");
            Arc::new(store)
        }
        None => {
            let path = config.default_db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("failed to create data dir")?;
            }
            let store = SqliteEventStore::from_path(&path)
                .await
                .context("failed to open event store")?;
            tracing::info!(path = %path.display(), "event store opened");
            Arc::new(store)
        }
    };

    let broadcaster = Arc::new(EventBroadcaster::new(store.clone()));

    // Secret store is picked once, up front
    let secret_store = detect_secret_store(SERVICE_NAME, config.token_file_path());
    tracing::info!(storage = secret_store.kind(), "secret store selected");
    let gate = Arc::new(AuthGate::new(secret_store));
    // Fail fast on unreadable secrets instead of 500ing the first request
    gate.token().context("failed to initialize auth token")?;

    let auth_state = AuthState::new(gate.clone(), Arc::new(RateLimiter::new()));
    let state = AppState::new(store, broadcaster, gate.storage_kind());

    let app = build_app(state, auth_state, &config.cors_origins);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;
    tracing::info!("listening on {}", addr);

    // Peer addresses feed the auth rate limiter's client identities
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
