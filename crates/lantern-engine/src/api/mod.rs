// HTTP routes and router assembly

pub mod status;
pub mod stream;

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    response::Redirect,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use lantern_core::{Event, EventStore};

use crate::auth::{require_auth, AuthState};
use crate::broadcaster::{ConnectionStats, EventBroadcaster};
use crate::replay::ReplayBuffer;

/// App state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub replay: ReplayBuffer,
    pub started_at: DateTime<Utc>,
    pub secret_store_kind: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EventStore>,
        broadcaster: Arc<EventBroadcaster>,
        secret_store_kind: impl Into<String>,
    ) -> Self {
        let replay = ReplayBuffer::new(store.clone());
        Self {
            store,
            broadcaster,
            replay,
            started_at: Utc::now(),
            secret_store_kind: secret_store_kind.into(),
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(stream::stream_events, status::engine_status),
    components(schemas(Event, status::EngineStatus, ConnectionStats)),
    tags(
        (name = "stream", description = "SSE event streaming"),
        (name = "engine", description = "Engine introspection")
    ),
    info(
        title = "Lantern Engine",
        description = "Local event-delivery backend for the Lantern desktop app",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
    api: &'static str,
    docs: &'static str,
}

/// Root endpoint - unauthenticated identity blob
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: "Lantern Engine",
        version: env!("CARGO_PKG_VERSION"),
        api: "/v1",
        docs: "/docs",
    })
}

/// Create engine routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/docs", get(|| async { Redirect::permanent("/swagger-ui") }))
        .route("/v1/stream", get(stream::stream_events))
        .route("/v1/engine/status", get(status::engine_status))
        .with_state(state)
}

/// Assemble the full application: routes, swagger, auth gate, CORS, tracing.
pub fn build_app(state: AppState, auth_state: AuthState, cors_origins: &[String]) -> Router {
    let app = routes(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // CORS sits outside auth so preflight responses carry the CORS headers
    app.layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
            header::CACHE_CONTROL,
            HeaderName::from_static("last-event-id"),
        ])
        .allow_credentials(true)
}
