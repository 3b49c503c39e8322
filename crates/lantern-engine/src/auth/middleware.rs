// Bearer-token middleware
//
// Order matters: the rate-limit check runs before token comparison, so a
// limited client gets 429 even when it finally supplies the right token.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::gate::AuthGate;
use super::rate_limit::RateLimiter;
use super::token::{mask_token, validate_token};

/// Paths that never require authentication.
const EXEMPT_PATHS: &[&str] = &["/", "/docs", "/api-doc/openapi.json"];

/// Path prefixes that never require authentication (swagger-ui assets).
const EXEMPT_PREFIXES: &[&str] = &["/swagger-ui"];

/// Auth state shared across routes.
#[derive(Clone)]
pub struct AuthState {
    pub gate: Arc<AuthGate>,
    pub limiter: Arc<RateLimiter>,
}

impl AuthState {
    pub fn new(gate: Arc<AuthGate>, limiter: Arc<RateLimiter>) -> Self {
        Self { gate, limiter }
    }
}

/// Structured failure body returned to clients.
#[derive(Debug, Serialize)]
struct AuthErrorBody {
    error: &'static str,
    code: &'static str,
    message: &'static str,
}

fn auth_error(
    status: StatusCode,
    error: &'static str,
    code: &'static str,
    message: &'static str,
) -> Response {
    (
        status,
        Json(AuthErrorBody {
            error,
            code,
            message,
        }),
    )
        .into_response()
}

/// Middleware requiring bearer-token authentication on every route except
/// the allow-list and CORS preflight requests.
pub async fn require_auth(State(auth): State<AuthState>, request: Request, next: Next) -> Response {
    // Browser preflights carry no credentials; the CORS layer answers them
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    if is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let client_id = client_identity(&request);

    if auth.limiter.is_limited(&client_id) {
        tracing::warn!(client = %client_id, "rate limited auth attempt");
        return auth_error(
            StatusCode::TOO_MANY_REQUESTS,
            "E_AUTH_RATE_LIMITED",
            "rate_limited",
            "Too many authentication failures. Wait 60 seconds before retrying.",
        );
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let Some(auth_header) = auth_header else {
        auth.limiter.record_failure(&client_id);
        return auth_error(
            StatusCode::UNAUTHORIZED,
            "E_AUTH_MISSING",
            "missing_auth",
            "Authorization header required. Include 'Authorization: Bearer <token>' in your request.",
        );
    };

    let Some(provided) = auth_header.strip_prefix("Bearer ") else {
        auth.limiter.record_failure(&client_id);
        return auth_error(
            StatusCode::UNAUTHORIZED,
            "E_AUTH_INVALID",
            "invalid_auth",
            "Invalid authorization header format. Expected 'Bearer <token>'.",
        );
    };

    let expected = match auth.gate.token() {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "failed to load auth token");
            return auth_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "E_AUTH_CONFIG",
                "config_error",
                "Authentication configuration error. Check the engine's secret storage.",
            );
        }
    };

    if !validate_token(provided, &expected) {
        auth.limiter.record_failure(&client_id);
        tracing::warn!(client = %client_id, token = %mask_token(provided), "invalid auth token");
        return auth_error(
            StatusCode::UNAUTHORIZED,
            "E_AUTH_INVALID",
            "invalid_token",
            "Invalid authentication token. Rotate or reset the engine token from the desktop app, then retry with the new value.",
        );
    }

    next.run(request).await
}

fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path) || EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Identity used for failure rate limiting (ip:port of the loopback peer).
fn client_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
