//! Anteroom HTTP API
//!
//! Axum-based HTTP server for the access-gated chat service.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! directly testable inner function or to the store/identity layers. Page
//! routes run behind the session-refresh middleware; API routes authenticate
//! themselves from the request headers.
//!
//! Endpoints:
//! - GET  /health                          — health check with DB status
//! - POST /api/validate-access             — access gate, issues validation cookie
//! - GET  /auth/callback                   — OAuth handoff guard
//! - POST /auth/signout                    — session teardown
//! - GET  /api/me                          — current user
//! - GET/POST /api/conversations           — conversation CRUD
//! - DELETE /api/conversations/:id
//! - GET/POST /api/conversations/:id/messages
//! - POST /api/chat                        — SSE completion stream
//! - GET  /, /login, /auth/auth-code-error — minimal page shells

use std::sync::Arc;

use anteroom_core::{
    models::AuthUser, AnteroomConfig, AnteroomError, CompletionBackend, IdentityProvider,
};
use anyhow::Result;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::cookies;
use crate::handlers;
use crate::middleware::refresh_session;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AnteroomConfig,
    pub identity: Arc<dyn IdentityProvider>,
    pub completions: Arc<dyn CompletionBackend>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    let pages = Router::new()
        .route("/", get(handlers::pages::index_page))
        .route("/login", get(handlers::pages::login_page))
        .route("/auth/auth-code-error", get(handlers::pages::auth_error_page))
        .route_layer(from_fn_with_state(state.clone(), refresh_session));

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/validate-access",
            post(handlers::access::validate_access_handler),
        )
        .route("/auth/callback", get(handlers::callback::auth_callback_handler))
        .route("/auth/signout", post(handlers::session::sign_out_handler))
        .route("/api/me", get(handlers::session::me_handler))
        .route(
            "/api/conversations",
            get(handlers::conversations::list_conversations_handler)
                .post(handlers::conversations::create_conversation_handler),
        )
        .route(
            "/api/conversations/:id",
            delete(handlers::conversations::delete_conversation_handler),
        )
        .route(
            "/api/conversations/:id/messages",
            get(handlers::conversations::list_messages_handler)
                .post(handlers::conversations::append_message_handler),
        )
        .route("/api/chat", post(handlers::chat::chat_handler))
        .merge(pages)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Anteroom HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Error mapping
// ============================================================================

/// Map the error taxonomy onto an HTTP status plus a minimal JSON body.
/// Server-side failures keep their detail in the log, never in the response.
pub fn error_response(error: &AnteroomError) -> (StatusCode, Json<serde_json::Value>) {
    let (status, message) = match error {
        AnteroomError::Configuration(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error")
        }
        AnteroomError::InvalidCredential(message) => (StatusCode::UNAUTHORIZED, message.as_str()),
        AnteroomError::Forbidden(message) => (StatusCode::FORBIDDEN, message.as_str()),
        AnteroomError::NotFound(message) => (StatusCode::NOT_FOUND, message.as_str()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };

    if status.is_server_error() {
        tracing::error!(error = %error, "request failed");
    }

    (status, Json(serde_json::json!({ "error": message })))
}

// ============================================================================
// Request authentication (API routes)
// ============================================================================

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let authorization = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = authorization.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub fn access_token_from_headers(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers)
        .or_else(|| cookies::extract_cookie_value(headers, cookies::ACCESS_COOKIE_NAME))
}

/// Resolve the caller behind an API request, or fail with InvalidCredential.
/// API routes do not refresh sessions; an expired access token is a 401 and
/// the client retries after the page-level middleware has rotated cookies.
pub async fn authenticated_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthUser, AnteroomError> {
    let token = access_token_from_headers(headers)
        .ok_or_else(|| AnteroomError::InvalidCredential("Unauthorized".to_string()))?;

    state.identity.user_from_token(&token).await.map_err(|e| {
        tracing::debug!(error = %e, "access token rejected");
        AnteroomError::InvalidCredential("Unauthorized".to_string())
    })
}

// ============================================================================
// Health
// ============================================================================

/// Inner health check — queries DB and returns (status_code, json_body).
pub async fn health_inner(pool: &PgPool) -> (StatusCode, serde_json::Value) {
    match anteroom_core::db::health_check(pool).await {
        Ok(pg_ver) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "postgresql": pg_ver,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.pool).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer at-123"));
        assert_eq!(bearer_token(&headers), Some("at-123".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_access_token_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("ar_access_token=cookie-token"),
        );
        assert_eq!(
            access_token_from_headers(&headers),
            Some("cookie-token".to_string())
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        assert_eq!(
            access_token_from_headers(&headers),
            Some("header-token".to_string()),
            "bearer header wins over the cookie"
        );
    }

    #[test]
    fn test_error_response_statuses() {
        let (status, _) =
            error_response(&AnteroomError::Configuration("ACCESS_CODE unset".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) =
            error_response(&AnteroomError::InvalidCredential("Unauthorized".into()));
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = error_response(&AnteroomError::Forbidden("Forbidden".into()));
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = error_response(&AnteroomError::NotFound("Not found".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            error_response(&AnteroomError::Upstream("connection reset".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0["error"], "Internal server error");
    }
}
