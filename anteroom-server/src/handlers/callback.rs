//! OAuth handoff guard — the identity provider's redirect callback
//!
//! A single-request state machine: the authorization code and the validation
//! token cookie must both be present before the code is exchanged for a
//! session. The validation token is consumed (cookie cleared) only on a
//! successful exchange; a failed exchange leaves it intact so the user can
//! retry within the token's remaining TTL.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::cookies;
use crate::http::AppState;

/// Generic terminal redirect: carries no token-related detail.
pub const AUTH_ERROR_REDIRECT: &str = "/auth/auth-code-error";
pub const UNAUTHORIZED_REDIRECT: &str = "/login?error=unauthorized";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
}

/// Restrict the post-login destination to a relative, same-origin path.
/// Anything absolute, protocol-relative, or otherwise odd collapses to `/`.
pub fn sanitize_next(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "/".to_string();
    };

    let candidate = raw.trim();
    let acceptable = candidate.starts_with('/')
        && !candidate.starts_with("//")
        && !candidate.contains('\\')
        && !candidate.chars().any(|c| c.is_control());

    if acceptable {
        candidate.to_string()
    } else {
        "/".to_string()
    }
}

/// Where to send the browser after a successful exchange. Local development
/// stays same-origin; deployed instances behind a reverse proxy redirect to
/// the forwarded host over https.
pub fn redirect_target(is_development: bool, forwarded_host: Option<&str>, next: &str) -> String {
    if is_development {
        return next.to_string();
    }

    match forwarded_host.map(str::trim).filter(|host| !host.is_empty()) {
        Some(host) => format!("https://{host}{next}"),
        None => next.to_string(),
    }
}

pub async fn auth_callback_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let next = sanitize_next(query.next.as_deref());

    let code = query
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty());
    let Some(code) = code else {
        return Redirect::to(AUTH_ERROR_REDIRECT).into_response();
    };

    // No validation token means the access gate was never passed (or the
    // token expired): the provider code alone does not get a session.
    if cookies::extract_cookie_value(&headers, cookies::VALIDATION_COOKIE_NAME).is_none() {
        return Redirect::to(UNAUTHORIZED_REDIRECT).into_response();
    }

    let session = match state.identity.exchange_code(code).await {
        Ok(session) => session,
        Err(e) => {
            // Validation token deliberately left in place for a retry.
            tracing::warn!(error = %e, provider = state.identity.name(), "authorization code exchange failed");
            return Redirect::to(AUTH_ERROR_REDIRECT).into_response();
        }
    };

    let target = redirect_target(
        state.config.service.is_development(),
        headers
            .get("x-forwarded-host")
            .and_then(|value| value.to_str().ok()),
        &next,
    );

    let secure = !state.config.service.is_development();
    let mut response = Redirect::to(&target).into_response();
    cookies::append_set_cookie(
        &mut response,
        &cookies::access_cookie(
            &session.access_token,
            state.config.auth.access_ttl_seconds,
            secure,
        ),
    );
    cookies::append_set_cookie(
        &mut response,
        &cookies::refresh_cookie(
            &session.refresh_token,
            state.config.auth.refresh_ttl_seconds,
            secure,
        ),
    );
    // Single use: the token is consumed by this successful exchange.
    cookies::append_set_cookie(
        &mut response,
        &cookies::clear_cookie(cookies::VALIDATION_COOKIE_NAME, secure),
    );

    response
}
