//! Session operations: current-user lookup and sign-out.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;

use crate::cookies;
use crate::http::{access_token_from_headers, authenticated_user, error_response, AppState};

pub async fn me_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match authenticated_user(&state, &headers).await {
        Ok(user) => (
            StatusCode::OK,
            Json(serde_json::json!({ "user": user })),
        )
            .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn sign_out_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    // Best-effort revocation at the provider; the cookies are cleared either way.
    if let Some(access_token) = access_token_from_headers(&headers) {
        if let Err(e) = state.identity.sign_out(&access_token).await {
            tracing::debug!(error = %e, provider = state.identity.name(), "provider sign-out failed");
        }
    }

    let secure = !state.config.service.is_development();
    let mut response = Redirect::to("/login").into_response();
    cookies::append_set_cookie(
        &mut response,
        &cookies::clear_cookie(cookies::ACCESS_COOKIE_NAME, secure),
    );
    cookies::append_set_cookie(
        &mut response,
        &cookies::clear_cookie(cookies::REFRESH_COOKIE_NAME, secure),
    );

    response
}
