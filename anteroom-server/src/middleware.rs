//! Session middleware — refreshes the user's session before page renders
//!
//! Applied to page routes only; API routes authenticate from headers and the
//! OAuth callback manages its own cookies. A failed refresh degrades to
//! "signed out" (page handlers redirect to the login page) — it never turns
//! into a server error here.

use std::sync::Arc;

use anteroom_core::models::{AuthUser, ProviderSession};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::cookies;
use crate::http::AppState;

/// The signed-in user (if any) as resolved by the middleware, for page
/// handlers to pick up from request extensions.
#[derive(Clone)]
pub struct CurrentUser(pub Option<AuthUser>);

pub async fn refresh_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers().clone();

    let mut user: Option<AuthUser> = None;
    let mut rotated: Option<ProviderSession> = None;

    if let Some(access_token) = cookies::extract_cookie_value(&headers, cookies::ACCESS_COOKIE_NAME)
    {
        match state.identity.user_from_token(&access_token).await {
            Ok(resolved) => user = Some(resolved),
            Err(e) => tracing::debug!(error = %e, "access token stale; trying refresh"),
        }
    }

    if user.is_none() {
        if let Some(refresh_token) =
            cookies::extract_cookie_value(&headers, cookies::REFRESH_COOKIE_NAME)
        {
            match state.identity.refresh_session(&refresh_token).await {
                Ok(session) => {
                    user = Some(session.user.clone());
                    rotated = Some(session);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "session refresh failed; treating as signed out")
                }
            }
        }
    }

    request.extensions_mut().insert(CurrentUser(user));
    let mut response = next.run(request).await;

    // A rotated session must reach the browser or the next request starts over.
    if let Some(session) = rotated {
        let secure = !state.config.service.is_development();
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
    }

    response
}
