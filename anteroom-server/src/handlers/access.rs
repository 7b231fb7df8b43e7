//! Access gate — validates the shared access code and issues the
//! validation token cookie that the OAuth callback later requires.
//!
//! Deliberately minimal: exact match against the configured secret, no rate
//! limiting, no lockout, no audit trail.

use std::sync::Arc;

use anteroom_core::AnteroomError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::cookies;
use crate::http::{error_response, AppState};

#[derive(Debug, Deserialize)]
pub struct ValidateAccessRequest {
    #[serde(rename = "accessCode", default)]
    pub access_code: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Unconfigured,
    Denied,
    Granted,
}

/// Inner gate check — pure, no IO. A mismatch carries no detail about why.
pub fn validate_access_inner(configured: &str, submitted: &str) -> AccessDecision {
    if configured.is_empty() {
        return AccessDecision::Unconfigured;
    }

    if submitted == configured {
        AccessDecision::Granted
    } else {
        AccessDecision::Denied
    }
}

pub async fn validate_access_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidateAccessRequest>,
) -> Response {
    match validate_access_inner(&state.config.access.code, &request.access_code) {
        AccessDecision::Unconfigured => {
            tracing::error!("access code not configured; rejecting validation attempt");
            error_response(&AnteroomError::Configuration("ACCESS_CODE unset".to_string()))
                .into_response()
        }
        AccessDecision::Denied => {
            error_response(&AnteroomError::InvalidCredential(
                "Invalid access code".to_string(),
            ))
            .into_response()
        }
        AccessDecision::Granted => {
            let token = Uuid::new_v4().to_string();
            let secure = !state.config.service.is_development();
            let cookie = cookies::validation_cookie(
                &token,
                state.config.access.token_ttl_seconds,
                secure,
            );

            let mut response = (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "message": "Access code validated",
                })),
            )
                .into_response();
            cookies::append_set_cookie(&mut response, &cookie);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_requires_configured_secret() {
        assert_eq!(validate_access_inner("", "anything"), AccessDecision::Unconfigured);
        assert_eq!(validate_access_inner("", ""), AccessDecision::Unconfigured);
    }

    #[test]
    fn test_gate_exact_match_only() {
        assert_eq!(validate_access_inner("s3cret", "s3cret"), AccessDecision::Granted);
        assert_eq!(validate_access_inner("s3cret", "S3CRET"), AccessDecision::Denied);
        assert_eq!(validate_access_inner("s3cret", "s3cret "), AccessDecision::Denied);
        assert_eq!(validate_access_inner("s3cret", ""), AccessDecision::Denied);
    }
}
