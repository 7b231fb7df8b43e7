//! Identity provider client — OAuth code exchange and session management
//!
//! Provides an `IdentityProvider` trait with implementations for:
//! - **http** — a real provider speaking a token/user/logout REST surface
//! - **mock** — in-process provider for local development and tests
//!
//! The service never inspects provider tokens; they are opaque bearer
//! credentials stored in http-only cookies and handed back on every call.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{AuthUser, ProviderSession};

const MOCK_ACCESS_PREFIX: &str = "mock_access_";
const MOCK_REFRESH_PREFIX: &str = "mock_refresh_";

// ============================================================================
// IdentityProvider trait
// ============================================================================

/// Abstraction over the external auth subsystem.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a provider-issued authorization code for a session.
    async fn exchange_code(&self, code: &str) -> Result<ProviderSession, IdentityError>;

    /// Rotate an expired session using its refresh token.
    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, IdentityError>;

    /// Resolve the user behind an access token.
    async fn user_from_token(&self, access_token: &str) -> Result<AuthUser, IdentityError>;

    /// Revoke the session behind an access token.
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider error ({code}): {message}")]
    Provider { code: u16, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Missing provider client key")]
    MissingClientKey,
}

// ============================================================================
// Provider API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct TokenRequest {
    grant_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorResponse {
    error: Option<ProviderErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// HttpIdentityProvider
// ============================================================================

/// Client for a real identity provider exposing `/token`, `/user` and
/// `/logout` endpoints, authenticated with an `apikey` header.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: Client,
    client_key: String,
    base_url: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &AuthConfig) -> Result<Self, IdentityError> {
        Self::with_base_url(config, config.base_url.clone())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: &AuthConfig, base_url: String) -> Result<Self, IdentityError> {
        if config.client_key.is_empty() {
            return Err(IdentityError::MissingClientKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            client_key: config.client_key.clone(),
            base_url,
        })
    }

    async fn token_request(&self, body: &TokenRequest) -> Result<ProviderSession, IdentityError> {
        let url = format!("{}/token", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.client_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_provider_error(status.as_u16(), error_body, body.grant_type));
        }

        Ok(response.json().await?)
    }
}

fn map_provider_error(status: u16, error_body: String, context: &str) -> IdentityError {
    let detail = serde_json::from_str::<ProviderErrorResponse>(&error_body)
        .ok()
        .and_then(|e| e.error);

    let (code, message) = detail
        .map(|e| (e.code, e.message))
        .unwrap_or((status, error_body));

    tracing::warn!(code = code, context = context, "identity provider rejected request");

    if status == 400 || status == 401 {
        IdentityError::Unauthorized(message)
    } else {
        IdentityError::Provider { code, message }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(&self, code: &str) -> Result<ProviderSession, IdentityError> {
        self.token_request(&TokenRequest {
            grant_type: "authorization_code",
            code: Some(code.to_string()),
            refresh_token: None,
        })
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, IdentityError> {
        self.token_request(&TokenRequest {
            grant_type: "refresh_token",
            code: None,
            refresh_token: Some(refresh_token.to_string()),
        })
        .await
    }

    async fn user_from_token(&self, access_token: &str) -> Result<AuthUser, IdentityError> {
        let url = format!("{}/user", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.client_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_provider_error(status.as_u16(), error_body, "user"));
        }

        Ok(response.json().await?)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let url = format!("{}/logout", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.client_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_provider_error(status.as_u16(), error_body, "logout"));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// MockIdentityProvider
// ============================================================================

/// In-process provider: accepts a single configured authorization code and
/// issues recognizable token pairs. No network, no persistence.
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    code: String,
    user: AuthUser,
}

impl MockIdentityProvider {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            user: AuthUser {
                id: Uuid::new_v4(),
                email: "dev@anteroom.local".to_string(),
            },
        }
    }

    /// The fixed user every mock session resolves to.
    pub fn user(&self) -> AuthUser {
        self.user.clone()
    }

    fn issue_session(&self) -> ProviderSession {
        ProviderSession {
            access_token: format!("{}{}", MOCK_ACCESS_PREFIX, Uuid::new_v4().simple()),
            refresh_token: format!("{}{}", MOCK_REFRESH_PREFIX, Uuid::new_v4().simple()),
            expires_in: 3600,
            user: self.user.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn exchange_code(&self, code: &str) -> Result<ProviderSession, IdentityError> {
        if code == self.code {
            Ok(self.issue_session())
        } else {
            Err(IdentityError::Unauthorized(
                "invalid authorization code".to_string(),
            ))
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, IdentityError> {
        if refresh_token.starts_with(MOCK_REFRESH_PREFIX) {
            Ok(self.issue_session())
        } else {
            Err(IdentityError::Unauthorized(
                "invalid refresh token".to_string(),
            ))
        }
    }

    async fn user_from_token(&self, access_token: &str) -> Result<AuthUser, IdentityError> {
        if access_token.starts_with(MOCK_ACCESS_PREFIX) {
            Ok(self.user.clone())
        } else {
            Err(IdentityError::Unauthorized(
                "invalid access token".to_string(),
            ))
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), IdentityError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create the appropriate provider from configuration.
///
/// Reads `[auth] mode` to select the mock or HTTP provider.
pub fn create_provider(config: &AuthConfig) -> Result<Box<dyn IdentityProvider>, IdentityError> {
    match config.mode.as_str() {
        "mock" => Ok(Box::new(MockIdentityProvider::new(config.mock_code.clone()))),
        _ => {
            // Default: "http"
            Ok(Box::new(HttpIdentityProvider::new(config)?))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(client_key: &str) -> AuthConfig {
        AuthConfig {
            mode: "http".to_string(),
            base_url: "http://provider.invalid".to_string(),
            client_key: client_key.to_string(),
            mock_code: "dev-code".to_string(),
            access_ttl_seconds: 3600,
            refresh_ttl_seconds: 604_800,
        }
    }

    fn mock_session_response(user_id: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": "at-123",
            "refresh_token": "rt-456",
            "expires_in": 3600,
            "user": { "id": user_id, "email": "someone@example.com" }
        })
    }

    #[tokio::test]
    async fn test_exchange_code_returns_session() {
        let mock_server = MockServer::start().await;
        let provider =
            HttpIdentityProvider::with_base_url(&test_config("test-key"), mock_server.uri())
                .expect("Failed to create provider");

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("apikey", "test-key"))
            .and(body_json(serde_json::json!({
                "grant_type": "authorization_code",
                "code": "provider-code"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_session_response(
                "3fa57a67-4a1f-49c1-8f5e-111111111111",
            )))
            .mount(&mock_server)
            .await;

        let session = provider.exchange_code("provider-code").await.unwrap();
        assert_eq!(session.access_token, "at-123");
        assert_eq!(session.refresh_token, "rt-456");
        assert_eq!(session.user.email, "someone@example.com");
    }

    #[tokio::test]
    async fn test_exchange_code_maps_401_to_unauthorized() {
        let mock_server = MockServer::start().await;
        let provider =
            HttpIdentityProvider::with_base_url(&test_config("test-key"), mock_server.uri())
                .expect("Failed to create provider");

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "code": 401, "message": "code expired" }
            })))
            .mount(&mock_server)
            .await;

        let result = provider.exchange_code("stale-code").await;
        match result {
            Err(IdentityError::Unauthorized(message)) => {
                assert_eq!(message, "code expired");
            }
            other => panic!("Expected Unauthorized, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_refresh_session_rotates_tokens() {
        let mock_server = MockServer::start().await;
        let provider =
            HttpIdentityProvider::with_base_url(&test_config("test-key"), mock_server.uri())
                .expect("Failed to create provider");

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_json(serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": "rt-old"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_session_response(
                "3fa57a67-4a1f-49c1-8f5e-111111111111",
            )))
            .mount(&mock_server)
            .await;

        let session = provider.refresh_session("rt-old").await.unwrap();
        assert_eq!(session.refresh_token, "rt-456");
    }

    #[tokio::test]
    async fn test_user_from_token_sends_bearer() {
        let mock_server = MockServer::start().await;
        let provider =
            HttpIdentityProvider::with_base_url(&test_config("test-key"), mock_server.uri())
                .expect("Failed to create provider");

        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer at-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "3fa57a67-4a1f-49c1-8f5e-111111111111",
                "email": "someone@example.com"
            })))
            .mount(&mock_server)
            .await;

        let user = provider.user_from_token("at-123").await.unwrap();
        assert_eq!(user.email, "someone@example.com");
    }

    #[tokio::test]
    async fn test_user_from_token_rejects_expired() {
        let mock_server = MockServer::start().await;
        let provider =
            HttpIdentityProvider::with_base_url(&test_config("test-key"), mock_server.uri())
                .expect("Failed to create provider");

        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "code": 401, "message": "token expired" }
            })))
            .mount(&mock_server)
            .await;

        let result = provider.user_from_token("at-stale").await;
        assert!(matches!(result, Err(IdentityError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_provider_5xx_is_not_unauthorized() {
        let mock_server = MockServer::start().await;
        let provider =
            HttpIdentityProvider::with_base_url(&test_config("test-key"), mock_server.uri())
                .expect("Failed to create provider");

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": { "code": 503, "message": "maintenance" }
            })))
            .mount(&mock_server)
            .await;

        let result = provider.exchange_code("provider-code").await;
        match result {
            Err(IdentityError::Provider { code, .. }) => assert_eq!(code, 503),
            other => panic!("Expected Provider error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_missing_client_key_is_rejected() {
        let result = HttpIdentityProvider::new(&test_config(""));
        assert!(matches!(result, Err(IdentityError::MissingClientKey)));
    }

    // --- MockIdentityProvider ---

    #[tokio::test]
    async fn test_mock_provider_roundtrip() {
        let provider = MockIdentityProvider::new("dev-code");

        let session = provider.exchange_code("dev-code").await.unwrap();
        assert!(session.access_token.starts_with(MOCK_ACCESS_PREFIX));

        let user = provider.user_from_token(&session.access_token).await.unwrap();
        assert_eq!(user.id, provider.user().id);

        let rotated = provider.refresh_session(&session.refresh_token).await.unwrap();
        assert_ne!(rotated.access_token, session.access_token);
    }

    #[tokio::test]
    async fn test_mock_provider_rejects_wrong_code_and_token() {
        let provider = MockIdentityProvider::new("dev-code");

        assert!(provider.exchange_code("other").await.is_err());
        assert!(provider.user_from_token("garbage").await.is_err());
        assert!(provider.refresh_session("garbage").await.is_err());
    }

    #[test]
    fn test_create_provider_selects_mode() {
        let mut config = test_config("key");
        config.mode = "mock".to_string();
        assert_eq!(create_provider(&config).unwrap().name(), "mock");

        config.mode = "http".to_string();
        assert_eq!(create_provider(&config).unwrap().name(), "http");
    }
}
