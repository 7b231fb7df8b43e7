//! Completion streaming — forwards chat turns to a language model and
//! yields the reply incrementally
//!
//! Provides a `CompletionBackend` trait with implementations for:
//! - **gemini** — the Gemini `streamGenerateContent` API (`alt=sse`)
//! - **echo** — deterministic local backend for development and tests
//!
//! Backends return a stream of text deltas; callers decide how to frame
//! them (the HTTP server re-emits them as SSE events). Dropping the stream
//! abandons the upstream request, which is how client disconnects stop the
//! forwarding.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CompletionConfig;
use crate::models::message::ROLE_USER;

/// A stream of reply fragments in generation order.
pub type TokenStream = BoxStream<'static, Result<String, CompletionError>>;

// ============================================================================
// CompletionBackend trait
// ============================================================================

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Start a completion for the ordered prior turns. Errors returned here
    /// happen before the first token; later failures surface through the
    /// stream itself.
    async fn stream_chat(&self, turns: &[ChatTurn]) -> Result<TokenStream, CompletionError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// One chat turn as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Unknown completion backend: {0}")]
    UnknownBackend(String),
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    parts: Option<Vec<PartResponse>>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiCompletionClient
// ============================================================================

/// Streams completions from the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiCompletionClient {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiCompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        Self::with_base_url(
            config,
            "https://generativelanguage.googleapis.com/v1beta".to_string(),
        )
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        config: &CompletionConfig,
        base_url: String,
    ) -> Result<Self, CompletionError> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url,
        })
    }
}

/// Gemini's role vocabulary is user/model; everything non-assistant is
/// forwarded as user input.
fn gemini_role(role: &str) -> String {
    if role == "assistant" {
        "model".to_string()
    } else {
        "user".to_string()
    }
}

fn delta_from_sse_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparseable completion chunk");
            return None;
        }
    };

    let text: String = chunk
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts.unwrap_or_default())
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Incremental scanner over the upstream byte stream: reassembles SSE
/// lines across chunk boundaries and queues extracted deltas.
struct SseScan {
    inner: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: String,
    pending: VecDeque<String>,
    done: bool,
}

fn scan_sse_stream(inner: BoxStream<'static, reqwest::Result<bytes::Bytes>>) -> TokenStream {
    let scan = SseScan {
        inner,
        buffer: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(scan, |mut scan| async move {
        loop {
            if let Some(text) = scan.pending.pop_front() {
                return Some((Ok(text), scan));
            }
            if scan.done {
                return None;
            }

            match scan.inner.next().await {
                Some(Ok(chunk)) => {
                    scan.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(newline) = scan.buffer.find('\n') {
                        let line: String = scan.buffer.drain(..=newline).collect();
                        if let Some(text) = delta_from_sse_line(line.trim_end()) {
                            scan.pending.push_back(text);
                        }
                    }
                }
                Some(Err(e)) => {
                    scan.done = true;
                    return Some((Err(CompletionError::Http(e)), scan));
                }
                None => {
                    if !scan.buffer.is_empty() {
                        let line = std::mem::take(&mut scan.buffer);
                        if let Some(text) = delta_from_sse_line(line.trim_end()) {
                            scan.pending.push_back(text);
                        }
                    }
                    scan.done = true;
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl CompletionBackend for GeminiCompletionClient {
    async fn stream_chat(&self, turns: &[ChatTurn]) -> Result<TokenStream, CompletionError> {
        let request = GenerateContentRequest {
            contents: turns
                .iter()
                .map(|turn| Content {
                    role: gemini_role(&turn.role),
                    parts: vec![Part {
                        text: turn.content.clone(),
                    }],
                })
                .collect(),
        };

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini completion API error");

            return Err(CompletionError::Api { code, message });
        }

        Ok(scan_sse_stream(response.bytes_stream().boxed()))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// EchoCompletionBackend
// ============================================================================

/// Repeats the last user turn back as a word-by-word stream. Used for
/// local development without an API key, and in handler tests.
#[derive(Debug, Clone, Default)]
pub struct EchoCompletionBackend;

#[async_trait]
impl CompletionBackend for EchoCompletionBackend {
    async fn stream_chat(&self, turns: &[ChatTurn]) -> Result<TokenStream, CompletionError> {
        let reply = turns
            .iter()
            .rev()
            .find(|turn| turn.role == ROLE_USER)
            .map(|turn| turn.content.clone())
            .unwrap_or_default();

        let fragments: Vec<Result<String, CompletionError>> = reply
            .split_inclusive(' ')
            .map(|fragment| Ok(fragment.to_string()))
            .collect();

        Ok(stream::iter(fragments).boxed())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Create the appropriate backend from configuration.
///
/// Reads `[completion] backend` to select Gemini or the echo backend.
pub fn create_backend(
    config: &CompletionConfig,
) -> Result<Box<dyn CompletionBackend>, CompletionError> {
    match config.backend.as_str() {
        "echo" => Ok(Box::new(EchoCompletionBackend)),
        "gemini" => Ok(Box::new(GeminiCompletionClient::new(config)?)),
        other => Err(CompletionError::UnknownBackend(other.to_string())),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> CompletionConfig {
        CompletionConfig {
            backend: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn user_turn(content: &str) -> ChatTurn {
        ChatTurn {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    async fn collect_ok(stream: TokenStream) -> Vec<String> {
        stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|item| item.expect("stream item should be Ok"))
            .collect()
    }

    #[tokio::test]
    async fn test_stream_chat_yields_deltas_in_order() {
        let mock_server = MockServer::start().await;
        let client = GeminiCompletionClient::with_base_url(
            &test_config("test-api-key"),
            mock_server.uri(),
        )
        .expect("Failed to create client");

        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" there\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"!\"}]}}]}\r\n\r\n",
        );

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(query_param("key", "test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let stream = client.stream_chat(&[user_turn("hi")]).await.unwrap();
        let deltas = collect_ok(stream).await;
        assert_eq!(deltas, vec!["Hello", " there", "!"]);
    }

    #[tokio::test]
    async fn test_stream_chat_skips_empty_and_comment_lines() {
        let mock_server = MockServer::start().await;
        let client = GeminiCompletionClient::with_base_url(
            &test_config("test-api-key"),
            mock_server.uri(),
        )
        .expect("Failed to create client");

        let body = concat!(
            ": keepalive\r\n",
            "\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"only\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{}}]}\r\n\r\n",
        );

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let stream = client.stream_chat(&[user_turn("hi")]).await.unwrap();
        let deltas = collect_ok(stream).await;
        assert_eq!(deltas, vec!["only"]);
    }

    #[tokio::test]
    async fn test_stream_chat_surfaces_api_error() {
        let mock_server = MockServer::start().await;
        let client = GeminiCompletionClient::with_base_url(
            &test_config("test-api-key"),
            mock_server.uri(),
        )
        .expect("Failed to create client");

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "code": 429, "message": "Rate limit exceeded" }
            })))
            .mount(&mock_server)
            .await;

        let result = client.stream_chat(&[user_turn("hi")]).await;
        match result {
            Err(CompletionError::Api { code, message }) => {
                assert_eq!(code, 429);
                assert_eq!(message, "Rate limit exceeded");
            }
            other => panic!("Expected Api error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let result = GeminiCompletionClient::new(&test_config(""));
        assert!(matches!(result, Err(CompletionError::MissingApiKey)));
    }

    #[test]
    fn test_delta_parsing_ignores_garbage() {
        assert_eq!(delta_from_sse_line("data: not json"), None);
        assert_eq!(delta_from_sse_line("event: done"), None);
        assert_eq!(delta_from_sse_line("data:"), None);
        assert_eq!(
            delta_from_sse_line(
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]}}]}"
            ),
            Some("ok".to_string())
        );
    }

    #[test]
    fn test_gemini_role_mapping() {
        assert_eq!(gemini_role("assistant"), "model");
        assert_eq!(gemini_role("user"), "user");
        assert_eq!(gemini_role("anything-else"), "user");
    }

    // --- EchoCompletionBackend ---

    #[tokio::test]
    async fn test_echo_backend_repeats_last_user_turn() {
        let backend = EchoCompletionBackend;
        let turns = vec![
            user_turn("first question"),
            ChatTurn {
                role: "assistant".to_string(),
                content: "an answer".to_string(),
            },
            user_turn("hello echo"),
        ];

        let stream = backend.stream_chat(&turns).await.unwrap();
        let deltas = collect_ok(stream).await;
        assert_eq!(deltas.concat(), "hello echo");
        assert!(deltas.len() > 1, "echo should stream in fragments");
    }

    #[tokio::test]
    async fn test_echo_backend_empty_without_user_turn() {
        let backend = EchoCompletionBackend;
        let stream = backend.stream_chat(&[]).await.unwrap();
        let deltas = collect_ok(stream).await;
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_create_backend_selects_backend() {
        let mut config = test_config("key");
        config.backend = "echo".to_string();
        assert_eq!(create_backend(&config).unwrap().name(), "echo");

        config.backend = "gemini".to_string();
        assert_eq!(create_backend(&config).unwrap().name(), "gemini");

        config.backend = "llamafile".to_string();
        assert!(matches!(
            create_backend(&config),
            Err(CompletionError::UnknownBackend(_))
        ));
    }
}
