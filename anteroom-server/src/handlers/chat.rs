//! Chat streaming gateway — forwards turns to the completion backend and
//! re-emits the reply as SSE events
//!
//! With a `conversationId` the caller must own the conversation, and the
//! final user turn plus the assembled reply are persisted once the upstream
//! stream completes. A client disconnect drops the response stream, which
//! abandons the upstream request and skips persistence. Nothing is retried.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anteroom_core::models::message::{ROLE_ASSISTANT, ROLE_USER};
use anteroom_core::{AnteroomError, ChatTurn, TokenStream};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, StreamExt};
use sqlx::PgPool;
use uuid::Uuid;

use crate::http::{authenticated_user, error_response, AppState};
use crate::store;

#[derive(Debug, serde::Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<Uuid>,
}

struct PersistJob {
    pool: PgPool,
    conversation_id: Uuid,
    user_message: Option<ChatTurn>,
}

async fn persist_exchange(job: &PersistJob, reply: &str) -> Result<(), AnteroomError> {
    if let Some(user_message) = &job.user_message {
        store::append_message(
            &job.pool,
            job.conversation_id,
            &user_message.role,
            &user_message.content,
        )
        .await?;
    }

    if !reply.is_empty() {
        store::append_message(&job.pool, job.conversation_id, ROLE_ASSISTANT, reply).await?;
    }

    Ok(())
}

enum Stage {
    Streaming,
    Done,
}

struct Forward {
    upstream: TokenStream,
    assembled: String,
    persist: Option<PersistJob>,
    stage: Stage,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    if request.messages.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "messages must not be empty" })),
        )
            .into_response();
    }

    // Persistence needs an owner; anonymous chats stream without a transcript.
    let persist = match request.conversation_id {
        Some(conversation_id) => {
            let user = match authenticated_user(&state, &headers).await {
                Ok(user) => user,
                Err(e) => return error_response(&e).into_response(),
            };

            if let Err(e) =
                store::conversation_for_owner(&state.pool, conversation_id, user.id).await
            {
                return error_response(&e).into_response();
            }

            let user_message = request
                .messages
                .iter()
                .rev()
                .find(|turn| turn.role == ROLE_USER)
                .cloned();

            Some(PersistJob {
                pool: state.pool.clone(),
                conversation_id,
                user_message,
            })
        }
        None => None,
    };

    let upstream = match state.completions.stream_chat(&request.messages).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::error!(error = %e, backend = state.completions.name(), "failed to start completion");
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "Completion service unavailable" })),
            )
                .into_response();
        }
    };

    let forward = Forward {
        upstream,
        assembled: String::new(),
        persist,
        stage: Stage::Streaming,
    };

    let events = stream::unfold(forward, |mut forward| async move {
        match forward.stage {
            Stage::Done => None,
            Stage::Streaming => match forward.upstream.next().await {
                Some(Ok(delta)) => {
                    forward.assembled.push_str(&delta);
                    let event = Event::default()
                        .event("token")
                        .data(serde_json::json!({ "text": delta }).to_string());
                    Some((Ok::<_, Infallible>(event), forward))
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "completion stream failed mid-flight");
                    // Partial replies are not persisted.
                    forward.persist = None;
                    forward.stage = Stage::Done;
                    let event = Event::default().event("error").data(
                        serde_json::json!({ "error": "Completion service failed" }).to_string(),
                    );
                    Some((Ok(event), forward))
                }
                None => {
                    forward.stage = Stage::Done;
                    if let Some(job) = forward.persist.take() {
                        if let Err(e) = persist_exchange(&job, &forward.assembled).await {
                            tracing::error!(
                                error = %e,
                                conversation_id = %job.conversation_id,
                                "failed to persist chat exchange"
                            );
                        }
                    }
                    Some((Ok(Event::default().event("done").data("")), forward))
                }
            },
        }
    });

    Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}
