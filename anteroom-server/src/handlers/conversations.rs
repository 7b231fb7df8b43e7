//! Conversation and message CRUD, scoped to the authenticated caller.
//!
//! Every conversation-addressed route goes through the store's ownership
//! guard before touching data.

use std::sync::Arc;

use anteroom_core::models::message::is_valid_role;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::http::{authenticated_user, error_response, AppState};
use crate::store;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

pub async fn list_conversations_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let user = match authenticated_user(&state, &headers).await {
        Ok(user) => user,
        Err(e) => return error_response(&e).into_response(),
    };

    match store::list_conversations(&state.pool, user.id).await {
        Ok(conversations) => (
            StatusCode::OK,
            Json(serde_json::json!({ "conversations": conversations })),
        )
            .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn create_conversation_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateConversationRequest>,
) -> Response {
    let user = match authenticated_user(&state, &headers).await {
        Ok(user) => user,
        Err(e) => return error_response(&e).into_response(),
    };

    match store::create_conversation(&state.pool, user.id, request.title).await {
        Ok(conversation) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "conversation": conversation })),
        )
            .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn delete_conversation_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Response {
    let user = match authenticated_user(&state, &headers).await {
        Ok(user) => user,
        Err(e) => return error_response(&e).into_response(),
    };

    if let Err(e) = store::conversation_for_owner(&state.pool, conversation_id, user.id).await {
        return error_response(&e).into_response();
    }

    match store::delete_conversation(&state.pool, conversation_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "deleted": true })),
        )
            .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Response {
    let user = match authenticated_user(&state, &headers).await {
        Ok(user) => user,
        Err(e) => return error_response(&e).into_response(),
    };

    if let Err(e) = store::conversation_for_owner(&state.pool, conversation_id, user.id).await {
        return error_response(&e).into_response();
    }

    match store::list_messages(&state.pool, conversation_id).await {
        Ok(messages) => (
            StatusCode::OK,
            Json(serde_json::json!({ "messages": messages })),
        )
            .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn append_message_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<AppendMessageRequest>,
) -> Response {
    let user = match authenticated_user(&state, &headers).await {
        Ok(user) => user,
        Err(e) => return error_response(&e).into_response(),
    };

    if !is_valid_role(&request.role) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "role must be 'user' or 'assistant'"
            })),
        )
            .into_response();
    }

    if let Err(e) = store::conversation_for_owner(&state.pool, conversation_id, user.id).await {
        return error_response(&e).into_response();
    }

    match store::append_message(&state.pool, conversation_id, &request.role, &request.content)
        .await
    {
        Ok(message) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": message })),
        )
            .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}
