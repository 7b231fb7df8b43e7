//! Conversation store gateway — CRUD over conversations and messages
//!
//! Every read/write is scoped to the owning user one level up via
//! `conversation_for_owner`, the single ownership guard all handlers go
//! through. Messages are immutable once written; appending a message bumps
//! the conversation's `updated_at` in the same transaction.

use anteroom_core::models::{Conversation, Message};
use anteroom_core::AnteroomError;
use sqlx::PgPool;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, user_id, title, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, created_at";

pub async fn list_conversations(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<Conversation>, AnteroomError> {
    let rows = sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = $1 ORDER BY updated_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn create_conversation(
    pool: &PgPool,
    user_id: Uuid,
    title: Option<String>,
) -> Result<Conversation, AnteroomError> {
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "New Chat".to_string());

    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "INSERT INTO conversations (user_id, title) VALUES ($1, $2) RETURNING {CONVERSATION_COLUMNS}"
    ))
    .bind(user_id)
    .bind(&title)
    .fetch_one(pool)
    .await?;

    Ok(conversation)
}

/// The ownership guard: resolves a conversation for a specific caller.
/// Absent row → NotFound; present but owned by someone else → Forbidden,
/// with no data leaked either way.
pub async fn conversation_for_owner(
    pool: &PgPool,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Conversation, AnteroomError> {
    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
    ))
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;

    match conversation {
        None => Err(AnteroomError::NotFound("Not found".to_string())),
        Some(conversation) if conversation.user_id != user_id => {
            Err(AnteroomError::Forbidden("Forbidden".to_string()))
        }
        Some(conversation) => Ok(conversation),
    }
}

pub async fn delete_conversation(
    pool: &PgPool,
    conversation_id: Uuid,
) -> Result<(), AnteroomError> {
    sqlx::query("DELETE FROM conversations WHERE id = $1")
        .bind(conversation_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn list_messages(
    pool: &PgPool,
    conversation_id: Uuid,
) -> Result<Vec<Message>, AnteroomError> {
    let rows = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC"
    ))
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn append_message(
    pool: &PgPool,
    conversation_id: Uuid,
    role: &str,
    content: &str,
) -> Result<Message, AnteroomError> {
    let mut tx = pool.begin().await?;

    let message = sqlx::query_as::<_, Message>(&format!(
        "INSERT INTO messages (conversation_id, role, content) VALUES ($1, $2, $3) RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(conversation_id)
    .bind(role)
    .bind(content)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(message)
}
