use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// A single transcript entry. Immutable once written; ordered by
/// `created_at` within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

pub fn is_valid_role(role: &str) -> bool {
    role == ROLE_USER || role == ROLE_ASSISTANT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_validation() {
        assert!(is_valid_role("user"));
        assert!(is_valid_role("assistant"));
        assert!(!is_valid_role("system"));
        assert!(!is_valid_role(""));
        assert!(!is_valid_role("User"));
    }
}
