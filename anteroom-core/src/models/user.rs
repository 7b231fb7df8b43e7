use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The user identity as reported by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}
