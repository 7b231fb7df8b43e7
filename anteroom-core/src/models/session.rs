use serde::{Deserialize, Serialize};

use super::AuthUser;

/// A provider-issued session: the token pair this service holds in
/// http-only cookies plus the user it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: AuthUser,
}
