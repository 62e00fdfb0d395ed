//! WebAuthn credential model - a registered passkey, stored as serialized JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebauthnCredential {
    /// Base64url credential id as reported by the authenticator.
    pub id: String,
    pub user_id: Uuid,
    pub passkey: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl WebauthnCredential {
    pub fn new(id: String, user_id: Uuid, passkey: String) -> Self {
        Self {
            id,
            user_id,
            passkey,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}
