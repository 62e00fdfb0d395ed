//! OAuth2 connection model - links an external subject to a local user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OAuthConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_id: String,
    pub created_at: DateTime<Utc>,
}

impl OAuthConnection {
    pub fn new(user_id: Uuid, provider: &str, provider_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider: provider.to_string(),
            provider_id: provider_id.to_string(),
            created_at: Utc::now(),
        }
    }
}
