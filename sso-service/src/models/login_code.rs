//! Login code model - one-time email codes as held in the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a code unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    Login,
    Recover,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::Login => "login",
            CodePurpose::Recover => "recover",
        }
    }
}

/// Cached code entry. Only the digest of the code is kept.
///
/// The entry is written once by `generate` and never rewritten. Failed
/// attempts are counted under a separate key named after `generation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCode {
    pub generation: String,
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

impl StoredCode {
    pub fn new(generation: String, digest: String) -> Self {
        Self {
            generation,
            digest,
            created_at: Utc::now(),
        }
    }

    pub fn expires_at(&self, ttl_seconds: i64) -> DateTime<Utc> {
        self.created_at + chrono::Duration::seconds(ttl_seconds)
    }

    pub fn is_expired(&self, ttl_seconds: i64) -> bool {
        Utc::now() >= self.expires_at(ttl_seconds)
    }
}
