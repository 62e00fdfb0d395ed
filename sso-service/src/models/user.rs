//! User model - accounts that can authenticate against the authority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Role;

/// User entity. `password` holds the Argon2 verifier, never the secret.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub roles: Vec<Role>,
}

impl User {
    /// Create a new user. The email is case-folded on the way in.
    pub fn new(name: String, email: &str, password_hash: String, avatar: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email: normalize_email(email),
            password: password_hash,
            avatar,
            created_at: now,
            updated_at: now,
            roles: Vec::new(),
        }
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }

    /// Convert to sanitized response (no verifier).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User response for API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            avatar: u.avatar,
            roles: u.roles.into_iter().map(|r| r.name).collect(),
            created_at: u.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_lowercases_email() {
        let user = User::new("A".to_string(), "  Alice@Example.COM ", "hash".to_string(), None);
        assert_eq!(user.email, "alice@example.com");
        assert!(user.roles.is_empty());
    }

    #[test]
    fn test_sanitized_drops_verifier() {
        let user = User::new("A".to_string(), "a@b.c", "secret-hash".to_string(), None);
        let json = serde_json::to_string(&user.sanitized()).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
