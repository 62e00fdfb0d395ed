//! Caller model - the identity the auth gate attaches to a request.

use uuid::Uuid;

use super::Role;

/// Authenticated caller, built from a verified access token.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub uid: Uuid,
    pub roles: Vec<Role>,
}

impl Caller {
    pub fn new(uid: Uuid, roles: Vec<Role>) -> Self {
        Self { uid, roles }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }
}
