//! Role and permission models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Name of the role that bypasses ownership checks.
pub const ADMIN_ROLE: &str = "admin";

/// Role entity with its ordered permission set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema, PartialEq)]
pub struct Role {
    pub id: i64,
    pub name: String,
    #[sqlx(skip)]
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            permissions: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.name == ADMIN_ROLE
    }
}

/// Permission entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema, PartialEq)]
pub struct Permission {
    pub id: i64,
    pub name: String,
}

impl Permission {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Row shape for the joined role/permission query.
#[derive(Debug, Clone, FromRow)]
pub struct RolePermissionRow {
    pub role_id: i64,
    pub role_name: String,
    pub permission_id: Option<i64>,
    pub permission_name: Option<String>,
}

/// Fold joined rows into roles, preserving the query order.
pub fn fold_role_rows(rows: Vec<RolePermissionRow>) -> Vec<Role> {
    let mut roles: Vec<Role> = Vec::new();
    for row in rows {
        let idx = match roles.iter().position(|r| r.id == row.role_id) {
            Some(idx) => idx,
            None => {
                roles.push(Role::new(row.role_id, row.role_name));
                roles.len() - 1
            }
        };
        if let (Some(id), Some(name)) = (row.permission_id, row.permission_name) {
            roles[idx].permissions.push(Permission::new(id, name));
        }
    }
    roles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role_id: i64, role: &str, perm: Option<(i64, &str)>) -> RolePermissionRow {
        RolePermissionRow {
            role_id,
            role_name: role.to_string(),
            permission_id: perm.map(|p| p.0),
            permission_name: perm.map(|p| p.1.to_string()),
        }
    }

    #[test]
    fn test_fold_role_rows_groups_permissions() {
        let roles = fold_role_rows(vec![
            row(1, "admin", Some((10, "users.write"))),
            row(1, "admin", Some((11, "users.read"))),
            row(2, "viewer", None),
        ]);

        assert_eq!(roles.len(), 2);
        assert!(roles[0].is_admin());
        assert_eq!(roles[0].permissions.len(), 2);
        assert_eq!(roles[0].permissions[1].name, "users.read");
        assert!(roles[1].permissions.is_empty());
    }
}
