//! PostgreSQL implementation of the persistence collaborator.

use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::error::ServiceError;
use super::store::Store;
use crate::models::role::{fold_role_rows, RolePermissionRow};
use crate::models::{Device, OAuthConnection, Role, User, WebauthnCredential};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn db_error(err: sqlx::Error) -> ServiceError {
    ServiceError::from(AppError::from(err))
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn roles_for(&self, user_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let rows = sqlx::query_as::<_, RolePermissionRow>(
            r#"
            SELECT r.id AS role_id, r.name AS role_name,
                   p.id AS permission_id, p.name AS permission_name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = $1
            ORDER BY r.id, p.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(fold_role_rows(rows))
    }

    async fn with_roles(&self, user: Option<User>) -> Result<Option<User>, ServiceError> {
        match user {
            Some(mut user) => {
                user.roles = self.roles_for(user.id).await?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Store for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    // ==================== User Operations ====================

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = LOWER($1)")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        self.with_roles(user).await
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        self.with_roles(user).await
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password, avatar, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.avatar)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let result =
            sqlx::query("UPDATE users SET password = $2, updated_at = NOW() WHERE id = $1")
                .bind(user_id)
                .bind(password_hash)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    // ==================== OAuth Connections ====================

    async fn find_user_by_oauth(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            JOIN oauth2_connections c ON c.user_id = u.id
            WHERE c.provider = $1 AND c.provider_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        self.with_roles(user).await
    }

    async fn link_oauth(&self, connection: &OAuthConnection) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO oauth2_connections (id, user_id, provider, provider_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (provider, provider_id) DO NOTHING
            "#,
        )
        .bind(connection.id)
        .bind(connection.user_id)
        .bind(&connection.provider)
        .bind(&connection.provider_id)
        .bind(connection.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    // ==================== Device Operations ====================

    async fn upsert_device(&self, device: &Device) -> Result<Device, ServiceError> {
        sqlx::query_as::<_, Device>(
            r#"
            INSERT INTO devices (id, user_id, name, device_type, os, browser, user_agent, ip, last_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET last_active = NOW()
            RETURNING *
            "#,
        )
        .bind(&device.id)
        .bind(device.user_id)
        .bind(&device.name)
        .bind(&device.device_type)
        .bind(&device.os)
        .bind(&device.browser)
        .bind(&device.user_agent)
        .bind(&device.ip)
        .bind(device.last_active)
        .bind(device.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, ServiceError> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn list_devices(&self, user_id: Uuid) -> Result<Vec<Device>, ServiceError> {
        sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE user_id = $1 ORDER BY last_active DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn rename_device(
        &self,
        device_id: &str,
        name: &str,
    ) -> Result<Option<Device>, ServiceError> {
        sqlx::query_as::<_, Device>("UPDATE devices SET name = $2 WHERE id = $1 RETURNING *")
            .bind(device_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn delete_device(&self, device_id: &str) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== WebAuthn Credentials ====================

    async fn list_credentials(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WebauthnCredential>, ServiceError> {
        sqlx::query_as::<_, WebauthnCredential>(
            "SELECT * FROM webauthn_credentials WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn insert_credential(
        &self,
        credential: &WebauthnCredential,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO webauthn_credentials (id, user_id, passkey, created_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&credential.id)
        .bind(credential.user_id)
        .bind(&credential.passkey)
        .bind(credential.created_at)
        .bind(credential.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_credential(
        &self,
        credential_id: &str,
        passkey: &str,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE webauthn_credentials SET passkey = $2, last_used_at = NOW() WHERE id = $1",
        )
        .bind(credential_id)
        .bind(passkey)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    // ==================== Revocation ====================

    async fn revocation_marker(&self, user_id: Uuid) -> Result<i64, ServiceError> {
        let marker: Option<i64> =
            sqlx::query_scalar("SELECT marker FROM revocation_markers WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(marker.unwrap_or(0))
    }

    async fn advance_revocation_marker(&self, user_id: Uuid) -> Result<i64, ServiceError> {
        sqlx::query_scalar(
            r#"
            INSERT INTO revocation_markers (user_id, marker, updated_at)
            VALUES ($1, 1, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET marker = revocation_markers.marker + 1, updated_at = NOW()
            RETURNING marker
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }
}
