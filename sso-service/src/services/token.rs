//! Token pairs: issue, parse, refresh and per-user revocation.

use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use super::jwt::{AccessTokenClaims, JwtService};
use super::store::Store;
use crate::models::{Device, DeviceFingerprint, User};

/// Access and refresh token minted together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn Store>,
    jwt: JwtService,
}

impl TokenService {
    pub fn new(store: Arc<dyn Store>, jwt: JwtService) -> Self {
        Self { store, jwt }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Mint a pair bound to `device`, embedding the user's current marker.
    pub async fn issue_pair(&self, user: &User, device: &Device) -> Result<TokenPair, ServiceError> {
        let marker = self.store.revocation_marker(user.id).await?;
        Ok(TokenPair {
            access: self.jwt.generate_access_token(user.id, &user.roles)?,
            refresh: self.jwt.generate_refresh_token(user.id, &device.id, marker)?,
        })
    }

    /// Upsert the caller's device, then mint a pair bound to it.
    #[tracing::instrument(skip_all, fields(user_id = %user.id))]
    pub async fn open_session(
        &self,
        user: &User,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, ServiceError> {
        let device = self.store.upsert_device(&fingerprint.to_device(user.id)).await?;
        let pair = self.issue_pair(user, &device).await?;
        tracing::info!(device_id = %device.id, "Session opened");
        Ok(pair)
    }

    /// Verify an access token. Never touches storage.
    pub fn parse(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        self.jwt.validate_access_token(token)
    }

    #[tracing::instrument(skip_all)]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, ServiceError> {
        let claims = self
            .jwt
            .validate_refresh_token(refresh_token)
            .map_err(|e| match e {
                ServiceError::KeyNotFound => ServiceError::TokenInvalid,
                other => other,
            })?;

        let marker = self.store.revocation_marker(claims.sub).await?;
        if claims.rev != marker {
            tracing::info!(user_id = %claims.sub, "Refresh rejected: sessions revoked");
            return Err(ServiceError::TokenRevoked);
        }

        let device = self
            .store
            .find_device(&claims.did)
            .await?
            .ok_or(ServiceError::TokenRevoked)?;
        if device.user_id != claims.sub || fingerprint.device_id(claims.sub) != device.id {
            tracing::warn!(user_id = %claims.sub, device_id = %device.id, "Refresh from a different device");
            return Err(ServiceError::DeviceMismatch);
        }

        let user = self
            .store
            .find_user_by_id(claims.sub)
            .await?
            .ok_or(ServiceError::TokenRevoked)?;

        let device = self.store.upsert_device(&device).await?;
        self.issue_pair(&user, &device).await
    }

    /// Invalidate every outstanding refresh token of the user.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let marker = self.store.advance_revocation_marker(user_id).await?;
        tracing::info!(marker, "Sessions revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::keys::{KeyStore, SigningKey};
    use crate::services::store::MockStore;
    use std::net::Ipv4Addr;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/jwt_private.pem");

    async fn setup() -> (TokenService, Arc<MockStore>, User) {
        let store = Arc::new(MockStore::new());
        let key = SigningKey::from_pem(TEST_KEY, None).unwrap();
        let jwt = JwtService::new(Arc::new(KeyStore::new(key, 3600)), "sso", 60, 3600);
        let user = User::new("A".into(), "a@b.c", "hash".into(), None);
        store.insert_user(&user).await.unwrap();
        (TokenService::new(store.clone(), jwt), store, user)
    }

    fn fingerprint() -> DeviceFingerprint {
        DeviceFingerprint::new(Ipv4Addr::new(1, 2, 3, 4), "UA/1")
    }

    #[tokio::test]
    async fn test_refresh_after_revoke_is_rejected() {
        let (tokens, _, user) = setup().await;
        let pair = tokens.open_session(&user, &fingerprint()).await.unwrap();

        assert!(tokens.refresh(&pair.refresh, &fingerprint()).await.is_ok());
        tokens.revoke(user.id).await.unwrap();
        assert!(matches!(
            tokens.refresh(&pair.refresh, &fingerprint()).await,
            Err(ServiceError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_refresh_from_other_device_is_rejected() {
        let (tokens, _, user) = setup().await;
        let pair = tokens.open_session(&user, &fingerprint()).await.unwrap();
        let other = DeviceFingerprint::new(Ipv4Addr::new(5, 6, 7, 8), "UA/1");

        assert!(matches!(
            tokens.refresh(&pair.refresh, &other).await,
            Err(ServiceError::DeviceMismatch)
        ));
    }

    #[tokio::test]
    async fn test_deleted_device_revokes_its_refresh_token() {
        let (tokens, store, user) = setup().await;
        let pair = tokens.open_session(&user, &fingerprint()).await.unwrap();
        store
            .delete_device(&fingerprint().device_id(user.id))
            .await
            .unwrap();

        assert!(matches!(
            tokens.refresh(&pair.refresh, &fingerprint()).await,
            Err(ServiceError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_parse_preserves_subject() {
        let (tokens, _, user) = setup().await;
        let pair = tokens.open_session(&user, &fingerprint()).await.unwrap();
        assert_eq!(tokens.parse(&pair.access).unwrap().sub, user.id);
    }
}
