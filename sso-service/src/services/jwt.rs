use chrono::Utc;
use jsonwebtoken::{decode, decode_header, encode, errors::ErrorKind, Algorithm, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::ServiceError;
use super::keys::KeyStore;
use crate::models::Role;

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims for access tokens (short-lived, stateless)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Role snapshot taken at mint time
    pub roles: Vec<Role>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub iss: String,
    pub typ: String,
}

/// Claims for refresh tokens (long-lived, bound to a device)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTokenClaims {
    pub sub: Uuid,
    /// Device id the session is bound to
    pub did: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    /// User's revocation marker at mint time
    pub rev: i64,
    pub iss: String,
    pub typ: String,
}

/// Signs and verifies RS256 tokens against the current key ring.
#[derive(Clone)]
pub struct JwtService {
    keys: Arc<KeyStore>,
    issuer: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl JwtService {
    pub fn new(
        keys: Arc<KeyStore>,
        issuer: impl Into<String>,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        roles: &[Role],
    ) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        self.sign(&AccessTokenClaims {
            sub: user_id,
            roles: roles.to_vec(),
            iat: now,
            exp: now + self.access_ttl_seconds,
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
        })
    }

    pub fn generate_refresh_token(
        &self,
        user_id: Uuid,
        device_id: &str,
        marker: i64,
    ) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        self.sign(&RefreshTokenClaims {
            sub: user_id,
            did: device_id.to_string(),
            iat: now,
            exp: now + self.refresh_ttl_seconds,
            jti: Uuid::new_v4().to_string(),
            rev: marker,
            iss: self.issuer.clone(),
            typ: REFRESH_TOKEN_TYPE.to_string(),
        })
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let claims: AccessTokenClaims = self.verify(token)?;
        if claims.typ != ACCESS_TOKEN_TYPE {
            return Err(ServiceError::TokenInvalid);
        }
        Ok(claims)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, ServiceError> {
        let claims: RefreshTokenClaims = self.verify(token)?;
        if claims.typ != REFRESH_TOKEN_TYPE {
            return Err(ServiceError::TokenInvalid);
        }
        Ok(claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, ServiceError> {
        let ring = self.keys.snapshot();
        let active = ring.active();

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(active.kid.clone());

        encode(&header, claims, active.encoding_key()).map_err(|e| {
            tracing::error!(error = %e, kid = %active.kid, "Failed to sign token");
            ServiceError::Internal(anyhow::anyhow!("Failed to sign token: {}", e))
        })
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, ServiceError> {
        let header = decode_header(token).map_err(|_| ServiceError::TokenInvalid)?;
        if header.alg != Algorithm::RS256 {
            return Err(ServiceError::TokenInvalid);
        }
        let kid = header.kid.ok_or(ServiceError::KeyNotFound)?;

        let ring = self.keys.snapshot();
        let key = ring.find(&kid).ok_or(ServiceError::KeyNotFound)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<T>(token, key.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
                _ => ServiceError::TokenInvalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Permission;
    use crate::services::keys::SigningKey;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/jwt_private.pem");

    fn service(access_ttl: i64) -> JwtService {
        let key = SigningKey::from_pem(TEST_KEY, Some("test-kid")).unwrap();
        JwtService::new(Arc::new(KeyStore::new(key, 3600)), "sso", access_ttl, 3600)
    }

    #[test]
    fn test_access_token_round_trip() {
        let jwt = service(60);
        let uid = Uuid::new_v4();
        let roles = vec![Role::new(1, "admin").with_permissions(vec![Permission::new(7, "users.write")])];

        let token = jwt.generate_access_token(uid, &roles).unwrap();
        let claims = jwt.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, uid);
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.iss, "sso");
    }

    #[test]
    fn test_expired_access_token() {
        let jwt = service(-10);
        let token = jwt.generate_access_token(Uuid::new_v4(), &[]).unwrap();
        assert!(matches!(
            jwt.validate_access_token(&token),
            Err(ServiceError::TokenExpired)
        ));
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let jwt = service(60);
        let refresh = jwt.generate_refresh_token(Uuid::new_v4(), "dev", 0).unwrap();
        assert!(matches!(
            jwt.validate_access_token(&refresh),
            Err(ServiceError::TokenInvalid)
        ));
        assert_eq!(jwt.validate_refresh_token(&refresh).unwrap().did, "dev");
    }

    #[test]
    fn test_unknown_kid_is_key_not_found() {
        let issuer = service(60);
        let token = issuer.generate_access_token(Uuid::new_v4(), &[]).unwrap();

        let other_key = SigningKey::from_pem(TEST_KEY, Some("other-kid")).unwrap();
        let verifier = JwtService::new(Arc::new(KeyStore::new(other_key, 3600)), "sso", 60, 60);

        assert!(matches!(
            verifier.validate_access_token(&token),
            Err(ServiceError::KeyNotFound)
        ));
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(
            service(60).validate_access_token("not.a.token"),
            Err(ServiceError::TokenInvalid)
        ));
    }
}
