//! WebAuthn ceremony manager.
//!
//! The cryptography is delegated to `webauthn-rs`. What lives here is the
//! ceremony state: serialized into the cache for a few minutes and taken
//! exactly once on finish.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use webauthn_rs::prelude::*;

use super::error::ServiceError;
use super::redis::Cache;
use super::store::Store;
use crate::config::WebauthnConfig;
use crate::models::{normalize_email, User, WebauthnCredential};

/// Lifetime of a pending ceremony.
pub const CEREMONY_TTL_SECONDS: i64 = 300;

#[derive(Clone)]
pub struct WebauthnService {
    webauthn: Arc<Webauthn>,
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
}

fn registration_key(user_id: Uuid) -> String {
    format!("webauthn:registration:{}", user_id)
}

fn assertion_key(email: &str) -> String {
    format!("webauthn:assertion:{}", normalize_email(email))
}

fn credential_id(id: &CredentialID) -> String {
    URL_SAFE_NO_PAD.encode(id.as_slice())
}

impl WebauthnService {
    pub fn new(
        config: &WebauthnConfig,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
    ) -> Result<Self, anyhow::Error> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| anyhow::anyhow!("Invalid WebAuthn origin {}: {}", config.origin, e))?;
        let webauthn = WebauthnBuilder::new(&config.rp_id, &origin)?
            .rp_name(&config.rp_name)
            .build()?;

        Ok(Self {
            webauthn: Arc::new(webauthn),
            store,
            cache,
        })
    }

    async fn save_state<T: Serialize>(&self, key: &str, state: &T) -> Result<(), ServiceError> {
        let raw = serde_json::to_string(state).map_err(|e| ServiceError::Internal(e.into()))?;
        self.cache.set(key, &raw, CEREMONY_TTL_SECONDS).await?;
        Ok(())
    }

    async fn take_state<T: DeserializeOwned>(&self, key: &str) -> Result<T, ServiceError> {
        let raw = self.cache.take(key).await?.ok_or(ServiceError::NotFound)?;
        serde_json::from_str(&raw).map_err(|e| ServiceError::Internal(e.into()))
    }

    async fn passkeys(&self, user_id: Uuid) -> Result<Vec<Passkey>, ServiceError> {
        self.store
            .list_credentials(user_id)
            .await?
            .iter()
            .map(|c| {
                serde_json::from_str::<Passkey>(&c.passkey)
                    .map_err(|e| ServiceError::Internal(e.into()))
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(user_id = %user.id))]
    pub async fn register_start(
        &self,
        user: &User,
    ) -> Result<CreationChallengeResponse, ServiceError> {
        let exclude: Vec<CredentialID> = self
            .passkeys(user.id)
            .await?
            .iter()
            .map(|p| p.cred_id().clone())
            .collect();

        let (challenge, registration) = self
            .webauthn
            .start_passkey_registration(user.id, &user.email, &user.name, Some(exclude))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("WebAuthn registration start failed: {}", e)))?;

        self.save_state(&registration_key(user.id), &registration)
            .await?;
        Ok(challenge)
    }

    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn register_finish(
        &self,
        user_id: Uuid,
        response: &RegisterPublicKeyCredential,
    ) -> Result<(), ServiceError> {
        let registration: PasskeyRegistration =
            self.take_state(&registration_key(user_id)).await?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(response, &registration)
            .map_err(|e| {
                tracing::info!(error = %e, "Attestation rejected");
                ServiceError::InvalidCredentials
            })?;

        let stored = serde_json::to_string(&passkey).map_err(|e| ServiceError::Internal(e.into()))?;
        self.store
            .insert_credential(&WebauthnCredential::new(
                credential_id(passkey.cred_id()),
                user_id,
                stored,
            ))
            .await?;

        tracing::info!("Passkey registered");
        Ok(())
    }

    /// Build an assertion challenge for the user's registered passkeys.
    #[tracing::instrument(skip_all, fields(user_id = %user.id))]
    pub async fn login_start(&self, user: &User) -> Result<RequestChallengeResponse, ServiceError> {
        let passkeys = self.passkeys(user.id).await?;
        if passkeys.is_empty() {
            return Err(ServiceError::NotFound);
        }

        let (challenge, authentication) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("WebAuthn login start failed: {}", e)))?;

        self.save_state(&assertion_key(&user.email), &authentication)
            .await?;
        Ok(challenge)
    }

    /// Validate the assertion and update the credential's counter.
    #[tracing::instrument(skip_all, fields(user_id = %user.id))]
    pub async fn login_finish(
        &self,
        user: &User,
        response: &PublicKeyCredential,
    ) -> Result<(), ServiceError> {
        let authentication: PasskeyAuthentication =
            self.take_state(&assertion_key(&user.email)).await?;

        let result = self
            .webauthn
            .finish_passkey_authentication(response, &authentication)
            .map_err(|e| {
                tracing::info!(error = %e, "Assertion rejected");
                ServiceError::InvalidCredentials
            })?;

        let used = credential_id(result.cred_id());
        for mut passkey in self.passkeys(user.id).await? {
            if credential_id(passkey.cred_id()) != used {
                continue;
            }
            if passkey.update_credential(&result).unwrap_or(false) {
                let stored =
                    serde_json::to_string(&passkey).map_err(|e| ServiceError::Internal(e.into()))?;
                self.store.update_credential(&used, &stored).await?;
            }
        }
        Ok(())
    }
}
