//! One-time email codes keyed by `(email, purpose)`.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::error::ServiceError;
use super::redis::Cache;
use crate::config::CodeConfig;
use crate::models::{normalize_email, CodePurpose, StoredCode};
use crate::utils::random;

#[derive(Clone)]
pub struct CodeService {
    cache: Arc<dyn Cache>,
    config: CodeConfig,
}

fn digest(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

impl CodeService {
    pub fn new(cache: Arc<dyn Cache>, config: CodeConfig) -> Self {
        Self { cache, config }
    }

    fn key(purpose: CodePurpose, email: &str) -> String {
        format!("code:{}:{}", purpose.as_str(), normalize_email(email))
    }

    fn attempts_key(purpose: CodePurpose, email: &str, generation: &str) -> String {
        format!(
            "code_attempts:{}:{}:{}",
            purpose.as_str(),
            normalize_email(email),
            generation
        )
    }

    fn ttl(&self, purpose: CodePurpose) -> i64 {
        match purpose {
            CodePurpose::Login => self.config.login_ttl_seconds,
            CodePurpose::Recover => self.config.recovery_ttl_seconds,
        }
    }

    /// Create a code for `(email, purpose)`, replacing any active one.
    pub async fn generate(&self, email: &str, purpose: CodePurpose) -> Result<String, ServiceError> {
        let code = match purpose {
            CodePurpose::Login => random::login_code(),
            CodePurpose::Recover => random::recovery_code(),
        };
        let entry = StoredCode::new(random::hex_token(16), digest(&code));
        let raw = serde_json::to_string(&entry).map_err(|e| ServiceError::Internal(e.into()))?;

        self.cache
            .set(&Self::key(purpose, email), &raw, self.ttl(purpose))
            .await?;

        tracing::debug!(purpose = purpose.as_str(), "Code generated");
        Ok(code)
    }

    /// Consume the code. Any failure is `CodeNotValid`.
    ///
    /// The stored entry is only ever removed by comparing against the value
    /// that was read, so a concurrent `generate` always wins.
    pub async fn check(
        &self,
        email: &str,
        purpose: CodePurpose,
        code: &str,
    ) -> Result<(), ServiceError> {
        let key = Self::key(purpose, email);
        let ttl = self.ttl(purpose);

        let Some(raw) = self.cache.get(&key).await? else {
            return Err(ServiceError::CodeNotValid);
        };
        let entry: StoredCode = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable code entry");
                self.cache.delete_if(&key, &raw).await?;
                return Err(ServiceError::CodeNotValid);
            }
        };

        if entry.is_expired(ttl) {
            self.cache.delete_if(&key, &raw).await?;
            return Err(ServiceError::CodeNotValid);
        }

        let remaining = (entry.expires_at(ttl) - Utc::now()).num_seconds().max(1);
        let attempts_key = Self::attempts_key(purpose, email, &entry.generation);
        let attempts = self.cache.incr(&attempts_key, remaining).await?;
        if attempts > i64::from(self.config.max_attempts) {
            tracing::warn!(purpose = purpose.as_str(), "Code attempts exhausted");
            self.cache.delete_if(&key, &raw).await?;
            return Err(ServiceError::CodeNotValid);
        }

        if !bool::from(entry.digest.as_bytes().ct_eq(digest(code).as_bytes())) {
            return Err(ServiceError::CodeNotValid);
        }

        // Lost to a concurrent check or a newer generate.
        if !self.cache.delete_if(&key, &raw).await? {
            return Err(ServiceError::CodeNotValid);
        }
        self.cache.delete(&attempts_key).await?;
        Ok(())
    }
}
