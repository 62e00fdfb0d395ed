//! reCAPTCHA v3 verification.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use super::error::ServiceError;
use crate::config::CaptchaConfig;

/// Action a token must have been minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaAction {
    Auth,
    EmailAuth,
    ForgotPass,
    WebauthnLogin,
}

impl CaptchaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptchaAction::Auth => "auth",
            CaptchaAction::EmailAuth => "email_auth",
            CaptchaAction::ForgotPass => "forgot_pass",
            CaptchaAction::WebauthnLogin => "wa_login",
        }
    }
}

impl fmt::Display for CaptchaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// `Ok(false)` means the token was rejected; `Err` means the check itself failed.
    async fn verify(&self, token: &str, action: CaptchaAction) -> Result<bool, anyhow::Error>;
}

/// Map a verifier outcome onto the failure taxonomy.
pub async fn require_captcha(
    verifier: &dyn CaptchaVerifier,
    token: &str,
    action: CaptchaAction,
) -> Result<(), ServiceError> {
    match verifier.verify(token, action).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::debug!(%action, "Captcha rejected");
            Err(ServiceError::CaptchaInvalid)
        }
        Err(e) => {
            tracing::error!(error = %e, %action, "Captcha verification failed");
            Err(ServiceError::CaptchaVerificationFailed)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    action: String,
}

#[derive(Clone)]
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: String,
    verify_url: String,
    min_score: f64,
}

impl RecaptchaVerifier {
    pub fn new(config: &CaptchaConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            secret: config.secret.clone(),
            verify_url: config.verify_url.clone(),
            min_score: config.min_score,
        })
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str, action: CaptchaAction) -> Result<bool, anyhow::Error> {
        let response: SiteVerifyResponse = self
            .client
            .post(&self.verify_url)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.success
            && response.score > self.min_score
            && response.action == action.as_str())
    }
}

/// Verifier with a fixed answer.
pub struct MockCaptcha {
    outcome: Result<bool, String>,
}

impl MockCaptcha {
    pub fn accepting() -> Self {
        Self { outcome: Ok(true) }
    }

    pub fn rejecting() -> Self {
        Self { outcome: Ok(false) }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Err("captcha provider unreachable".to_string()),
        }
    }
}

#[async_trait]
impl CaptchaVerifier for MockCaptcha {
    async fn verify(&self, _token: &str, _action: CaptchaAction) -> Result<bool, anyhow::Error> {
        self.outcome.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verifier(server: &MockServer) -> RecaptchaVerifier {
        RecaptchaVerifier::new(&CaptchaConfig {
            secret: "s3cret".to_string(),
            verify_url: format!("{}/siteverify", server.uri()),
            min_score: 0.5,
        })
        .unwrap()
    }

    async fn respond(server: &MockServer, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .and(body_string_contains("secret=s3cret"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_accepts_matching_action_and_score() {
        let server = MockServer::start().await;
        respond(&server, 200, json!({"success": true, "score": 0.9, "action": "auth"})).await;

        assert!(verifier(&server)
            .verify("tok", CaptchaAction::Auth)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_rejects_wrong_action() {
        let server = MockServer::start().await;
        respond(&server, 200, json!({"success": true, "score": 0.9, "action": "auth"})).await;

        assert!(!verifier(&server)
            .verify("tok", CaptchaAction::ForgotPass)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_rejects_low_score() {
        let server = MockServer::start().await;
        respond(&server, 200, json!({"success": true, "score": 0.5, "action": "auth"})).await;

        let result = require_captcha(&verifier(&server), "tok", CaptchaAction::Auth).await;
        assert!(matches!(result, Err(ServiceError::CaptchaInvalid)));
    }

    #[tokio::test]
    async fn test_provider_error_is_verification_failure() {
        let server = MockServer::start().await;
        respond(&server, 503, json!({})).await;

        let result = require_captcha(&verifier(&server), "tok", CaptchaAction::Auth).await;
        assert!(matches!(result, Err(ServiceError::CaptchaVerificationFailed)));
    }
}
