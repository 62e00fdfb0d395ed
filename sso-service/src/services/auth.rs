//! Credential coordinator: one entry point per login path.
//!
//! Every successful login upserts the caller's device and returns a fresh
//! token pair bound to it.

use std::sync::Arc;
use uuid::Uuid;
use webauthn_rs::prelude::{
    CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse,
};

use super::captcha::{require_captcha, CaptchaAction, CaptchaVerifier};
use super::codes::CodeService;
use super::email::{EmailProvider, EmailTemplate};
use super::error::ServiceError;
use super::federation::{CallbackParams, FederationManager, Protocol};
use super::store::Store;
use super::token::{TokenPair, TokenService};
use super::webauthn::WebauthnService;
use crate::models::{CodePurpose, DeviceFingerprint, User};
use crate::utils::{hash_password, verify_password, Password};

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    captcha: Arc<dyn CaptchaVerifier>,
    email: Arc<dyn EmailProvider>,
    codes: CodeService,
    tokens: TokenService,
    webauthn: WebauthnService,
    federation: Arc<FederationManager>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        captcha: Arc<dyn CaptchaVerifier>,
        email: Arc<dyn EmailProvider>,
        codes: CodeService,
        tokens: TokenService,
        webauthn: WebauthnService,
        federation: Arc<FederationManager>,
    ) -> Self {
        Self {
            store,
            captcha,
            email,
            codes,
            tokens,
            webauthn,
            federation,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    async fn user_by_email(&self, email: &str) -> Result<User, ServiceError> {
        self.store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// First factor shared by the password and email-code paths.
    async fn authenticate(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let user = self.user_by_email(email).await?;
        if !verify_password(&Password::new(password), &user.password)? {
            tracing::info!(user_id = %user.id, "Password mismatch");
            return Err(ServiceError::InvalidCredentials);
        }
        Ok(user)
    }

    #[tracing::instrument(skip(self, password, captcha_token, fingerprint))]
    pub async fn password_login(
        &self,
        email: &str,
        password: &str,
        captcha_token: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, ServiceError> {
        require_captcha(self.captcha.as_ref(), captcha_token, CaptchaAction::Auth).await?;
        let user = self.authenticate(email, password).await?;
        self.tokens.open_session(&user, fingerprint).await
    }

    /// Check the password, mail a login code and return a session right away.
    #[tracing::instrument(skip(self, password, captcha_token, fingerprint))]
    pub async fn send_login_code(
        &self,
        email: &str,
        password: &str,
        captcha_token: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, ServiceError> {
        require_captcha(self.captcha.as_ref(), captcha_token, CaptchaAction::EmailAuth).await?;
        let user = self.authenticate(email, password).await?;

        let code = self.codes.generate(&user.email, CodePurpose::Login).await?;
        self.email
            .send(&user.email, EmailTemplate::LoginCode { code })
            .await?;

        self.tokens.open_session(&user, fingerprint).await
    }

    #[tracing::instrument(skip(self, code, fingerprint))]
    pub async fn check_login_code(
        &self,
        email: &str,
        code: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, ServiceError> {
        self.codes.check(email, CodePurpose::Login, code).await?;
        let user = self.user_by_email(email).await?;
        self.tokens.open_session(&user, fingerprint).await
    }

    #[tracing::instrument(skip(self, captcha_token))]
    pub async fn send_recovery_code(
        &self,
        email: &str,
        captcha_token: &str,
    ) -> Result<(), ServiceError> {
        require_captcha(self.captcha.as_ref(), captcha_token, CaptchaAction::ForgotPass).await?;
        let user = self.user_by_email(email).await?;

        let code = self.codes.generate(&user.email, CodePurpose::Recover).await?;
        self.email
            .send(&user.email, EmailTemplate::RecoveryCode { code })
            .await?;
        tracing::info!(user_id = %user.id, "Recovery code sent");
        Ok(())
    }

    /// Consume a recovery code, replace the password and revoke every session.
    #[tracing::instrument(skip(self, code, new_password))]
    pub async fn check_recovery_code(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        self.codes.check(email, CodePurpose::Recover, code).await?;
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::CodeNotValid)?;

        let verifier = hash_password(&Password::new(new_password))?;
        self.store
            .update_password(user.id, verifier.as_str())
            .await?;
        self.tokens.revoke(user.id).await?;

        tracing::info!(user_id = %user.id, "Password recovered");
        Ok(())
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, ServiceError> {
        self.tokens.refresh(refresh_token, fingerprint).await
    }

    /// Safe to repeat.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.tokens.revoke(user_id).await
    }

    pub async fn webauthn_register_start(
        &self,
        user_id: Uuid,
    ) -> Result<CreationChallengeResponse, ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        self.webauthn.register_start(&user).await
    }

    pub async fn webauthn_register_finish(
        &self,
        user_id: Uuid,
        response: &RegisterPublicKeyCredential,
    ) -> Result<(), ServiceError> {
        self.webauthn.register_finish(user_id, response).await
    }

    #[tracing::instrument(skip(self, captcha_token))]
    pub async fn webauthn_login_start(
        &self,
        email: &str,
        captcha_token: &str,
    ) -> Result<RequestChallengeResponse, ServiceError> {
        require_captcha(
            self.captcha.as_ref(),
            captcha_token,
            CaptchaAction::WebauthnLogin,
        )
        .await?;
        let user = self.user_by_email(email).await?;
        self.webauthn.login_start(&user).await
    }

    #[tracing::instrument(skip(self, response, fingerprint))]
    pub async fn webauthn_login_finish(
        &self,
        email: &str,
        response: &PublicKeyCredential,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, ServiceError> {
        let user = self.user_by_email(email).await?;
        self.webauthn.login_finish(&user, response).await?;
        self.tokens.open_session(&user, fingerprint).await
    }

    pub async fn federation_start(
        &self,
        protocol: Protocol,
        provider: &str,
    ) -> Result<String, ServiceError> {
        self.federation.start(protocol, provider).await
    }

    /// Returns the session and the URL to send the browser to.
    pub async fn federation_callback(
        &self,
        protocol: Protocol,
        provider: &str,
        params: &CallbackParams,
        fingerprint: &DeviceFingerprint,
    ) -> Result<(TokenPair, String), ServiceError> {
        let user = self.federation.callback(protocol, provider, params).await?;
        let pair = self.tokens.open_session(&user, fingerprint).await?;
        Ok((pair, self.federation.success_url().to_string()))
    }
}
