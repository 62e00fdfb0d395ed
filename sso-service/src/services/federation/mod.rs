//! Federation manager: OAuth2 and OpenID Connect login through external providers.
//!
//! Providers register a descriptor with the manager; the manager owns the
//! single-use `state`, the callback checks and the mapping of external
//! subjects onto local users.

mod oauth2;
mod oidc;

pub use oauth2::{OAuth2Descriptor, OAuth2Provider};
pub use oidc::{OidcDescriptor, OidcProvider};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::error::ServiceError;
use super::redis::Cache;
use super::store::Store;
use crate::config::{FederationConfig, ProviderCredentials};
use crate::models::{OAuthConnection, User};
use crate::utils::password::{hash_password, Password};
use crate::utils::random;

/// Lifetime of a pending authorization.
pub const STATE_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    OAuth2,
    Oidc,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::OAuth2 => "oauth2",
            Protocol::Oidc => "oidc",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a provider tells us about the person who logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    pub provider_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
}

/// Token endpoint reply. `error` is set by providers that answer 200 on failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTokens {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait FederationProvider: Send + Sync {
    fn name(&self) -> &str;
    fn protocol(&self) -> Protocol;
    fn authorization_url(&self, state: &str, nonce: Option<&str>) -> Result<String, ServiceError>;
    async fn exchange(&self, code: &str) -> Result<ProviderTokens, ServiceError>;
    async fn fetch_profile(
        &self,
        tokens: &ProviderTokens,
        nonce: Option<&str>,
    ) -> Result<ExternalProfile, ServiceError>;
}

/// Query parameters the provider redirects back with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingAuthorization {
    provider: String,
    protocol: Protocol,
    nonce: Option<String>,
}

pub struct FederationManager {
    providers: HashMap<(Protocol, String), Arc<dyn FederationProvider>>,
    cache: Arc<dyn Cache>,
    store: Arc<dyn Store>,
    success_url: String,
}

impl FederationManager {
    pub fn new(cache: Arc<dyn Cache>, store: Arc<dyn Store>, success_url: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            cache,
            store,
            success_url: success_url.into(),
        }
    }

    /// Register the providers that have credentials configured.
    pub fn from_config(
        config: &FederationConfig,
        cache: Arc<dyn Cache>,
        store: Arc<dyn Store>,
    ) -> Result<Self, anyhow::Error> {
        let client = http_client()?;
        let mut manager = Self::new(cache, store, config.success_url.clone());

        if config.google.is_configured() {
            manager.register(Arc::new(OAuth2Provider::new(
                OAuth2Descriptor::google(),
                config.google.clone(),
                client.clone(),
            )));
            let oidc_credentials = ProviderCredentials {
                redirect_uri: config.google_oidc_redirect_uri.clone(),
                ..config.google.clone()
            };
            manager.register(Arc::new(OidcProvider::new(
                OidcDescriptor::google(),
                oidc_credentials,
                client.clone(),
            )));
        }
        if config.github.is_configured() {
            manager.register(Arc::new(OAuth2Provider::new(
                OAuth2Descriptor::github(),
                config.github.clone(),
                client,
            )));
        }

        for (protocol, name) in manager.providers.keys() {
            tracing::info!(%protocol, provider = %name, "Federation provider registered");
        }
        Ok(manager)
    }

    pub fn register(&mut self, provider: Arc<dyn FederationProvider>) {
        self.providers
            .insert((provider.protocol(), provider.name().to_string()), provider);
    }

    pub fn success_url(&self) -> &str {
        &self.success_url
    }

    fn provider(
        &self,
        protocol: Protocol,
        name: &str,
    ) -> Result<&Arc<dyn FederationProvider>, ServiceError> {
        self.providers
            .get(&(protocol, name.to_string()))
            .ok_or(ServiceError::NotFound)
    }

    /// Persist a fresh `state` and return the provider's authorization URL.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, protocol: Protocol, name: &str) -> Result<String, ServiceError> {
        let provider = self.provider(protocol, name)?;

        let state = random::hex_token(32);
        let nonce = (protocol == Protocol::Oidc).then(|| random::hex_token(16));
        let pending = PendingAuthorization {
            provider: name.to_string(),
            protocol,
            nonce: nonce.clone(),
        };
        let raw = serde_json::to_string(&pending).map_err(|e| ServiceError::Internal(e.into()))?;
        self.cache
            .set(&state_key(&state), &raw, STATE_TTL_SECONDS)
            .await?;

        provider.authorization_url(&state, nonce.as_deref())
    }

    /// Consume the state, exchange the code and resolve the local user.
    #[tracing::instrument(skip(self, params))]
    pub async fn callback(
        &self,
        protocol: Protocol,
        name: &str,
        params: &CallbackParams,
    ) -> Result<User, ServiceError> {
        let provider = self.provider(protocol, name)?;

        let state = params.state.as_deref().ok_or(ServiceError::NotFound)?;
        let raw = self
            .cache
            .take(&state_key(state))
            .await?
            .ok_or(ServiceError::NotFound)?;
        let pending: PendingAuthorization =
            serde_json::from_str(&raw).map_err(|e| ServiceError::Internal(e.into()))?;

        if pending.provider != name || pending.protocol != protocol {
            tracing::warn!("Federation state issued for another provider");
            return Err(ServiceError::InvalidCredentials);
        }
        if let Some(error) = &params.error {
            tracing::info!(error = %error, "Provider denied the authorization");
            return Err(ServiceError::InvalidCredentials);
        }
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(ServiceError::InvalidCredentials)?;

        let tokens = provider.exchange(code).await?;
        let profile = provider
            .fetch_profile(&tokens, pending.nonce.as_deref())
            .await?;

        self.resolve_user(name, profile).await
    }

    /// Linked account first, then email, then a new account.
    async fn resolve_user(
        &self,
        provider: &str,
        profile: ExternalProfile,
    ) -> Result<User, ServiceError> {
        if let Some(user) = self
            .store
            .find_user_by_oauth(provider, &profile.provider_id)
            .await?
        {
            return Ok(user);
        }

        if profile.email.is_empty() {
            tracing::warn!(provider, "Provider profile carries no email");
            return Err(ServiceError::InvalidCredentials);
        }

        let user = match self.store.find_user_by_email(&profile.email).await? {
            Some(user) => user,
            None => {
                let secret = Password::new(random::hex_token(32));
                let verifier = hash_password(&secret)?;
                let user = User::new(
                    profile.name.clone(),
                    &profile.email,
                    verifier.into_string(),
                    profile.avatar.clone(),
                );
                self.store.insert_user(&user).await?;
                tracing::info!(user_id = %user.id, provider, "User created from federated login");
                user
            }
        };

        self.store
            .link_oauth(&OAuthConnection::new(user.id, provider, &profile.provider_id))
            .await?;
        Ok(user)
    }
}

fn state_key(state: &str) -> String {
    format!("oauth_state:{}", state)
}

pub(crate) fn http_client() -> Result<reqwest::Client, anyhow::Error> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(concat!("sso-service/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Transport and server faults are internal; a provider refusing us is a credential failure.
pub(crate) fn classify_status(status: StatusCode, what: &str) -> Result<(), ServiceError> {
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() {
        tracing::info!(%status, what, "Provider rejected the request");
        Err(ServiceError::InvalidCredentials)
    } else {
        Err(ServiceError::Internal(anyhow::anyhow!(
            "{} failed with status {}",
            what,
            status
        )))
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> ServiceError {
    ServiceError::Internal(anyhow::anyhow!("Provider request failed: {}", err))
}

/// Authorization-code grant shared by both protocols.
pub(crate) async fn exchange_code(
    client: &reqwest::Client,
    token_endpoint: &str,
    credentials: &ProviderCredentials,
    code: &str,
) -> Result<ProviderTokens, ServiceError> {
    let response = client
        .post(token_endpoint)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", credentials.redirect_uri.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ])
        .send()
        .await
        .map_err(transport_error)?;
    classify_status(response.status(), "token exchange")?;

    let tokens: ProviderTokens = response.json().await.map_err(transport_error)?;
    if let Some(error) = &tokens.error {
        tracing::info!(error = %error, "Token endpoint refused the code");
        return Err(ServiceError::InvalidCredentials);
    }
    Ok(tokens)
}

pub(crate) fn authorization_url(
    endpoint: &str,
    credentials: &ProviderCredentials,
    scopes: &[&str],
    state: &str,
    nonce: Option<&str>,
) -> Result<String, ServiceError> {
    let mut url = reqwest::Url::parse(endpoint)
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid authorization endpoint: {}", e)))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", &credentials.redirect_uri)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state);
        if let Some(nonce) = nonce {
            query.append_pair("nonce", nonce);
        }
    }
    Ok(url.to_string())
}
