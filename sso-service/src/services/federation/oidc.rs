use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::{
    authorization_url, exchange_code, transport_error, ExternalProfile,
    FederationProvider, ProviderTokens, Protocol,
};
use crate::config::ProviderCredentials;
use crate::services::error::ServiceError;

/// Static description of an OpenID Connect provider.
#[derive(Debug, Clone)]
pub struct OidcDescriptor {
    pub name: &'static str,
    pub issuers: Vec<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub scopes: &'static [&'static str],
}

impl OidcDescriptor {
    pub fn google() -> Self {
        Self {
            name: "google",
            issuers: vec![
                "https://accounts.google.com".to_string(),
                "accounts.google.com".to_string(),
            ],
            authorization_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            jwks_uri: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
            scopes: &["openid", "email", "profile"],
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
}

pub struct OidcProvider {
    descriptor: OidcDescriptor,
    credentials: ProviderCredentials,
    client: reqwest::Client,
}

impl OidcProvider {
    pub fn new(
        descriptor: OidcDescriptor,
        credentials: ProviderCredentials,
        client: reqwest::Client,
    ) -> Self {
        Self {
            descriptor,
            credentials,
            client,
        }
    }

    async fn signing_keys(&self) -> Result<JwkSet, ServiceError> {
        let response = self
            .client
            .get(&self.descriptor.jwks_uri)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "JWKS fetch failed with status {}",
                response.status()
            )));
        }
        response.json().await.map_err(transport_error)
    }

    /// Check signature, issuer, audience and nonce of the ID token.
    async fn verify_id_token(
        &self,
        id_token: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdTokenClaims, ServiceError> {
        let header = decode_header(id_token).map_err(|_| ServiceError::InvalidCredentials)?;
        let kid = header.kid.ok_or(ServiceError::InvalidCredentials)?;

        let jwks = self.signing_keys().await?;
        let jwk = jwks.find(&kid).ok_or_else(|| {
            tracing::warn!(kid = %kid, "ID token signed with an unknown key");
            ServiceError::InvalidCredentials
        })?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Unusable provider key: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.credentials.client_id.as_str()]);
        validation.set_issuer(&self.descriptor.issuers);

        let claims = decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| {
                tracing::info!(error = %e, "ID token rejected");
                ServiceError::InvalidCredentials
            })?
            .claims;

        if claims.nonce.as_deref() != expected_nonce {
            tracing::warn!("ID token nonce mismatch");
            return Err(ServiceError::InvalidCredentials);
        }
        Ok(claims)
    }
}

#[async_trait]
impl FederationProvider for OidcProvider {
    fn name(&self) -> &str {
        self.descriptor.name
    }

    fn protocol(&self) -> Protocol {
        Protocol::Oidc
    }

    fn authorization_url(&self, state: &str, nonce: Option<&str>) -> Result<String, ServiceError> {
        authorization_url(
            &self.descriptor.authorization_endpoint,
            &self.credentials,
            self.descriptor.scopes,
            state,
            nonce,
        )
    }

    async fn exchange(&self, code: &str) -> Result<ProviderTokens, ServiceError> {
        let tokens = exchange_code(
            &self.client,
            &self.descriptor.token_endpoint,
            &self.credentials,
            code,
        )
        .await?;
        if tokens.id_token.is_none() {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "no id_token in token response"
            )));
        }
        Ok(tokens)
    }

    async fn fetch_profile(
        &self,
        tokens: &ProviderTokens,
        nonce: Option<&str>,
    ) -> Result<ExternalProfile, ServiceError> {
        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or(ServiceError::InvalidCredentials)?;
        let claims = self.verify_id_token(id_token, nonce).await?;

        Ok(ExternalProfile {
            provider_id: claims.sub,
            email: claims.email.unwrap_or_default(),
            name: claims.name.unwrap_or_default(),
            avatar: claims.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::federation::http_client;
    use crate::services::keys::SigningKey;
    use chrono::Utc;
    use jsonwebtoken::{encode, Header};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY: &str = include_str!("../../../tests/fixtures/jwt_private.pem");

    async fn provider_with_jwks(server: &MockServer, key: &SigningKey) -> OidcProvider {
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": [key.jwk()]})))
            .mount(server)
            .await;

        OidcProvider::new(
            OidcDescriptor {
                jwks_uri: format!("{}/certs", server.uri()),
                ..OidcDescriptor::google()
            },
            ProviderCredentials {
                client_id: "client".into(),
                client_secret: "secret".into(),
                redirect_uri: "http://localhost/cb".into(),
            },
            http_client().unwrap(),
        )
    }

    fn id_token(key: &SigningKey, aud: &str, nonce: &str) -> ProviderTokens {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid.clone());
        let now = Utc::now().timestamp();
        let token = encode(
            &header,
            &json!({
                "iss": "https://accounts.google.com",
                "aud": aud,
                "sub": "oidc-sub",
                "email": "o@example.com",
                "name": "O",
                "nonce": nonce,
                "iat": now,
                "exp": now + 300
            }),
            key.encoding_key(),
        )
        .unwrap();
        ProviderTokens {
            access_token: Some("at".into()),
            id_token: Some(token),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_valid_id_token_yields_profile() {
        let server = MockServer::start().await;
        let key = SigningKey::from_pem(TEST_KEY, Some("g1")).unwrap();
        let provider = provider_with_jwks(&server, &key).await;

        let profile = provider
            .fetch_profile(&id_token(&key, "client", "n-1"), Some("n-1"))
            .await
            .unwrap();
        assert_eq!(profile.provider_id, "oidc-sub");
        assert_eq!(profile.email, "o@example.com");
    }

    #[tokio::test]
    async fn test_nonce_and_audience_are_enforced() {
        let server = MockServer::start().await;
        let key = SigningKey::from_pem(TEST_KEY, Some("g1")).unwrap();
        let provider = provider_with_jwks(&server, &key).await;

        assert!(matches!(
            provider
                .fetch_profile(&id_token(&key, "client", "n-1"), Some("n-2"))
                .await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            provider
                .fetch_profile(&id_token(&key, "someone-else", "n-1"), Some("n-1"))
                .await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_authorization_url_carries_nonce() {
        let provider = OidcProvider::new(
            OidcDescriptor::google(),
            ProviderCredentials::default(),
            http_client().unwrap(),
        );
        let url = provider.authorization_url("st", Some("nn")).unwrap();
        assert!(url.contains("nonce=nn"));
        assert!(url.contains("scope=openid+email+profile"));
    }
}
