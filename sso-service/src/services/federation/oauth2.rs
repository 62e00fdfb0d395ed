use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{
    authorization_url, classify_status, exchange_code, transport_error, ExternalProfile,
    FederationProvider, ProviderTokens, Protocol,
};
use crate::config::ProviderCredentials;
use crate::services::error::ServiceError;

/// Static description of a plain OAuth2 provider.
#[derive(Clone)]
pub struct OAuth2Descriptor {
    pub name: &'static str,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    /// Consulted when the profile has no email (GitHub private addresses).
    pub emails_endpoint: Option<String>,
    pub scopes: &'static [&'static str],
    pub parse_profile: fn(&Value) -> Option<ExternalProfile>,
}

impl OAuth2Descriptor {
    pub fn google() -> Self {
        Self {
            name: "google",
            authorization_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_endpoint: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            emails_endpoint: None,
            scopes: &[
                "https://www.googleapis.com/auth/userinfo.email",
                "https://www.googleapis.com/auth/userinfo.profile",
            ],
            parse_profile: google_profile,
        }
    }

    pub fn github() -> Self {
        Self {
            name: "github",
            authorization_endpoint: "https://github.com/login/oauth/authorize".to_string(),
            token_endpoint: "https://github.com/login/oauth/access_token".to_string(),
            userinfo_endpoint: "https://api.github.com/user".to_string(),
            emails_endpoint: Some("https://api.github.com/user/emails".to_string()),
            scopes: &["read:user", "user:email"],
            parse_profile: github_profile,
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn google_profile(value: &Value) -> Option<ExternalProfile> {
    Some(ExternalProfile {
        provider_id: string_field(value, "id")?,
        email: string_field(value, "email").unwrap_or_default(),
        name: string_field(value, "name").unwrap_or_default(),
        avatar: string_field(value, "picture"),
    })
}

fn github_profile(value: &Value) -> Option<ExternalProfile> {
    let login = string_field(value, "login");
    Some(ExternalProfile {
        provider_id: string_field(value, "id")?,
        email: string_field(value, "email").unwrap_or_default(),
        name: string_field(value, "name").or(login).unwrap_or_default(),
        avatar: string_field(value, "avatar_url"),
    })
}

#[derive(Debug, Deserialize)]
struct ProviderEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

pub struct OAuth2Provider {
    descriptor: OAuth2Descriptor,
    credentials: ProviderCredentials,
    client: reqwest::Client,
}

impl OAuth2Provider {
    pub fn new(
        descriptor: OAuth2Descriptor,
        credentials: ProviderCredentials,
        client: reqwest::Client,
    ) -> Self {
        Self {
            descriptor,
            credentials,
            client,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;
        classify_status(response.status(), "profile fetch")?;
        response.json().await.map_err(transport_error)
    }

    async fn primary_email(&self, url: &str, access_token: &str) -> Result<String, ServiceError> {
        let emails: Vec<ProviderEmail> = self.get_json(url, access_token).await?;
        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email)
            .unwrap_or_default())
    }
}

#[async_trait]
impl FederationProvider for OAuth2Provider {
    fn name(&self) -> &str {
        self.descriptor.name
    }

    fn protocol(&self) -> Protocol {
        Protocol::OAuth2
    }

    fn authorization_url(&self, state: &str, _nonce: Option<&str>) -> Result<String, ServiceError> {
        authorization_url(
            &self.descriptor.authorization_endpoint,
            &self.credentials,
            self.descriptor.scopes,
            state,
            None,
        )
    }

    async fn exchange(&self, code: &str) -> Result<ProviderTokens, ServiceError> {
        exchange_code(
            &self.client,
            &self.descriptor.token_endpoint,
            &self.credentials,
            code,
        )
        .await
    }

    async fn fetch_profile(
        &self,
        tokens: &ProviderTokens,
        _nonce: Option<&str>,
    ) -> Result<ExternalProfile, ServiceError> {
        let access_token = tokens
            .access_token
            .as_deref()
            .ok_or(ServiceError::InvalidCredentials)?;

        let raw: Value = self
            .get_json(&self.descriptor.userinfo_endpoint, access_token)
            .await?;
        let mut profile = (self.descriptor.parse_profile)(&raw).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "{} profile is missing its subject",
                self.descriptor.name
            ))
        })?;

        if profile.email.is_empty() {
            if let Some(url) = &self.descriptor.emails_endpoint {
                profile.email = self.primary_email(url, access_token).await?;
            }
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::federation::http_client;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_github_profile_falls_back_to_login() {
        let profile = github_profile(&json!({"id": 42, "login": "octo", "name": null})).unwrap();
        assert_eq!(profile.provider_id, "42");
        assert_eq!(profile.name, "octo");
        assert!(profile.email.is_empty());
    }

    #[tokio::test]
    async fn test_github_private_email_uses_emails_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer gh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 7, "login": "octo", "email": null, "avatar_url": "http://a"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"email": "old@example.com", "primary": false, "verified": true},
                {"email": "octo@example.com", "primary": true, "verified": true}
            ])))
            .mount(&server)
            .await;

        let provider = OAuth2Provider::new(
            OAuth2Descriptor {
                userinfo_endpoint: format!("{}/user", server.uri()),
                emails_endpoint: Some(format!("{}/user/emails", server.uri())),
                ..OAuth2Descriptor::github()
            },
            ProviderCredentials::default(),
            http_client().unwrap(),
        );
        let tokens = ProviderTokens {
            access_token: Some("gh-token".into()),
            id_token: None,
            error: None,
        };

        let profile = provider.fetch_profile(&tokens, None).await.unwrap();
        assert_eq!(profile.email, "octo@example.com");
        assert_eq!(profile.provider_id, "7");
    }

    #[test]
    fn test_authorization_url_carries_state_and_scopes() {
        let provider = OAuth2Provider::new(
            OAuth2Descriptor::github(),
            ProviderCredentials {
                client_id: "cid".into(),
                client_secret: "s".into(),
                redirect_uri: "http://localhost/cb".into(),
            },
            http_client().unwrap(),
        );
        let url = provider.authorization_url("abc", Some("ignored")).unwrap();
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("state=abc"));
        assert!(url.contains("client_id=cid"));
        assert!(!url.contains("nonce"));
    }
}
