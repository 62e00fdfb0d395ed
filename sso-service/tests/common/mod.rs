//! Shared setup for the HTTP integration tests.
//!
//! Builds the full router over in-memory collaborators and drives it with
//! `oneshot`, supplying the socket peer through `ConnectInfo`.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use sso_service::{
    build_router,
    config::{
        CaptchaConfig, CodeConfig, DatabaseConfig, Environment, FederationConfig, JwtConfig,
        ProviderCredentials, RedisConfig, SecurityConfig, SmtpConfig, SsoConfig, SwaggerConfig,
        SwaggerMode, WebauthnConfig,
    },
    models::{Role, User, ADMIN_ROLE},
    services::{
        federation::{OAuth2Descriptor, OAuth2Provider},
        FederationManager, KeyStore, MockCache, MockCaptcha, MockEmailService, MockStore, Store,
    },
    utils::{hash_password, Password},
    AppState,
};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::util::ServiceExt;

const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/jwt_private.pem");

pub const TEST_KID: &str = "test-key";
pub const USER_AGENT: &str = "UA/1";
pub const SUCCESS_URL: &str = "http://app.test/welcome";

pub fn test_config() -> SsoConfig {
    SsoConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "sso-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            private_key_path: String::new(),
            key_id: Some(TEST_KID.to_string()),
            issuer: "sso".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 7,
            key_rotation_hours: 0,
        },
        codes: CodeConfig {
            login_ttl_seconds: 300,
            recovery_ttl_seconds: 300,
            max_attempts: 5,
        },
        captcha: CaptchaConfig {
            secret: "secret".to_string(),
            verify_url: "http://captcha.invalid/verify".to_string(),
            min_score: 0.5,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 25,
            user: String::new(),
            password: String::new(),
            from: "sso@example.com".to_string(),
        },
        webauthn: WebauthnConfig {
            rp_id: "localhost".to_string(),
            rp_name: "SSO".to_string(),
            origin: "http://localhost:3000".to_string(),
        },
        federation: FederationConfig {
            success_url: SUCCESS_URL.to_string(),
            google: ProviderCredentials {
                client_id: "google-client".to_string(),
                client_secret: "google-secret".to_string(),
                redirect_uri: "http://localhost:8080/auth/oauth2/google/callback".to_string(),
            },
            google_oidc_redirect_uri: "http://localhost:8080/auth/oidc/google/callback"
                .to_string(),
            github: ProviderCredentials::default(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            trust_proxy_headers: false,
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MockStore>,
    pub cache: Arc<MockCache>,
    pub email: Arc<MockEmailService>,
    _key_file: NamedTempFile,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_captcha(MockCaptcha::accepting())
    }

    pub fn with_captcha(captcha: MockCaptcha) -> Self {
        Self::assemble(test_config(), captcha, None)
    }

    pub fn with_config(config: SsoConfig) -> Self {
        Self::assemble(config, MockCaptcha::accepting(), None)
    }

    /// Google OAuth2 served by a mock provider at `base` (`/authorize`,
    /// `/token`, `/userinfo`).
    pub fn with_google_at(base: &str) -> Self {
        Self::assemble(test_config(), MockCaptcha::accepting(), Some(base))
    }

    fn assemble(mut config: SsoConfig, captcha: MockCaptcha, google_base: Option<&str>) -> Self {
        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(TEST_PRIVATE_KEY.as_bytes()).unwrap();
        config.jwt.private_key_path = key_file.path().to_string_lossy().into_owned();

        let keys = Arc::new(
            KeyStore::from_file(&config.jwt.private_key_path, Some(TEST_KID), 3600).unwrap(),
        );
        let store = Arc::new(MockStore::new());
        let cache = Arc::new(MockCache::new());
        let email = Arc::new(MockEmailService::new());

        let state = match google_base {
            None => AppState::new(
                config,
                store.clone(),
                cache.clone(),
                Arc::new(captcha),
                email.clone(),
                keys,
            ),
            Some(base) => {
                let mut federation = FederationManager::new(
                    cache.clone(),
                    store.clone(),
                    config.federation.success_url.clone(),
                );
                let descriptor = OAuth2Descriptor {
                    authorization_endpoint: format!("{}/authorize", base),
                    token_endpoint: format!("{}/token", base),
                    userinfo_endpoint: format!("{}/userinfo", base),
                    ..OAuth2Descriptor::google()
                };
                federation.register(Arc::new(OAuth2Provider::new(
                    descriptor,
                    config.federation.google.clone(),
                    reqwest::Client::new(),
                )));
                AppState::with_federation(
                    config,
                    store.clone(),
                    cache.clone(),
                    Arc::new(captcha),
                    email.clone(),
                    keys,
                    federation,
                )
            }
        }
        .unwrap();

        Self {
            router: build_router(state.clone()),
            state,
            store,
            cache,
            email,
            _key_file: key_file,
        }
    }

    pub async fn seed_user(&self, email: &str, password: &str, admin: bool) -> User {
        let hash = hash_password(&Password::new(password)).unwrap();
        let mut user = User::new("Test User".to_string(), email, hash.into_string(), None);
        if admin {
            user.roles = vec![Role::new(1, ADMIN_ROLE)];
        }
        self.store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Log in with the password flow and return the session cookies.
    pub async fn login(&self, email: &str, password: &str) -> Session {
        let response = self
            .send(
                RequestBuilder::post("/auth/jwt")
                    .json(serde_json::json!({
                        "email": email,
                        "password": password,
                        "captcha": "tok"
                    }))
                    .build(),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        response.session()
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `name -> raw Set-Cookie line`.
    pub fn set_cookies(&self) -> HashMap<String, String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|line| {
                let name = line.split('=').next()?.to_string();
                Some((name, line.to_string()))
            })
            .collect()
    }

    pub fn cookie_value(&self, name: &str) -> Option<String> {
        self.set_cookies().get(name).map(|line| {
            line.split(';')
                .next()
                .unwrap_or_default()
                .trim_start_matches(&format!("{}=", name))
                .to_string()
        })
    }

    pub fn session(&self) -> Session {
        Session {
            access: self.cookie_value("access").unwrap(),
            refresh: self.cookie_value("refresh").unwrap(),
        }
    }

    pub fn errors(&self) -> Vec<String> {
        serde_json::from_value(self.body["errors"].clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub access: String,
    pub refresh: String,
}

/// Request builder that fills in a device fingerprint by default.
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    peer: Option<SocketAddr>,
    body: Option<Value>,
}

impl RequestBuilder {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            headers: vec![("user-agent".to_string(), USER_AGENT.to_string())],
            peer: Some("1.2.3.4:40000".parse().unwrap()),
            body: None,
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn without_user_agent(mut self) -> Self {
        self.headers.retain(|(name, _)| name != "user-agent");
        self
    }

    pub fn peer(mut self, addr: &str) -> Self {
        self.peer = Some(addr.parse().unwrap());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn access(self, token: &str) -> Self {
        self.header("cookie", &format!("access={}", token))
    }

    pub fn refresh(self, token: &str) -> Self {
        self.header("cookie", &format!("refresh={}", token))
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = match self.body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let mut request = builder.body(body).unwrap();
        if let Some(peer) = self.peer {
            request.extensions_mut().insert(ConnectInfo(peer));
        }
        request
    }
}
