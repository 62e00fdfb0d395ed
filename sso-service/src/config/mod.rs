use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct SsoConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub codes: CodeConfig,
    pub captcha: CaptchaConfig,
    pub smtp: SmtpConfig,
    pub webauthn: WebauthnConfig,
    pub federation: FederationConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub private_key_path: String,
    /// Key id for the configured key; derived from the public key when unset.
    pub key_id: Option<String>,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    /// Zero disables background rotation.
    pub key_rotation_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeConfig {
    pub login_ttl_seconds: i64,
    pub recovery_ttl_seconds: i64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    pub secret: String,
    pub verify_url: String,
    pub min_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebauthnConfig {
    pub rp_id: String,
    pub rp_name: String,
    pub origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    pub success_url: String,
    pub google: ProviderCredentials,
    pub google_oidc_redirect_uri: String,
    pub github: ProviderCredentials,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl ProviderCredentials {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Take the client address from `X-Real-IP` / `X-Forwarded-For`.
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

impl SsoConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = SsoConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("sso-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
            },
            jwt: JwtConfig {
                private_key_path: get_env("JWT_PRIVATE_KEY_PATH", None, is_prod)?,
                key_id: env::var("JWT_KEY_ID").ok().filter(|v| !v.is_empty()),
                issuer: get_env("JWT_ISSUER", Some("sso"), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "30",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
                key_rotation_hours: parse_env("JWT_KEY_ROTATION_HOURS", "0", is_prod)?,
            },
            codes: CodeConfig {
                login_ttl_seconds: parse_env("LOGIN_CODE_TTL_SECONDS", "300", is_prod)?,
                recovery_ttl_seconds: parse_env("RECOVERY_CODE_TTL_SECONDS", "300", is_prod)?,
                max_attempts: parse_env("CODE_MAX_ATTEMPTS", "5", is_prod)?,
            },
            captcha: CaptchaConfig {
                secret: get_env("CAPTCHA_SECRET", None, is_prod)?,
                verify_url: get_env(
                    "CAPTCHA_VERIFY_URL",
                    Some("https://www.google.com/recaptcha/api/siteverify"),
                    is_prod,
                )?,
                min_score: parse_env("CAPTCHA_MIN_SCORE", "0.5", is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: parse_env("SMTP_PORT", "587", is_prod)?,
                user: get_env("SMTP_USER", None, is_prod)?,
                password: get_env("SMTP_PASSWORD", None, is_prod)?,
                from: get_env("SMTP_FROM", None, is_prod)?,
            },
            webauthn: WebauthnConfig {
                rp_id: get_env("WEBAUTHN_RP_ID", Some("localhost"), is_prod)?,
                rp_name: get_env("WEBAUTHN_RP_NAME", Some("SSO"), is_prod)?,
                origin: get_env("WEBAUTHN_ORIGIN", Some("http://localhost:3000"), is_prod)?,
            },
            federation: FederationConfig {
                success_url: get_env(
                    "PROVIDER_SUCCESS_URL",
                    Some("http://localhost:3000"),
                    is_prod,
                )?,
                google: ProviderCredentials {
                    client_id: get_env("GOOGLE_CLIENT_ID", Some(""), is_prod)?,
                    client_secret: get_env("GOOGLE_CLIENT_SECRET", Some(""), is_prod)?,
                    redirect_uri: get_env("GOOGLE_OAUTH2_REDIRECT_URI", Some(""), is_prod)?,
                },
                google_oidc_redirect_uri: get_env("GOOGLE_OIDC_REDIRECT_URI", Some(""), is_prod)?,
                github: ProviderCredentials {
                    client_id: get_env("GITHUB_CLIENT_ID", Some(""), is_prod)?,
                    client_secret: get_env("GITHUB_CLIENT_SECRET", Some(""), is_prod)?,
                    redirect_uri: get_env("GITHUB_REDIRECT_URI", Some(""), is_prod)?,
                },
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                trust_proxy_headers: parse_env("TRUST_PROXY_HEADERS", "false", is_prod)?,
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.codes.login_ttl_seconds <= 0 || self.codes.recovery_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Code TTLs must be positive"
            )));
        }

        if self.codes.max_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CODE_MAX_ATTEMPTS must be at least 1"
            )));
        }

        if self.webauthn.origin.trim().is_empty() || self.webauthn.rp_id.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "WEBAUTHN_RP_ID and WEBAUTHN_ORIGIN must not be empty"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::warn!("Swagger is publicly accessible in production");
            }
        }

        Ok(())
    }

    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.jwt.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.jwt.refresh_token_expiry_days * 24 * 60 * 60
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
