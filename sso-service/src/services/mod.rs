//! Services layer of the SSO authority.
//!
//! Credential flows, token lifecycle, ephemeral state machines and the
//! collaborators they talk to (persistence, cache, mail, captcha, providers).

pub mod auth;
pub mod captcha;
pub mod codes;
mod database;
pub mod email;
pub mod error;
pub mod federation;
pub mod jwt;
pub mod keys;
pub mod policy;
pub mod redis;
pub mod store;
pub mod token;
pub mod webauthn;

pub use auth::AuthService;
pub use captcha::{CaptchaAction, CaptchaVerifier, MockCaptcha, RecaptchaVerifier};
pub use codes::CodeService;
pub use database::Database;
pub use email::{EmailProvider, EmailService, EmailTemplate, MockEmailService};
pub use error::ServiceError;
pub use federation::{CallbackParams, FederationManager, Protocol};
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims};
pub use keys::{JsonWebKey, JsonWebKeySet, KeyStore, SigningKey};
pub use policy::RightsEvaluator;
pub use redis::{Cache, MockCache, RedisService};
pub use store::{MockStore, Store};
pub use token::{TokenPair, TokenService};
pub use webauthn::WebauthnService;
