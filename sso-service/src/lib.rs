pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    handler::Handler,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    make_request_span, request_id_middleware, security_headers_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{SsoConfig, SwaggerMode};
use crate::middleware::{auth_middleware, device_middleware, device_rights_middleware};
use crate::services::{
    AuthService, Cache, CaptchaVerifier, CodeService, EmailProvider, FederationManager,
    JwtService, KeyStore, RightsEvaluator, Store, TokenService, WebauthnService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::well_known::jwks,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::parse,
        handlers::auth::session::logout,
        handlers::auth::email::send_code,
        handlers::auth::email::check_code,
        handlers::auth::recovery::send_code,
        handlers::auth::recovery::check_code,
        handlers::auth::webauthn::register_start,
        handlers::auth::webauthn::register_finish,
        handlers::auth::webauthn::login_start,
        handlers::auth::webauthn::login_finish,
        handlers::auth::federation::oauth2_start,
        handlers::auth::federation::oauth2_callback,
        handlers::auth::federation::oidc_start,
        handlers::auth::federation::oidc_callback,
        handlers::device::list_devices,
        handlers::device::get_device,
        handlers::device::rename_device,
        handlers::device::delete_device,
        handlers::user::user_exists,
        handlers::user::get_me,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::PasswordLoginRequest,
            dtos::auth::CodeCheckRequest,
            dtos::auth::RecoverySendRequest,
            dtos::auth::RecoveryCheckRequest,
            dtos::auth::ParseTokenRequest,
            dtos::auth::WebauthnLoginStartRequest,
            dtos::auth::StatusResponse,
            dtos::device::RenameDeviceRequest,
            dtos::user::UserExistsRequest,
            dtos::user::UserExistsResponse,
            services::AccessTokenClaims,
            services::JsonWebKey,
            services::JsonWebKeySet,
            models::Device,
            models::Role,
            models::Permission,
            models::UserResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Password, email-code and token endpoints"),
        (name = "Recovery", description = "Password recovery by emailed code"),
        (name = "WebAuthn", description = "Passkey registration and login"),
        (name = "Federation", description = "OAuth2 and OpenID Connect login"),
        (name = "Device", description = "Devices bound to sessions"),
        (name = "User", description = "User lookups"),
        (name = "Well-Known", description = "Public service metadata"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Services bundle shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SsoConfig>,
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub keys: Arc<KeyStore>,
    pub auth: AuthService,
    pub rights: RightsEvaluator,
}

impl AppState {
    /// Wire the coordinator and its state machines over the given collaborators.
    pub fn new(
        config: SsoConfig,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        captcha: Arc<dyn CaptchaVerifier>,
        email: Arc<dyn EmailProvider>,
        keys: Arc<KeyStore>,
    ) -> Result<Self, anyhow::Error> {
        let federation =
            FederationManager::from_config(&config.federation, cache.clone(), store.clone())?;
        Self::with_federation(config, store, cache, captcha, email, keys, federation)
    }

    /// Same as `new` with an already populated provider registry.
    pub fn with_federation(
        config: SsoConfig,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        captcha: Arc<dyn CaptchaVerifier>,
        email: Arc<dyn EmailProvider>,
        keys: Arc<KeyStore>,
        federation: FederationManager,
    ) -> Result<Self, anyhow::Error> {
        let jwt = JwtService::new(
            keys.clone(),
            config.jwt.issuer.clone(),
            config.access_token_ttl_seconds(),
            config.refresh_token_ttl_seconds(),
        );
        let tokens = TokenService::new(store.clone(), jwt);
        let codes = CodeService::new(cache.clone(), config.codes.clone());
        let webauthn = WebauthnService::new(&config.webauthn, store.clone(), cache.clone())?;

        let auth = AuthService::new(
            store.clone(),
            captcha,
            email,
            codes,
            tokens,
            webauthn,
            Arc::new(federation),
        );

        Ok(Self {
            config: Arc::new(config),
            rights: RightsEvaluator::new(store.clone()),
            store,
            cache,
            keys,
            auth,
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-user-email"),
            HeaderName::from_static("x-request-id"),
        ])
}

pub fn build_router(state: AppState) -> Router {
    let rights = from_fn_with_state(state.clone(), device_rights_middleware);

    // Routes that bind a session to the caller's device.
    let device_routes = Router::new()
        .route("/auth/jwt", post(handlers::auth::session::login))
        .route("/auth/jwt/refresh", post(handlers::auth::session::refresh))
        .route("/auth/email/send", post(handlers::auth::email::send_code))
        .route("/auth/email/check", post(handlers::auth::email::check_code))
        .route(
            "/auth/webauthn/login/finish",
            post(handlers::auth::webauthn::login_finish),
        )
        .route(
            "/auth/oauth2/:provider/callback",
            get(handlers::auth::federation::oauth2_callback),
        )
        .route(
            "/auth/oidc/:provider/callback",
            get(handlers::auth::federation::oidc_callback)
                .post(handlers::auth::federation::oidc_callback_form),
        )
        .route_layer(from_fn_with_state(state.clone(), device_middleware));

    let bearer_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::session::logout))
        .route(
            "/auth/webauthn/register/start",
            post(handlers::auth::webauthn::register_start),
        )
        .route(
            "/auth/webauthn/register/finish",
            post(handlers::auth::webauthn::register_finish),
        )
        .route("/users/me", get(handlers::user::get_me))
        .route("/device", get(handlers::device::list_devices))
        .route(
            "/device/:id",
            get(handlers::device::get_device)
                .put(handlers::device::rename_device.layer(rights.clone()))
                .delete(handlers::device::delete_device.layer(rights)),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/.well-known/jwks.json", get(handlers::well_known::jwks))
        .route("/auth/jwt/parse", post(handlers::auth::session::parse))
        .route(
            "/auth/recovery/send",
            post(handlers::auth::recovery::send_code),
        )
        .route(
            "/auth/recovery/check",
            post(handlers::auth::recovery::check_code),
        )
        .route(
            "/auth/webauthn/login/start",
            post(handlers::auth::webauthn::login_start),
        )
        .route(
            "/auth/oauth2/:provider/start",
            get(handlers::auth::federation::oauth2_start),
        )
        .route(
            "/auth/oidc/:provider/start",
            get(handlers::auth::federation::oidc_start),
        )
        .route("/users/exists", post(handlers::user::user_exists))
        .merge(device_routes)
        .merge(bearer_routes);

    if state.config.swagger.enabled == SwaggerMode::Public {
        app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    app.with_state(state.clone())
        .layer(TimeoutLayer::new(state.config.common.request_timeout()))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Postgres and Redis reachable"),
        (status = 500, description = "A dependency is down", body = ErrorResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Postgres health check failed");
        AppError::from(e)
    })?;

    state.cache.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Redis health check failed");
        AppError::InternalError(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": {
            "postgres": "up",
            "redis": "up"
        }
    })))
}
