use service_core::error::AppError;
use service_core::observability::init_tracing;
use sso_service::{
    build_router,
    config::SsoConfig,
    db,
    services::{Database, EmailService, KeyStore, RecaptchaVerifier, RedisService},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on bad configuration
    let config = SsoConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting SSO service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(Database::new(pool));

    let cache = Arc::new(RedisService::new(&config.redis).await?);
    tracing::info!("Redis connection established");

    let email = Arc::new(EmailService::new(&config.smtp)?);
    let captcha = Arc::new(RecaptchaVerifier::new(&config.captcha)?);

    // Retired keys keep verifying until every token they signed has expired.
    let retention = config.refresh_token_ttl_seconds() + config.access_token_ttl_seconds();
    let keys = Arc::new(KeyStore::from_file(
        &config.jwt.private_key_path,
        config.jwt.key_id.as_deref(),
        retention,
    )?);
    if config.jwt.key_rotation_hours > 0 {
        spawn_key_rotation(
            keys.clone(),
            Duration::from_secs(config.jwt.key_rotation_hours * 3600),
        );
    }

    let port = config.common.port;
    let state = AppState::new(config, store, cache, captcha, email, keys)?;
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

fn spawn_key_rotation(keys: Arc<KeyStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick fires immediately; the configured key is fresh.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = keys.rotate().await {
                tracing::error!(error = %e, "Signing key rotation failed");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
