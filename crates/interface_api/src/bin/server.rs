//! Home Care Backend - API Server Binary
//!
//! # Usage
//!
//! ```bash
//! API_DATABASE_URL=postgres://... API_STRIPE_SECRET_KEY=sk_test_... cargo run --bin homecare-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` / `API_PORT` - Bind address (default: 0.0.0.0:8080)
//! * `API_JWT_SECRET` - Secret the portal's tokens are signed with
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `API_LOG_JSON` - `true` for JSON log lines
//! * `API_STRIPE_SECRET_KEY`, `API_STRIPE_BASE_URL` - Payment gateway
//! * `API_EMAIL_ENDPOINT`, `API_EMAIL_API_KEY`, `API_EMAIL_FROM` - Email relay
//! * `API_AGENCY_NAME`, `API_AGENCY_TIMEZONE` - Shown in emails

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_billing::adapters::{HttpEmailNotifier, StripeGateway};
use infra_db::{
    create_pool, run_migrations, DatabaseConfig, PostgresBillingStore, PostgresStaffDirectory,
    PostgresVisitNoteStore,
};
use interface_api::{config::ApiConfig, create_router, Adapters, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid API_* configuration")?;
    config
        .ensure_jwt_secret()
        .context("refusing to start without a token signing secret")?;
    init_tracing(&config.log_level, config.log_json);

    tracing::info!(
        host = %config.host,
        port = config.port,
        agency = %config.agency_name,
        timezone = %config.agency_timezone,
        "Starting home care API server"
    );

    if config.stripe_secret_key.is_empty() {
        tracing::warn!("API_STRIPE_SECRET_KEY is not set; every charge will be rejected");
    }

    let pool = create_pool(
        DatabaseConfig::new(config.database_url.clone())
            .max_connections(config.database_max_connections),
    )
    .await
    .context("failed to connect to database")?;
    run_migrations(&pool).await.context("failed to run migrations")?;

    let adapters = Adapters {
        billing_store: Arc::new(PostgresBillingStore::new(pool.clone())),
        gateway: Arc::new(StripeGateway::new(config.stripe()).context("invalid Stripe configuration")?),
        notifier: Arc::new(
            HttpEmailNotifier::new(config.email_relay()).context("invalid email relay configuration")?,
        ),
        staff: Arc::new(PostgresStaffDirectory::new(pool.clone())),
        visit_notes: Arc::new(PostgresVisitNoteStore::new(pool)),
    };

    let addr: SocketAddr = config.server_addr().parse().context("invalid bind address")?;
    let app = create_router(AppState::new(config, adapters));

    tracing::info!(%addr, "Server listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Installs the global subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Waits for Ctrl+C or SIGTERM so in-flight requests can finish
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
