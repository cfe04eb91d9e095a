// Flowhook API server
// Decision: In-memory storage when DATABASE_URL is unset (dev mode)
// Decision: The timeout sweeper runs in-process unless SWEEPER_ENABLED=false

mod api;
mod app;
mod auth;
mod config;
mod error;
mod openapi;
mod services;

use anyhow::{Context, Result};
use flowhook_core::{CoordinatorConfig, ProviderRegistry};
use flowhook_storage::StorageBackend;
use flowhook_worker::{SweeperConfig, TimeoutSweeper};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{build_app, AppContext};
use crate::auth::{AuthConfig, AuthState};
use crate::config::ApiConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "flowhook_api=debug,flowhook_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("flowhook-api starting...");

    let config = ApiConfig::from_env();

    let auth_config = AuthConfig::from_env();
    tracing::info!(
        mode = ?auth_config.mode,
        api_keys = auth_config.api_key_count(),
        "Authentication configured"
    );

    let storage = StorageBackend::from_env()
        .await
        .context("Failed to initialize storage")?;

    let mut providers = ProviderRegistry::new();
    flowhook_n8n::register_provider(&mut providers);
    tracing::info!(providers = ?providers.providers(), "Providers registered");

    let coordinator_config = CoordinatorConfig::from_env();
    tracing::info!(
        public_base_url = %coordinator_config.public_base_url,
        "Callback URLs configured"
    );

    let ctx = AppContext::new(
        storage,
        providers,
        coordinator_config,
        AuthState::new(auth_config),
    );

    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }
    let app = build_app(&ctx, &config.api_prefix);

    let sweeper = if config.sweeper_enabled {
        Some(TimeoutSweeper::new(ctx.coordinator.clone(), SweeperConfig::from_env()).spawn())
    } else {
        tracing::info!("In-process timeout sweeper disabled");
        None
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }
    tracing::info!("flowhook-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
