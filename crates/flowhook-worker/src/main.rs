use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowhook_core::{CoordinatorConfig, ProviderRegistry, RunCoordinator};
use flowhook_storage::StorageBackend;
use flowhook_worker::{SweeperConfig, TimeoutSweeper};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowhook_worker=debug,flowhook_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("flowhook-worker starting...");

    let storage = StorageBackend::from_env()
        .await
        .context("Failed to initialize storage")?;
    if storage.is_dev_mode() {
        // Only runs created by this process would be visible
        tracing::warn!("Standalone worker without DATABASE_URL has no shared runs to sweep");
    }
    let storage = Arc::new(storage);

    let mut providers = ProviderRegistry::new();
    flowhook_n8n::register_provider(&mut providers);

    let coordinator = Arc::new(RunCoordinator::new(
        storage.clone(),
        storage.clone(),
        storage,
        Arc::new(providers),
        CoordinatorConfig::from_env(),
    ));

    let config = SweeperConfig::from_env();
    tracing::info!(
        max_run_duration_secs = config.max_run_duration.as_secs(),
        interval_secs = config.interval.as_secs(),
        batch_size = config.batch_size,
        "Sweeper configured"
    );
    let sweeper = TimeoutSweeper::new(coordinator, config).spawn();

    tracing::info!("Worker ready, waiting for shutdown signal...");
    tokio::signal::ctrl_c().await?;

    sweeper.shutdown().await;
    tracing::info!("Worker shutdown complete");
    Ok(())
}
