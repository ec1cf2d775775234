//! Workflow service binary.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use graphmill::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use graphmill::config::ServiceConfig;
use graphmill::executor::Executor;
use graphmill::graphs::default_registry;
use graphmill::server::{router, ServiceState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env();
    let registry = Arc::new(default_registry());

    let stats = registry.stats();
    tracing::info!(
        workflows = stats.total_workflows,
        industries = stats.available_industries.len(),
        "workflow service starting"
    );
    for industry in &stats.available_industries {
        tracing::info!(industry = %industry, count = stats.by_industry.get(industry).copied().unwrap_or(0), "registered industry");
    }

    let store = build_store(&config).await;
    let executor = Arc::new(Executor::new(registry, store));
    let state = Arc::new(ServiceState {
        executor,
        config: config.clone(),
    });

    let listener = TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %config.bind_addr(), "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("workflow service shutting down");
    Ok(())
}

async fn build_store(config: &ServiceConfig) -> Arc<dyn CheckpointStore> {
    #[cfg(feature = "redis-store")]
    if let Some(url) = &config.checkpoint_url {
        match graphmill::checkpoint::RedisCheckpointStore::connect(url, config.store_config()).await
        {
            Ok(store) => return Arc::new(store),
            Err(err) => {
                tracing::error!(error = %err, "redis checkpoint store unavailable; using in-memory store");
            }
        }
    }
    #[cfg(not(feature = "redis-store"))]
    if config.checkpoint_url.is_some() {
        tracing::warn!("CHECKPOINT_URL set but the redis-store feature is disabled; using in-memory store");
    }
    Arc::new(MemoryCheckpointStore::new(config.store_config()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
    }
}
