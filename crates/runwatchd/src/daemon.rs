//! Serve mode: wires the store, launchers, monitor, and API together.
//!
//! Startup order:
//! 1. Open the run store
//! 2. Resolve every deployment's launcher (fails fast on bad config)
//! 3. Start the monitor on the deployments marked `watch`
//! 4. Serve the REST API until Ctrl-C, then stop the monitor

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use runwatch_core::RunwatchConfig;
use runwatch_health::{StoreSessionFactory, start_monitor, stop_monitor};
use runwatch_state::RunStore;

/// Load config from `path` (or defaults) and apply CLI overrides.
pub fn load_config(
    path: Option<&Path>,
    port: Option<u16>,
    interval: Option<f64>,
) -> anyhow::Result<RunwatchConfig> {
    let mut config = match path {
        Some(path) => RunwatchConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RunwatchConfig::default(),
    };

    if let Some(port) = port {
        config.api.port = port;
    }
    if let Some(interval) = interval {
        config.monitor.interval_seconds = interval;
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &RunwatchConfig) -> anyhow::Result<RunStore> {
    match &config.store.path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let store = RunStore::open(path)?;
            info!(path = ?path, "run store opened");
            Ok(store)
        }
        None => {
            let store = RunStore::open_in_memory()?;
            info!("run store opened in memory");
            Ok(store)
        }
    }
}

/// Run the daemon until Ctrl-C.
pub async fn run_serve(config: RunwatchConfig) -> anyhow::Result<()> {
    info!("runwatch daemon starting");

    // ── Store + launchers ──────────────────────────────────────

    let store = open_store(&config)?;
    let factory = StoreSessionFactory::from_config(store.clone(), &config)?;
    info!(deployments = config.deployments.len(), "launchers resolved");

    // ── Monitor ────────────────────────────────────────────────

    let watched = config.watched_deployments();
    info!(watched = ?watched, interval_seconds = config.monitor.interval_seconds, "starting run worker monitor");
    let monitor = Arc::new(start_monitor(factory, watched, config.interval()));

    // ── API server ─────────────────────────────────────────────

    let configured = config.deployments.iter().map(|d| d.name.clone());
    let router = runwatch_api::build_router(Arc::clone(&monitor), store, configured);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await;

    // Stop the monitor even if the server failed.
    stop_monitor(&monitor).await;
    served?;

    info!("runwatch daemon stopped");
    Ok(())
}
