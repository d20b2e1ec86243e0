//! StaticPage controller
//!
//! Converges StaticPage resources into a content ConfigMap and a serving
//! Pod, against an in-process store seeded from manifests on disk.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use staticpage_controller::{config, manifest, Controller, MemoryStore};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to STATICPAGE_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting StaticPage controller");
    info!(
        workers = config.workers,
        resync_interval_secs = config.resync_interval.as_secs(),
        namespace = %config.namespace,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());

    if let Some(dir) = &config.manifest_dir {
        let pages = match manifest::load_dir(dir, &config.namespace) {
            Ok(pages) => pages,
            Err(e) => {
                error!(error = %e, dir = %dir.display(), "Failed to load manifests");
                return Err(e);
            }
        };
        info!(count = pages.len(), dir = %dir.display(), "Applying manifests");
        manifest::apply(store.as_ref(), pages).await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let controller = Controller::new(Arc::clone(&store), config.controller());
    let stats = controller.stats();
    let controller_handle = tokio::spawn(controller.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = Duration::from_secs(10);
    match tokio::time::timeout(shutdown_timeout, controller_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Controller task panicked"),
        Err(e) => warn!(error = %e, "Controller did not shut down in time"),
    }

    let stats = stats.snapshot();
    info!(
        converged = stats.converged,
        requeued = stats.requeued,
        retried = stats.retried,
        conflicts = stats.conflicts,
        "StaticPage controller shutdown complete"
    );
    Ok(())
}
