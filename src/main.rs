//! Source Sentinel - Binary Entrypoint
//! Boots the Axum HTTP server, the scheduled-run loop and the daily rollup.

use std::path::PathBuf;
use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use source_sentinel::catalog::{default_catalog_path, DEFAULT_CATALOG_TOML};
use source_sentinel::ingest::scheduler::{spawn_daily_summary, spawn_scheduler};
use source_sentinel::metrics::Metrics;
use source_sentinel::{
    AdapterRegistry, AppState, CatalogSource, JsonlStore, MonitorConfig, NotifierMux,
    Orchestrator,
};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - SENTINEL_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("SENTINEL_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ingest=info,remediation=info,notify=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Explicit config path wins; otherwise the env/fallback chain. A missing
/// catalog is not fatal at boot: every run then fails with a clear error.
fn catalog_source(cfg: &MonitorConfig) -> CatalogSource {
    if let Some(p) = &cfg.catalog_path {
        return CatalogSource::File(p.clone());
    }
    match default_catalog_path() {
        Ok(p) => CatalogSource::File(p),
        Err(e) => {
            tracing::warn!(error = %e, "source catalog not found; runs will fail until it exists");
            CatalogSource::File(PathBuf::from(DEFAULT_CATALOG_TOML))
        }
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let cfg = MonitorConfig::load_default()?;
    let metrics = Metrics::init()?;

    let store = Arc::new(JsonlStore::open(&cfg.data_dir).await?);
    let notifier = NotifierMux::from_env();

    let orchestrator = Arc::new(
        Orchestrator::new(
            catalog_source(&cfg),
            AdapterRegistry::with_defaults(),
            store.clone(),
            store,
            cfg.clone(),
        )
        .with_notifier(notifier.clone()),
    );

    // Background jobs live as long as the process; the sender is leaked so
    // the receivers never observe a drop.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    if cfg.schedule_interval_secs > 0 {
        spawn_scheduler(orchestrator.clone(), cfg.clone(), shutdown_rx.clone());
    }
    spawn_daily_summary(orchestrator.clone(), notifier, shutdown_rx);
    std::mem::forget(shutdown_tx);

    let router = source_sentinel::router(AppState::new(orchestrator)).merge(metrics.router());

    Ok(router.into())
}
