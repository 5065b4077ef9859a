//! Daily AI news collector: binary entrypoint.
//! Boots the Axum HTTP server with the read API, the collection trigger,
//! `/metrics`, and the daily scheduler.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use ai_news_collector::{
    api::{self, AppState},
    collector_from_config,
    config::CollectorConfig,
    ingest::scheduler,
    job::JobTracker,
    metrics::Metrics,
    store::SqliteStore,
};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    ai_news_collector::init_tracing();

    let cfg = CollectorConfig::load().context("loading collector config")?;
    tracing::info!(db = %cfg.db_path, meta = %cfg.meta_path, "config loaded");

    let store = Arc::new(SqliteStore::open(&cfg.db_path).await?);
    let collector = collector_from_config(&cfg, store.clone())?;
    let tracker = Arc::new(JobTracker::new(Arc::new(collector), &cfg.meta_path));

    match cfg.schedule()? {
        Some(at) => {
            scheduler::spawn_daily(tracker.clone(), at);
        }
        None => tracing::info!("daily schedule disabled"),
    }

    let mut router = api::router(AppState { store, tracker });
    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    Ok(router.into())
}
