// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod enrich;
pub mod ingest;
pub mod job;
pub mod metrics;
pub mod pipeline;
pub mod store;

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{CollectorConfig, SourceSettings};
use crate::enrich::{MyMemoryService, Summarizer, Translator};
use crate::ingest::providers::{bilibili::BilibiliProvider, github::GithubProvider, youtube::YoutubeProvider};
use crate::ingest::types::{FetchOptions, SourceProvider};
use crate::pipeline::{Collector, SourceSlot};
use crate::store::NewsStore;

pub use crate::api::router;

/// Install a fmt subscriber honoring `RUST_LOG`. A subscriber installed by the
/// runtime wins; this is then a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ai_news_collector=info,warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

fn slot(provider: Arc<dyn SourceProvider>, s: &SourceSettings) -> SourceSlot {
    SourceSlot::new(provider, s.query.clone(), s.limit)
        .with_options(FetchOptions {
            max_age_days: s.max_age_days,
        })
        .enabled(s.enabled)
}

/// Wire the three adapters, the enricher and `store` into a pipeline.
pub fn collector_from_config(cfg: &CollectorConfig, store: Arc<dyn NewsStore>) -> anyhow::Result<Collector> {
    let translator = Arc::new(Translator::new(Arc::new(MyMemoryService::new()?)));
    let summarizer = Summarizer::from_settings(
        &cfg.summarizer.base_url,
        cfg.summarizer.api_key.as_deref(),
    )?;

    let sources = vec![
        slot(Arc::new(BilibiliProvider::new()?), &cfg.bilibili),
        slot(Arc::new(YoutubeProvider::new(Some(translator))?), &cfg.youtube),
        slot(Arc::new(GithubProvider::new(cfg.github_token.clone())?), &cfg.github),
    ];
    for s in &sources {
        tracing::info!(
            source = s.provider.source().as_str(),
            enabled = s.enabled,
            limit = s.limit,
            "source configured"
        );
    }

    Ok(Collector::new(sources, store, summarizer).with_target_count(cfg.target_count))
}
