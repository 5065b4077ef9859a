//! One collection run without the server: dedupes against an existing JSON
//! export (if any) and writes the merged list back.
//!
//! Usage: `cargo run --bin collect_once [-- <export-path>]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use ai_news_collector::{
    collector_from_config,
    config::CollectorConfig,
    pipeline::{CollectionRun, Progress},
    store::{ExportFile, MemoryStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    ai_news_collector::init_tracing();

    let cfg = CollectorConfig::load().context("loading collector config")?;
    let out = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.export_path));

    let seed = ExportFile::load(&out)?.map(|f| f.items).unwrap_or_default();
    tracing::info!(path = %out.display(), existing = seed.len(), "loaded export");

    let store = Arc::new(MemoryStore::seeded(seed));
    let collector = collector_from_config(&cfg, store.clone())?;

    let report = |p: Progress| {
        tracing::info!(stage = %p.stage, percent = p.percent, done = p.done, total = p.total, "{}", p.message);
    };
    let inserted = collector.run(&report).await?;

    let export = ExportFile {
        generated_at: Utc::now(),
        items: store.all(),
    };
    export.save(&out)?;
    println!("collected {inserted} new items; {} total in {}", export.items.len(), out.display());
    Ok(())
}
