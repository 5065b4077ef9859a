// src/pipeline.rs
//! One collection run: fetch (sources in fixed order) -> dedupe -> pick ->
//! enrich + persist one item at a time. Progress is reported through a callback
//! so the job tracker can expose it without the pipeline knowing about jobs.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use tracing::{info, warn};

use crate::enrich::Summarizer;
use crate::ingest::dedupe_and_select;
use crate::ingest::ensure_metrics_described;
use crate::ingest::types::{FetchOptions, MediaType, NewsItem, Source, SourceProvider};
use crate::job::Stage;
use crate::store::{NewsStore, StoreError};

pub const DEFAULT_TARGET_COUNT: usize = 10;

const PERCENT_DEDUPE: u8 = 55;
const PERCENT_PICKED: u8 = 60;
const PERCENT_ITEMS_BUDGET: usize = 40;

/// Progress update pushed by the pipeline. Fields not relevant to a stage stay 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub message: String,
    pub percent: u8,
    pub total: usize,
    pub done: usize,
    pub count: usize,
}

impl Progress {
    fn at(stage: Stage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            percent,
            total: 0,
            done: 0,
            count: 0,
        }
    }
}

pub type ProgressFn<'a> = &'a (dyn Fn(Progress) + Send + Sync);

/// Seam between the job tracker and the pipeline.
#[async_trait]
pub trait CollectionRun: Send + Sync {
    /// Returns the number of items persisted.
    async fn run(&self, progress: ProgressFn<'_>) -> Result<usize>;
}

fn fetch_percent(source: Source) -> u8 {
    match source {
        Source::Bilibili => 10,
        Source::Youtube => 30,
        Source::Github => 40,
    }
}

fn item_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PERCENT_PICKED + PERCENT_ITEMS_BUDGET as u8;
    }
    let extra = done.min(total) * PERCENT_ITEMS_BUDGET / total;
    PERCENT_PICKED + extra as u8
}

/// One configured source.
pub struct SourceSlot {
    pub provider: Arc<dyn SourceProvider>,
    pub query: String,
    pub limit: usize,
    pub opts: FetchOptions,
    pub enabled: bool,
}

impl SourceSlot {
    pub fn new(provider: Arc<dyn SourceProvider>, query: impl Into<String>, limit: usize) -> Self {
        Self {
            provider,
            query: query.into(),
            limit,
            opts: FetchOptions::default(),
            enabled: true,
        }
    }

    pub fn with_options(mut self, opts: FetchOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn enabled(mut self, on: bool) -> Self {
        self.enabled = on;
        self
    }
}

pub struct Collector {
    sources: Vec<SourceSlot>,
    store: Arc<dyn NewsStore>,
    summarizer: Summarizer,
    target_count: usize,
}

impl Collector {
    /// Sources are run in `Source::ALL` order regardless of the order given here.
    pub fn new(mut sources: Vec<SourceSlot>, store: Arc<dyn NewsStore>, summarizer: Summarizer) -> Self {
        sources.sort_by_key(|s| {
            let src = s.provider.source();
            Source::ALL.iter().position(|x| *x == src).unwrap_or(usize::MAX)
        });
        Self {
            sources,
            store,
            summarizer,
            target_count: DEFAULT_TARGET_COUNT,
        }
    }

    pub fn with_target_count(mut self, n: usize) -> Self {
        self.target_count = n;
        self
    }

    async fn fetch_all(&self, progress: ProgressFn<'_>) -> Vec<Vec<NewsItem>> {
        let mut lists = Vec::with_capacity(self.sources.len());
        for slot in self.sources.iter().filter(|s| s.enabled) {
            let source = slot.provider.source();
            progress(Progress::at(
                Stage::Fetch(source),
                fetch_percent(source),
                format!("fetching {source}"),
            ));
            let items = slot.provider.fetch(&slot.query, slot.limit, &slot.opts).await;
            counter!("collect_provider_items_total", "source" => source.as_str())
                .increment(items.len() as u64);
            info!(source = source.as_str(), items = items.len(), "source fetched");
            lists.push(items);
        }
        lists
    }

    async fn enrich(&self, mut item: NewsItem) -> NewsItem {
        match item.media_type {
            MediaType::Video => {
                item.summary = self.summarizer.summarize(&item.title, &item.content).await;
            }
            MediaType::Article => {
                if item.summary.trim().is_empty() {
                    item.summary = item.content.clone();
                }
            }
        }
        item
    }
}

#[async_trait]
impl CollectionRun for Collector {
    async fn run(&self, progress: ProgressFn<'_>) -> Result<usize> {
        ensure_metrics_described();
        progress(Progress::at(Stage::Running, 0, "collection started"));

        let lists = self.fetch_all(progress).await;

        progress(Progress::at(Stage::Dedupe, PERCENT_DEDUPE, "deduplicating"));
        let existing = self
            .store
            .existing_source_urls()
            .await
            .context("loading existing source urls")?;
        let picked = dedupe_and_select(lists, &existing, self.target_count);
        let total = picked.len();

        progress(Progress {
            total,
            ..Progress::at(Stage::Picked, PERCENT_PICKED, format!("picked {total} items"))
        });

        let mut inserted = 0usize;
        for (i, item) in picked.into_iter().enumerate() {
            if item.media_type == MediaType::Video {
                progress(Progress {
                    total,
                    done: i,
                    count: inserted,
                    ..Progress::at(
                        Stage::Summarize,
                        item_percent(i, total),
                        format!("summarizing {}/{total}", i + 1),
                    )
                });
            }

            let item = self.enrich(item).await;
            match self.store.insert(&item).await {
                Ok(_) => {
                    inserted += 1;
                    counter!("collect_inserted_total").increment(1);
                }
                Err(StoreError::Duplicate(url)) => {
                    counter!("collect_insert_errors_total").increment(1);
                    warn!(source_url = %url, "skipping already stored item");
                }
                Err(e) => {
                    counter!("collect_insert_errors_total").increment(1);
                    warn!(source_url = %item.source_url, error = %e, "insert failed; skipping");
                }
            }

            progress(Progress {
                total,
                done: i + 1,
                count: inserted,
                ..Progress::at(
                    Stage::Save,
                    item_percent(i + 1, total),
                    format!("saved {}/{total}", i + 1),
                )
            });
        }

        progress(Progress {
            total,
            done: total,
            count: inserted,
            ..Progress::at(Stage::Done, 100, format!("collected {inserted} items"))
        });
        info!(inserted, total, "collection finished");
        Ok(inserted)
    }
}
