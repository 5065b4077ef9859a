// src/store/mod.rs
//! Persistence boundary. The pipeline only needs the existing-URL set and a
//! per-item insert; the read side lives on the concrete stores.

pub mod memory;
pub mod sqlite;

pub use memory::{ExportFile, MemoryStore};
pub use sqlite::SqliteStore;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::ingest::providers::bilibili::strip_thumbnail_suffix;
use crate::ingest::types::{NewsItem, PersistedNewsItem, Source};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate source_url: {0}")]
    Duplicate(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Every `source_url` already persisted.
    async fn existing_source_urls(&self) -> anyhow::Result<HashSet<String>>;
    /// Persist one item, returning its id. Duplicates are an error, not an upsert.
    async fn insert(&self, item: &NewsItem) -> Result<i64, StoreError>;
}

/// A page of the read API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPage {
    pub items: Vec<PersistedNewsItem>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl NewsPage {
    pub(crate) fn new(items: Vec<PersistedNewsItem>, total: u64, page: u32, limit: u32) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Read-time cleanup; never written back.
pub fn normalize_for_display(mut p: PersistedNewsItem) -> PersistedNewsItem {
    if p.item.source == Source::Bilibili {
        if let Some(thumb) = p.item.thumbnail_url.as_mut() {
            if thumb.contains('@') {
                *thumb = strip_thumbnail_suffix(thumb).to_string();
            }
        }
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::MediaType;
    use chrono::Utc;

    fn persisted(source: Source, thumb: &str) -> PersistedNewsItem {
        PersistedNewsItem {
            id: 1,
            item: NewsItem {
                title: "t".into(),
                content: String::new(),
                summary: String::new(),
                source,
                source_url: "u".into(),
                embed_url: None,
                media_type: MediaType::Video,
                published_at: Utc::now(),
                thumbnail_url: Some(thumb.into()),
                extras: Default::default(),
            },
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn bilibili_thumbnail_suffix_is_stripped_on_read() {
        let p = normalize_for_display(persisted(Source::Bilibili, "https://i0.hdslb.com/a.jpg@100w"));
        assert_eq!(p.item.thumbnail_url.as_deref(), Some("https://i0.hdslb.com/a.jpg"));
        let y = normalize_for_display(persisted(Source::Youtube, "https://i.ytimg.com/a@b.jpg"));
        assert_eq!(y.item.thumbnail_url.as_deref(), Some("https://i.ytimg.com/a@b.jpg"));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(NewsPage::new(vec![], 21, 1, 10).total_pages, 3);
        assert_eq!(NewsPage::new(vec![], 0, 1, 10).total_pages, 0);
    }
}
