// src/store/memory.rs
//! Process-local store. Backs the one-shot export binary and the pipeline tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NewsStore, StoreError};
use crate::ingest::types::{NewsItem, PersistedNewsItem};

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<PersistedNewsItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously exported rows; ids continue after the highest seen.
    pub fn seeded(rows: Vec<PersistedNewsItem>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Snapshot, newest first.
    pub fn all(&self) -> Vec<PersistedNewsItem> {
        let mut rows = match self.rows.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        rows.sort_by(|a, b| b.collected_at.cmp(&a.collected_at).then(b.id.cmp(&a.id)));
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Static JSON export: `{ "generated_at": ..., "items": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFile {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<PersistedNewsItem>,
}

impl ExportFile {
    /// `Ok(None)` when the file does not exist yet.
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let file = serde_json::from_str(&raw)
            .with_context(|| format!("parsing export {}", path.display()))?;
        Ok(Some(file))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl NewsStore for MemoryStore {
    async fn existing_source_urls(&self) -> anyhow::Result<HashSet<String>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(rows.iter().map(|r| r.item.source_url.clone()).collect())
    }

    async fn insert(&self, item: &NewsItem) -> Result<i64, StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))?;
        if rows.iter().any(|r| r.item.source_url == item.source_url) {
            return Err(StoreError::Duplicate(item.source_url.clone()));
        }
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        rows.push(PersistedNewsItem {
            id,
            item: item.clone(),
            collected_at: Utc::now(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{MediaType, Source};

    fn item(url: &str) -> NewsItem {
        NewsItem {
            title: "t".into(),
            content: String::new(),
            summary: String::new(),
            source: Source::Github,
            source_url: url.into(),
            embed_url: None,
            media_type: MediaType::Article,
            published_at: Utc::now(),
            thumbnail_url: None,
            extras: Default::default(),
        }
    }

    #[tokio::test]
    async fn ids_continue_after_seed_and_duplicates_rejected() {
        let seed = PersistedNewsItem {
            id: 7,
            item: item("https://x"),
            collected_at: Utc::now(),
        };
        let store = MemoryStore::seeded(vec![seed]);
        assert_eq!(store.insert(&item("https://y")).await.unwrap(), 8);
        assert!(matches!(
            store.insert(&item("https://x")).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.len(), 2);
        assert_eq!(store.existing_source_urls().await.unwrap().len(), 2);
    }

    #[test]
    fn export_file_missing_then_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("news.json");
        assert!(ExportFile::load(&path).unwrap().is_none());

        let export = ExportFile {
            generated_at: Utc::now(),
            items: vec![PersistedNewsItem {
                id: 1,
                item: item("https://z"),
                collected_at: Utc::now(),
            }],
        };
        export.save(&path).unwrap();
        let back = ExportFile::load(&path).unwrap().unwrap();
        assert_eq!(back.items, export.items);
    }
}
