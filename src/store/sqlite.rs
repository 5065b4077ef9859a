// src/store/sqlite.rs
use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use super::{normalize_for_display, NewsPage, NewsStore, StoreError};
use crate::ingest::types::{MediaType, NewsItem, PersistedNewsItem, Source};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS news (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT,
    summary TEXT,
    source TEXT NOT NULL,
    source_url TEXT NOT NULL UNIQUE,
    embed_url TEXT,
    media_type TEXT NOT NULL DEFAULT 'article',
    published_at TEXT,
    collected_at TEXT NOT NULL,
    thumbnail TEXT,
    extras TEXT
);

CREATE INDEX IF NOT EXISTS idx_news_source ON news(source);
CREATE INDEX IF NOT EXISTS idx_news_collected_at ON news(collected_at);
"#;

const COLUMNS: &str = "id, title, content, summary, source, source_url, embed_url, media_type, \
                       published_at, collected_at, thumbnail, extras";

pub struct SqliteStore {
    conn: Connection,
}

fn ts(dt: &DateTime<Utc>) -> String {
    // Fixed-width UTC so lexical order == chronological order.
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
}

fn news_from_row(row: &Row) -> rusqlite::Result<PersistedNewsItem> {
    let source: String = row.get(4)?;
    let source = Source::parse(&source).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown source {source:?}").into(),
        )
    })?;
    let media_type: String = row.get(7)?;
    let published_at: Option<String> = row.get(8)?;
    let collected_at: String = row.get(9)?;
    let extras: Option<String> = row.get(11)?;
    let collected_at = parse_ts(&collected_at).unwrap_or_else(Utc::now);

    Ok(PersistedNewsItem {
        id: row.get(0)?,
        item: NewsItem {
            title: row.get(1)?,
            content: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            summary: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            source,
            source_url: row.get(5)?,
            embed_url: row.get(6)?,
            media_type: MediaType::parse(&media_type),
            published_at: published_at
                .as_deref()
                .and_then(parse_ts)
                .unwrap_or(collected_at),
            thumbnail_url: row.get(10)?,
            extras: extras
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
        },
        collected_at,
    })
}

fn is_unique_violation(e: &tokio_rusqlite::Error) -> bool {
    match e {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(code, _)) => {
            code.code == rusqlite::ErrorCode::ConstraintViolation
        }
        _ => false,
    }
}

impl SqliteStore {
    pub async fn open(db_path: &str) -> anyhow::Result<Self> {
        if let Some(dir) = Path::new(db_path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating db dir {}", dir.display()))?;
            }
        }
        let conn = Connection::open(db_path)
            .await
            .with_context(|| format!("opening sqlite db {db_path}"))?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .context("applying schema")?;
        Ok(Self { conn })
    }

    pub async fn list(
        &self,
        page: u32,
        limit: u32,
        source: Option<Source>,
    ) -> anyhow::Result<NewsPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = i64::from(page - 1) * i64::from(limit);
        let source = source.map(|s| s.as_str().to_string());

        let (items, total) = self
            .conn
            .call(move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM news WHERE (?1 IS NULL OR source = ?1)",
                    params![source],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM news WHERE (?1 IS NULL OR source = ?1) \
                     ORDER BY collected_at DESC, id DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let items = stmt
                    .query_map(params![source, limit, offset], news_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok((items, total))
            })
            .await?;

        let items = items.into_iter().map(normalize_for_display).collect();
        Ok(NewsPage::new(items, total.max(0) as u64, page, limit))
    }

    pub async fn get(&self, id: i64) -> anyhow::Result<Option<PersistedNewsItem>> {
        let item = self
            .conn
            .call(move |conn| {
                let item = conn
                    .query_row(
                        &format!("SELECT {COLUMNS} FROM news WHERE id = ?1"),
                        params![id],
                        news_from_row,
                    )
                    .optional()?;
                Ok(item)
            })
            .await?;
        Ok(item.map(normalize_for_display))
    }

    pub async fn collected_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<PersistedNewsItem>> {
        let since = ts(&since);
        let items = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM news WHERE collected_at >= ?1 \
                     ORDER BY collected_at DESC, id DESC"
                ))?;
                let items = stmt
                    .query_map(params![since], news_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items.into_iter().map(normalize_for_display).collect())
    }

    /// Items collected since local midnight.
    pub async fn collected_today(&self) -> anyhow::Result<Vec<PersistedNewsItem>> {
        let midnight = Local::now()
            .with_time(NaiveTime::MIN)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        self.collected_since(midnight).await
    }
}

#[async_trait]
impl NewsStore for SqliteStore {
    async fn existing_source_urls(&self) -> anyhow::Result<HashSet<String>> {
        let urls = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT source_url FROM news")?;
                let urls = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<HashSet<_>, _>>()?;
                Ok(urls)
            })
            .await
            .context("querying existing source urls")?;
        Ok(urls)
    }

    async fn insert(&self, item: &NewsItem) -> Result<i64, StoreError> {
        let it = item.clone();
        let extras = (!it.extras.is_empty())
            .then(|| serde_json::to_string(&it.extras).ok())
            .flatten();
        let collected_at = ts(&Utc::now());

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO news (title, content, summary, source, source_url, embed_url, \
                     media_type, published_at, collected_at, thumbnail, extras) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        it.title,
                        it.content,
                        it.summary,
                        it.source.as_str(),
                        it.source_url,
                        it.embed_url,
                        it.media_type.as_str(),
                        ts(&it.published_at),
                        collected_at,
                        it.thumbnail_url,
                        extras,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate(item.source_url.clone())
                } else {
                    StoreError::Backend(e.to_string())
                }
            })
    }
}
