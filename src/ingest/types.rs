// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream a candidate came from. Order of declaration is the fixed fetch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Video platform (search API).
    Bilibili,
    /// Video-search engine (HTML results page).
    Youtube,
    /// Code-hosting trending feed (repository search API).
    Github,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Bilibili, Source::Youtube, Source::Github];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Bilibili => "bilibili",
            Source::Youtube => "youtube",
            Source::Github => "github",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|src| src.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Article,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Article => "article",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("video") {
            MediaType::Video
        } else {
            MediaType::Article
        }
    }
}

/// A normalized candidate, not yet deduplicated or persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub summary: String,
    pub source: Source,
    /// Canonical external URL; identity key for deduplication.
    pub source_url: String,
    pub embed_url: Option<String>,
    pub media_type: MediaType,
    pub published_at: DateTime<Utc>,
    #[serde(rename = "thumbnail")]
    pub thumbnail_url: Option<String>,
    /// Source-specific extras (author, duration, stars, original title).
    /// Carried opaquely; nothing downstream depends on them.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl NewsItem {
    /// Text the keyword policy looks at.
    pub fn policy_text(&self) -> String {
        if self.content.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedNewsItem {
    pub id: i64,
    #[serde(flatten)]
    pub item: NewsItem,
    pub collected_at: DateTime<Utc>,
}

/// Per-call knobs a provider may honour.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Recency window in days (video search only).
    pub max_age_days: Option<u32>,
}

/// One external source. Never fails past its own boundary: errors are logged
/// and whatever was accumulated so far (possibly nothing) is returned.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch(&self, query: &str, limit: usize, opts: &FetchOptions) -> Vec<NewsItem>;
    fn source(&self) -> Source;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trips_through_str() {
        for s in Source::ALL {
            assert_eq!(Source::parse(s.as_str()), Some(s));
        }
        assert_eq!(Source::parse(" GitHub "), Some(Source::Github));
        assert_eq!(Source::parse("twitter"), None);
    }

    #[test]
    fn policy_text_joins_title_and_content() {
        let item = NewsItem {
            title: "Qwen 3".into(),
            content: "new weights".into(),
            summary: String::new(),
            source: Source::Github,
            source_url: "https://github.com/x/y".into(),
            embed_url: None,
            media_type: MediaType::Article,
            published_at: Utc::now(),
            thumbnail_url: None,
            extras: Default::default(),
        };
        assert_eq!(item.policy_text(), "Qwen 3 new weights");
    }
}
