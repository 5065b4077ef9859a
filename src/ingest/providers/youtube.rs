// src/ingest/providers/youtube.rs
//! Video search via the public results page. There is no API key involved: the
//! page embeds its initial data as JSON, and we pull the few fields we need out
//! of it with regexes. Fields are aligned by position, which is how the page
//! lays them out for plain video results.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::enrich::Translator;
use crate::ingest::providers::{ensure_success, http_client, report_failure, BROWSER_UA};
use crate::ingest::publish_time::passes_recency_gate;
use crate::ingest::types::{FetchOptions, MediaType, NewsItem, Source, SourceProvider};
use crate::ingest::{admit_with_quota, strip_markup, KeywordPolicy};

const WEB_BASE: &str = "https://www.youtube.com";
const MAX_IDS: usize = 30;
pub const DEFAULT_MAX_AGE_DAYS: u32 = 2;

const FILTER_KEYWORDS: &[&str] = &[
    "tutorial", "course", "lesson", "learn", "how to", "beginner", "guide", "完整版", "教程", "课程",
];
const INCLUDE_KEYWORDS: &[&str] = &[
    "AI", "model", "GPT", "Claude", "Gemini", "Sora", "Midjourney", "Stable Diffusion", "OpenAI",
    "Anthropic", "Google", "release", "demo", "new", "update", " announcement", "launch", "Llama",
    "Mistral", "Qwen", "DeepSeek", "Runway", "Kling", "Pika", "Luma", "video generation",
    "image generation", "LLM",
];

static RE_VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""videoId":"([a-zA-Z0-9_-]{11})""#).expect("video id regex"));
static RE_TITLE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""title":\{"runs":\[(.*?)\]"#).expect("title regex"));
static RE_RUN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""text":"([^"]+)""#).expect("run text regex"));
static RE_THUMB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""thumbnail":\{"thumbnails":\[\{"url":"([^"]+)""#).expect("thumb regex")
});
static RE_PUBLISHED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""publishTimeText":\{"simpleText":"([^"]+)""#).expect("publish regex")
});

pub fn policy() -> KeywordPolicy {
    KeywordPolicy::new(FILTER_KEYWORDS, INCLUDE_KEYWORDS)
}

/// One positional row scraped from the results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVideo {
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
    pub publish_text: String,
}

fn unescape_json_fragment(s: &str) -> String {
    s.replace("\\u0026", "&")
        .replace("\\u003d", "=")
        .replace("\\/", "/")
}

/// Extract up to 30 distinct video ids and the positional title/thumbnail/time columns.
pub fn extract_videos(html: &str) -> Vec<RawVideo> {
    let mut ids: Vec<String> = Vec::new();
    for caps in RE_VIDEO_ID.captures_iter(html) {
        if ids.len() >= MAX_IDS {
            break;
        }
        let id = caps[1].to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let titles: Vec<String> = RE_TITLE_RUNS
        .captures_iter(html)
        .filter_map(|caps| {
            let joined: String = RE_RUN_TEXT
                .captures_iter(&caps[1])
                .map(|t| t[1].to_string())
                .collect();
            (!joined.is_empty()).then(|| unescape_json_fragment(&joined))
        })
        .collect();

    let thumbs: Vec<String> = RE_THUMB
        .captures_iter(html)
        .map(|c| unescape_json_fragment(&c[1]))
        .collect();

    let times: Vec<String> = RE_PUBLISHED
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect();

    ids.into_iter()
        .enumerate()
        .map(|(i, video_id)| RawVideo {
            video_id,
            title: titles.get(i).cloned().unwrap_or_default(),
            thumbnail: thumbs.get(i).cloned().unwrap_or_default(),
            publish_text: times.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Recency gate then keyword policy. Titles are still untranslated here.
pub fn select_videos(
    raw: Vec<RawVideo>,
    now: DateTime<Utc>,
    max_age_days: u32,
    limit: usize,
) -> Vec<(RawVideo, DateTime<Utc>)> {
    let fresh = raw.into_iter().filter_map(|v| {
        if v.title.trim().is_empty() {
            return None;
        }
        passes_recency_gate(&v.publish_text, now, max_age_days).map(|ts| (v, ts))
    });
    admit_with_quota(fresh, &policy(), limit, |(v, _)| v.title.clone())
}

fn to_item(v: RawVideo, published_at: DateTime<Utc>, title: String) -> NewsItem {
    let original = strip_markup(&v.title);
    let mut extras = serde_json::Map::new();
    if title != original {
        extras.insert("original_title".into(), original.into());
    }
    NewsItem {
        title,
        content: String::new(),
        summary: String::new(),
        source: Source::Youtube,
        source_url: format!("{WEB_BASE}/watch?v={}", v.video_id),
        embed_url: Some(format!("{WEB_BASE}/embed/{}", v.video_id)),
        media_type: MediaType::Video,
        published_at,
        thumbnail_url: (!v.thumbnail.is_empty()).then_some(v.thumbnail),
        extras,
    }
}

pub struct YoutubeProvider {
    client: reqwest::Client,
    web_base: String,
    translator: Option<Arc<Translator>>,
}

impl YoutubeProvider {
    pub fn new(translator: Option<Arc<Translator>>) -> Result<Self> {
        Ok(Self {
            client: http_client(15, BROWSER_UA)?,
            web_base: WEB_BASE.to_string(),
            translator,
        })
    }

    pub fn with_web_base(mut self, base: impl Into<String>) -> Self {
        self.web_base = base.into();
        self
    }

    async fn try_fetch(&self, query: &str) -> Result<Vec<RawVideo>> {
        let resp = self
            .client
            .get(format!("{}/results", self.web_base))
            // sp=CAI%3D: sort by upload date
            .query(&[("search_query", query), ("sp", "CAI%3D")])
            .send()
            .await
            .context("youtube results request")?;
        let html = ensure_success(resp).await?.text().await?;
        Ok(extract_videos(&html))
    }
}

#[async_trait]
impl SourceProvider for YoutubeProvider {
    async fn fetch(&self, query: &str, limit: usize, opts: &FetchOptions) -> Vec<NewsItem> {
        let raw = match self.try_fetch(query).await {
            Ok(raw) => raw,
            Err(e) => {
                report_failure(Source::Youtube, &e, 0);
                return Vec::new();
            }
        };

        let days = opts.max_age_days.unwrap_or(DEFAULT_MAX_AGE_DAYS);
        let picked = select_videos(raw, Utc::now(), days, limit);

        let mut out = Vec::with_capacity(picked.len());
        for (v, ts) in picked {
            let original = strip_markup(&v.title);
            let title = match &self.translator {
                Some(tr) => tr.to_chinese_or_original(&original).await,
                None => original,
            };
            out.push(to_item(v, ts, title));
        }
        out
    }

    fn source(&self) -> Source {
        Source::Youtube
    }
}
