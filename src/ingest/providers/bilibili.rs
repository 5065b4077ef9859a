// src/ingest/providers/bilibili.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::ingest::providers::{ensure_success, http_client, report_failure, BROWSER_UA};
use crate::ingest::types::{FetchOptions, MediaType, NewsItem, Source, SourceProvider};
use crate::ingest::{admit_with_quota, strip_markup, KeywordPolicy};

const API_BASE: &str = "https://api.bilibili.com";
const WEB_BASE: &str = "https://www.bilibili.com";

const FILTER_KEYWORDS: &[&str] = &[
    "短剧", "教程", "课程", "教学", "学习", "入门", "新手", "系列课", "培训", "从零开始", "小白",
    "全集", "完整版", "第1集", "第2集", "第3集",
];
const INCLUDE_KEYWORDS: &[&str] = &[
    "模型", "发布", "更新", "AI", "Sora", "GPT", "Claude", "Gemini", "Midjourney",
    "Stable Diffusion", "Runway", "Kling", "Seedance", "Luma", "开源", "新功能", "API",
    "Copilot", "o1", "DeepSeek", "Qwen", "Llama", "视频生成", "图像生成",
];

// Episode-numbered series ("第12集", "[第3集]").
static RE_EPISODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[?第\d+集").expect("episode regex"));

pub fn policy() -> KeywordPolicy {
    KeywordPolicy::new(FILTER_KEYWORDS, INCLUDE_KEYWORDS).with_filter_pattern(RE_EPISODE.clone())
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    result: Vec<VideoHit>,
}

#[derive(Debug, Deserialize)]
struct VideoHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    bvid: String,
    #[serde(default)]
    pic: String,
    #[serde(default)]
    pubdate: i64,
    #[serde(default)]
    author: String,
    #[serde(default)]
    duration: String,
}

/// Drop the `@…` resize suffix Bilibili appends to image URLs.
pub fn strip_thumbnail_suffix(url: &str) -> &str {
    url.split('@').next().unwrap_or(url)
}

fn to_item(hit: VideoHit) -> Option<NewsItem> {
    if hit.bvid.is_empty() {
        return None;
    }
    let title = strip_markup(&hit.title);
    if title.is_empty() {
        return None;
    }
    let thumbnail_url = (!hit.pic.is_empty()).then(|| {
        let abs = if hit.pic.starts_with("http") {
            hit.pic.clone()
        } else {
            format!("https:{}", hit.pic)
        };
        strip_thumbnail_suffix(&abs).to_string()
    });

    let mut extras = serde_json::Map::new();
    if !hit.author.is_empty() {
        extras.insert("author".into(), hit.author.into());
    }
    if !hit.duration.is_empty() {
        extras.insert("duration".into(), hit.duration.into());
    }

    Some(NewsItem {
        title,
        content: strip_markup(&hit.description),
        summary: String::new(),
        source: Source::Bilibili,
        source_url: format!("{WEB_BASE}/video/{}", hit.bvid),
        embed_url: Some(format!(
            "//player.bilibili.com/player.html?bvid={}&page=1",
            hit.bvid
        )),
        media_type: MediaType::Video,
        published_at: DateTime::<Utc>::from_timestamp(hit.pubdate, 0).unwrap_or_else(Utc::now),
        thumbnail_url,
        extras,
    })
}

/// Parse a search API body and apply the keyword policy.
pub fn parse_search_results(body: &str, limit: usize) -> Result<Vec<NewsItem>> {
    let resp: SearchResponse = serde_json::from_str(body).context("parsing bilibili search json")?;
    if resp.code != 0 {
        return Err(anyhow!("bilibili api code {}: {}", resp.code, resp.message));
    }
    let hits = resp.data.map(|d| d.result).unwrap_or_default();
    let items = hits.into_iter().filter_map(to_item);
    Ok(admit_with_quota(items, &policy(), limit, NewsItem::policy_text))
}

pub struct BilibiliProvider {
    client: reqwest::Client,
    api_base: String,
}

impl BilibiliProvider {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client(10, BROWSER_UA)?,
            api_base: API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn try_fetch(&self, query: &str, limit: usize) -> Result<Vec<NewsItem>> {
        let resp = self
            .client
            .get(format!("{}/x/web-interface/search/type", self.api_base))
            .query(&[
                ("search_type", "video"),
                ("keyword", query),
                ("pn", "1"),
                ("ps", "30"),
            ])
            .header("Referer", WEB_BASE)
            .header("Origin", WEB_BASE)
            .header("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8")
            .send()
            .await
            .context("bilibili search request")?;
        let body = ensure_success(resp).await?.text().await?;
        parse_search_results(&body, limit)
    }
}

#[async_trait]
impl SourceProvider for BilibiliProvider {
    async fn fetch(&self, query: &str, limit: usize, _opts: &FetchOptions) -> Vec<NewsItem> {
        match self.try_fetch(query, limit).await {
            Ok(items) => items,
            Err(e) => {
                report_failure(Source::Bilibili, &e, 0);
                Vec::new()
            }
        }
    }

    fn source(&self) -> Source {
        Source::Bilibili
    }
}
