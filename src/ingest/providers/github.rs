// src/ingest/providers/github.rs
use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;

use crate::ingest::providers::{ensure_success, http_client, report_failure};
use crate::ingest::types::{FetchOptions, MediaType, NewsItem, Source, SourceProvider};
use crate::ingest::{admit_with_quota, strip_markup, KeywordPolicy};

const API_BASE: &str = "https://api.github.com";

pub const DEFAULT_QUERY: &str = "ai OR llm OR gpt OR multimodal OR agent";
const SECONDARY_QUERY: &str =
    r#""machine learning" OR "deep learning" OR "image generation" OR "video generation" OR diffusion"#;

const FILTER_KEYWORDS: &[&str] = &["tutorial", "course", "example", "demo", "learn"];
const INCLUDE_KEYWORDS: &[&str] = &[
    "ai", "llm", "gpt", "model", "machine learning", "deep learning", "stable diffusion",
    "image generation", "video generation", "multimodal", "transformer", "agent", "copilot",
];

pub fn policy() -> KeywordPolicy {
    KeywordPolicy::new(FILTER_KEYWORDS, INCLUDE_KEYWORDS)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repo {
    pub full_name: String,
    pub html_url: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stargazers_count: u64,
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub avatar_url: Option<String>,
}

/// Search qualifier date: repositories created since yesterday (UTC).
pub fn created_since(now: DateTime<Utc>) -> NaiveDate {
    (now - Duration::days(1)).date_naive()
}

/// Merge repos from several queries, first occurrence of each `html_url` wins.
pub fn merge_unique(batches: Vec<Vec<Repo>>) -> Vec<Repo> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|r| match &r.html_url {
            Some(url) => seen.insert(url.clone()),
            None => false,
        })
        .collect()
}

fn to_item(repo: Repo) -> Option<NewsItem> {
    let url = repo.html_url?;
    let description = strip_markup(repo.description.as_deref().unwrap_or_default());
    let mut extras = serde_json::Map::new();
    extras.insert("stars".into(), repo.stargazers_count.into());
    Some(NewsItem {
        title: repo.full_name,
        content: description,
        summary: String::new(),
        source: Source::Github,
        source_url: url,
        embed_url: None,
        media_type: MediaType::Article,
        published_at: repo.created_at.unwrap_or_else(Utc::now),
        thumbnail_url: repo.owner.and_then(|o| o.avatar_url),
        extras,
    })
}

/// Apply the keyword policy over title + description.
pub fn select_repos(repos: Vec<Repo>, limit: usize) -> Vec<NewsItem> {
    let items = repos.into_iter().filter_map(to_item);
    admit_with_quota(items, &policy(), limit, NewsItem::policy_text)
}

pub struct GithubProvider {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubProvider {
    pub fn new(token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(15, "Daily-AI-News/1.0")?,
            api_base: API_BASE.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn search(&self, q: &str) -> Result<Vec<Repo>> {
        let mut req = self
            .client
            .get(format!("{}/search/repositories", self.api_base))
            .query(&[("q", q), ("sort", "stars"), ("order", "desc"), ("per_page", "30")])
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.context("github search request")?;
        let body: SearchResponse = ensure_success(resp)
            .await?
            .json()
            .await
            .context("parsing github search json")?;
        Ok(body.items)
    }
}

#[async_trait]
impl SourceProvider for GithubProvider {
    async fn fetch(&self, query: &str, limit: usize, _opts: &FetchOptions) -> Vec<NewsItem> {
        let since = created_since(Utc::now());
        let primary = if query.trim().is_empty() { DEFAULT_QUERY } else { query };

        let mut batches = Vec::new();
        for q in [primary, SECONDARY_QUERY] {
            let full = format!("{q} created:>={since}");
            match self.search(&full).await {
                Ok(repos) => batches.push(repos),
                Err(e) => {
                    let kept = batches.iter().map(Vec::len).sum();
                    report_failure(Source::Github, &e, kept);
                    break;
                }
            }
        }
        select_repos(merge_unique(batches), limit)
    }

    fn source(&self) -> Source {
        Source::Github
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn repo(name: &str, desc: &str) -> Repo {
        Repo {
            full_name: name.into(),
            html_url: Some(format!("https://github.com/{name}")),
            description: Some(desc.into()),
            created_at: None,
            stargazers_count: 42,
            owner: Some(Owner {
                avatar_url: Some("https://avatars.githubusercontent.com/u/1".into()),
            }),
        }
    }

    #[test]
    fn created_since_is_yesterday() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 3, 0, 0).unwrap();
        assert_eq!(created_since(now).to_string(), "2025-02-28");
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let merged = merge_unique(vec![
            vec![repo("a/one", "x"), repo("b/two", "y")],
            vec![repo("a/one", "dup"), repo("c/three", "z")],
        ]);
        let names: Vec<_> = merged.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["a/one", "b/two", "c/three"]);
        assert_eq!(merged[0].description.as_deref(), Some("x"));
    }

    #[test]
    fn description_participates_in_filter() {
        let items = select_repos(
            vec![repo("x/agents", "A tutorial on agents"), repo("y/llm-kit", "fast llm serving")],
            3,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "y/llm-kit");
        assert_eq!(items[0].media_type, MediaType::Article);
        assert_eq!(items[0].extras.get("stars").and_then(|v| v.as_u64()), Some(42));
    }
}
