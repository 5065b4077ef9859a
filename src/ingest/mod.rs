// src/ingest/mod.rs
pub mod providers;
pub mod publish_time;
pub mod scheduler;
pub mod types;

use crate::ingest::types::NewsItem;
use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_runs_total", "Collection runs by outcome.");
        describe_counter!(
            "collect_provider_items_total",
            "Candidates returned by each source adapter."
        );
        describe_counter!(
            "collect_provider_errors_total",
            "Source adapter fetch/parse errors."
        );
        describe_counter!("collect_inserted_total", "Items persisted by the pipeline.");
        describe_counter!(
            "collect_insert_errors_total",
            "Per-item persistence failures (skipped)."
        );
        describe_counter!(
            "collect_enrich_fallbacks_total",
            "Translation/summarization calls that fell back to raw text."
        );
        describe_gauge!(
            "collect_last_success_ts",
            "Unix ts of the last successful collection."
        );
    });
}

/// Strip markup from a title/description: decode entities, drop tags, collapse whitespace.
pub fn strip_markup(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    // Tags first: upstream search APIs wrap hits in <em class="keyword">.
    let out = re_tags.replace_all(s, "");
    let out = html_escape::decode_html_entities(&out);
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Two-list relevance policy.
///
/// `filter` is absolute: any match excludes the item. `include` is soft: it is
/// only required once half of the quota is already filled.
#[derive(Debug, Clone, Default)]
pub struct KeywordPolicy {
    filter: Vec<String>,
    include: Vec<String>,
    filter_patterns: Vec<Regex>,
}

impl KeywordPolicy {
    pub fn new<F, I>(filter: F, include: I) -> Self
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            filter: lowered(filter),
            include: lowered(include),
            filter_patterns: Vec::new(),
        }
    }

    /// Extra regex rejections, matched against the raw text.
    pub fn with_filter_pattern(mut self, re: Regex) -> Self {
        self.filter_patterns.push(re);
        self
    }

    pub fn is_filtered(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.filter.iter().any(|k| lower.contains(k.as_str()))
            || self.filter_patterns.iter().any(|re| re.is_match(text))
    }

    pub fn is_relevant(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.include.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Would an item with `text` be admitted when `accepted` items are already in?
    pub fn admits(&self, text: &str, accepted: usize, limit: usize) -> bool {
        if self.is_filtered(text) {
            return false;
        }
        // First half of the quota: anything not filtered. Second half: relevant only.
        accepted * 2 < limit || self.is_relevant(text)
    }
}

fn lowered<I>(words: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| w.as_ref().to_lowercase())
        .filter(|w| !w.trim().is_empty())
        .collect()
}

/// Walk candidates in upstream order, keeping at most `limit` that the policy admits.
pub fn admit_with_quota<T, F>(
    candidates: impl IntoIterator<Item = T>,
    policy: &KeywordPolicy,
    limit: usize,
    text_of: F,
) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut out = Vec::with_capacity(limit);
    if limit == 0 {
        return out;
    }
    for c in candidates {
        if policy.admits(&text_of(&c), out.len(), limit) {
            out.push(c);
            if out.len() >= limit {
                break;
            }
        }
    }
    out
}

/// Merge adapter outputs (adapter order, then per-adapter order), keep the first
/// occurrence of each `source_url`, drop anything already persisted, truncate.
pub fn dedupe_and_select(
    candidate_lists: Vec<Vec<NewsItem>>,
    existing: &HashSet<String>,
    target_count: usize,
) -> Vec<NewsItem> {
    let mut seen: HashSet<String> = HashSet::new();
    candidate_lists
        .into_iter()
        .flatten()
        .filter(|it| seen.insert(it.source_url.clone()))
        .filter(|it| !existing.contains(&it.source_url))
        .take(target_count)
        .collect()
}
