// src/enrich/mod.rs
//! Content enrichment: translation to Chinese and short summaries.
//!
//! Both are best-effort. Calls return a typed [`EnrichError`] and the callers
//! pick their own fallback, usually the raw text.

pub mod summarize;
pub mod translate;

pub use summarize::{MessagesApiService, SummarizationService, Summarizer};
pub use translate::{is_target_language, MyMemoryService, TranslationService, Translator};

use metrics::counter;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichError {
    #[error("request timed out")]
    Timeout,
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("service not configured")]
    NotConfigured,
}

impl EnrichError {
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichError::Timeout => "timeout",
            EnrichError::Upstream(_) => "upstream_error",
            EnrichError::Malformed(_) => "malformed",
            EnrichError::NotConfigured => "not_configured",
        }
    }
}

impl From<reqwest::Error> for EnrichError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EnrichError::Timeout
        } else if e.is_decode() {
            EnrichError::Malformed(e.to_string())
        } else {
            EnrichError::Upstream(e.to_string())
        }
    }
}

pub(crate) fn record_fallback(what: &'static str, err: &EnrichError) {
    if *err != EnrichError::NotConfigured {
        tracing::warn!(what, reason = err.kind(), error = %err, "enrichment fell back to raw text");
    }
    counter!("collect_enrich_fallbacks_total", "kind" => what, "reason" => err.kind()).increment(1);
}
