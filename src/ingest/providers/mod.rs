// src/ingest/providers/mod.rs
pub mod bilibili;
pub mod github;
pub mod youtube;

use anyhow::{bail, Result};
use metrics::counter;
use std::time::Duration;

use crate::ingest::types::Source;

pub(crate) const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub(crate) fn http_client(timeout_secs: u64, user_agent: &str) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// Turn a non-2xx response into an error carrying the status and a body snippet.
pub(crate) async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    bail!("HTTP {}: {}", status.as_u16(), snippet.trim())
}

/// Adapters swallow their own failures; this is the single place they get reported.
pub(crate) fn report_failure(source: Source, err: &anyhow::Error, kept: usize) {
    let status = err
        .chain()
        .find_map(|e| e.downcast_ref::<reqwest::Error>())
        .and_then(|e| e.status())
        .map(|s| s.as_u16());
    tracing::warn!(
        source = source.as_str(),
        status = ?status,
        kept,
        error = %format!("{err:#}"),
        "source fetch failed; continuing with partial results"
    );
    counter!("collect_provider_errors_total", "source" => source.as_str()).increment(1);
}
