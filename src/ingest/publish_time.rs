// src/ingest/publish_time.rs
//! Recency gate for the video-search adapter.
//!
//! The results page only exposes a free-text publish time ("5 hours ago",
//! "Streamed 2 days ago", "Premiered Jan 5, 2025"...). We turn it into an
//! absolute timestamp and drop anything older than the window or unparseable.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*(minute|hour|day|week)s?\s*ago").expect("relative time regex")
});
static RE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(streamed\s+live\s+on|streamed\s+on|streamed|premiered(\s+on)?)\s+")
        .expect("prefix regex")
});

const DATE_FORMATS: &[&str] = &["%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y", "%Y-%m-%d"];

/// Parse a relative or absolute publish-time string against `now`.
pub fn parse_publish_time(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();

    if let Some(caps) = RE_RELATIVE.captures(&lower) {
        let n: i64 = caps[1].parse().ok()?;
        let delta = match &caps[2] {
            "minute" => Duration::try_minutes(n)?,
            "hour" => Duration::try_hours(n)?,
            "day" => Duration::try_days(n)?,
            "week" => Duration::try_weeks(n)?,
            _ => return None,
        };
        return now.checked_sub_signed(delta);
    }

    if lower.contains("yesterday") {
        return now.checked_sub_signed(Duration::days(1));
    }

    let absolute = RE_PREFIX.replace(trimmed, "");
    parse_absolute(absolute.trim())
}

fn parse_absolute(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `ts` is not in the future and at most `days` old.
pub fn is_within_days(ts: DateTime<Utc>, now: DateTime<Utc>, days: u32) -> bool {
    let age = now.signed_duration_since(ts);
    age >= Duration::zero() && age <= Duration::days(i64::from(days))
}

/// Recency gate: parseable and inside the window.
pub fn passes_recency_gate(text: &str, now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    parse_publish_time(text, now).filter(|ts| is_within_days(*ts, now, days))
}
