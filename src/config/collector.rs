// src/config/collector.rs
use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_PATH: &str = "COLLECTOR_CONFIG_PATH";
const DEFAULT_FILE: &str = "config/collector.toml";
const DEFAULT_MINIMAX_BASE: &str = "https://api.minimax.chat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub enabled: bool,
    pub query: String,
    pub limit: usize,
    /// Recency window; only the YouTube adapter reads it.
    pub max_age_days: Option<u32>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            query: String::new(),
            limit: 5,
            max_age_days: None,
        }
    }
}

impl SourceSettings {
    fn with(query: &str, limit: usize) -> Self {
        Self {
            query: query.to_string(),
            limit,
            ..Self::default()
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MINIMAX_BASE.to_string(),
            api_key: None,
        }
    }
}

impl fmt::Debug for SummarizerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummarizerSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "FileConfig")]
pub struct CollectorConfig {
    pub db_path: String,
    pub meta_path: String,
    /// Output of the one-shot binary.
    pub export_path: String,
    pub target_count: usize,
    /// Local `HH:MM`, or `off`.
    pub collect_at: String,
    pub github_token: Option<String>,
    pub summarizer: SummarizerSettings,
    pub bilibili: SourceSettings,
    pub youtube: SourceSettings,
    pub github: SourceSettings,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/news.db".into(),
            meta_path: "./data/collect-meta.json".into(),
            export_path: "./data/news.json".into(),
            target_count: crate::pipeline::DEFAULT_TARGET_COUNT,
            collect_at: "09:00".into(),
            github_token: None,
            summarizer: SummarizerSettings::default(),
            bilibili: SourceSettings::with("AI模型发布", 8),
            youtube: SourceSettings {
                max_age_days: Some(crate::ingest::providers::youtube::DEFAULT_MAX_AGE_DAYS),
                ..SourceSettings::with("AI model release announcement", 5)
            },
            github: SourceSettings::with(crate::ingest::providers::github::DEFAULT_QUERY, 3),
        }
    }
}

/// A `[source]` table as written in the file. Unset keys keep that
/// source's own default, not the generic one.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SourceOverlay {
    enabled: Option<bool>,
    query: Option<String>,
    limit: Option<usize>,
    max_age_days: Option<u32>,
}

impl SourceOverlay {
    fn apply(self, base: &mut SourceSettings) {
        if let Some(v) = self.enabled {
            base.enabled = v;
        }
        if let Some(v) = self.query {
            base.query = v;
        }
        if let Some(v) = self.limit {
            base.limit = v;
        }
        if self.max_age_days.is_some() {
            base.max_age_days = self.max_age_days;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    db_path: Option<String>,
    meta_path: Option<String>,
    export_path: Option<String>,
    target_count: Option<usize>,
    collect_at: Option<String>,
    github_token: Option<String>,
    summarizer: Option<SummarizerSettings>,
    bilibili: SourceOverlay,
    youtube: SourceOverlay,
    github: SourceOverlay,
}

impl From<FileConfig> for CollectorConfig {
    fn from(f: FileConfig) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = f.db_path {
            cfg.db_path = v;
        }
        if let Some(v) = f.meta_path {
            cfg.meta_path = v;
        }
        if let Some(v) = f.export_path {
            cfg.export_path = v;
        }
        if let Some(v) = f.target_count {
            cfg.target_count = v;
        }
        if let Some(v) = f.collect_at {
            cfg.collect_at = v;
        }
        if f.github_token.is_some() {
            cfg.github_token = f.github_token;
        }
        if let Some(v) = f.summarizer {
            cfg.summarizer = v;
        }
        f.bilibili.apply(&mut cfg.bilibili);
        f.youtube.apply(&mut cfg.youtube);
        f.github.apply(&mut cfg.github);
        cfg
    }
}

impl CollectorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing collector config toml")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading collector config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// File (env path, then default path, then built-in defaults) + env overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_FILE).exists() {
            Self::load_from(Path::new(DEFAULT_FILE))?
        } else {
            Self::default()
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_nonempty("DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = env_nonempty("META_PATH") {
            self.meta_path = v;
        }
        if let Some(v) = env_nonempty("EXPORT_PATH") {
            self.export_path = v;
        }
        if let Some(v) = env_nonempty("MINIMAX_API_KEY") {
            self.summarizer.api_key = Some(v);
        }
        if let Some(v) = env_nonempty("MINIMAX_BASE_URL") {
            self.summarizer.base_url = v;
        }
        if let Some(v) = env_nonempty("GITHUB_TOKEN") {
            self.github_token = Some(v);
        }
        if let Some(v) = env_nonempty("COLLECT_AT") {
            self.collect_at = v;
        }
        if let Some(v) = env_nonempty("TARGET_COUNT") {
            self.target_count = v
                .trim()
                .parse()
                .with_context(|| format!("TARGET_COUNT must be a number, got {v:?}"))?;
        }
        for (key, slot) in [
            ("CRAWL_BILIBILI", &mut self.bilibili),
            ("CRAWL_YOUTUBE", &mut self.youtube),
            ("CRAWL_GITHUB", &mut self.github),
        ] {
            if let Some(v) = env_nonempty(key) {
                slot.enabled = v.trim() != "false";
            }
        }
        // Surface a bad schedule at startup rather than at the first tick.
        self.schedule()?;
        Ok(())
    }

    /// Daily trigger time; `None` when disabled.
    pub fn schedule(&self) -> Result<Option<NaiveTime>> {
        parse_collect_at(&self.collect_at)
    }
}

pub fn parse_collect_at(s: &str) -> Result<Option<NaiveTime>> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    NaiveTime::parse_from_str(s, "%H:%M")
        .map(Some)
        .with_context(|| format!("COLLECT_AT must be HH:MM or off, got {s:?}"))
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = CollectorConfig::default();
        assert_eq!(c.db_path, "./data/news.db");
        assert_eq!(c.target_count, 10);
        assert_eq!(c.bilibili.query, "AI模型发布");
        assert_eq!(c.bilibili.limit, 8);
        assert_eq!(c.youtube.limit, 5);
        assert_eq!(c.youtube.max_age_days, Some(2));
        assert_eq!(c.github.limit, 3);
        assert_eq!(
            c.schedule().unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0)
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = CollectorConfig::from_toml_str(
            r#"
            target_count = 4
            collect_at = "off"

            [youtube]
            enabled = false
            query = "sora"
            "#,
        )
        .unwrap();
        assert_eq!(c.target_count, 4);
        assert!(c.schedule().unwrap().is_none());
        assert!(!c.youtube.enabled);
        assert_eq!(c.youtube.query, "sora");
        assert_eq!(c.youtube.limit, 5);
        assert_eq!(c.youtube.max_age_days, Some(2));
        assert_eq!(c.bilibili.limit, 8);
    }

    #[test]
    fn partial_source_table_keeps_that_sources_defaults() {
        let c = CollectorConfig::from_toml_str(
            "[bilibili]\nenabled = false\n\n[github]\nlimit = 6\n",
        )
        .unwrap();
        let d = CollectorConfig::default();
        assert!(!c.bilibili.enabled);
        assert_eq!(c.bilibili.query, "AI模型发布");
        assert_eq!(c.bilibili.limit, 8);
        assert!(c.github.enabled);
        assert_eq!(c.github.query, d.github.query);
        assert_eq!(c.github.limit, 6);
        assert_eq!(c.youtube, d.youtube);
    }

    #[test]
    fn collect_at_rejects_garbage() {
        assert!(parse_collect_at("9am").is_err());
        assert_eq!(
            parse_collect_at("07:30").unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0)
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let s = SummarizerSettings {
            base_url: "x".into(),
            api_key: Some("sk-secret".into()),
        };
        assert!(!format!("{s:?}").contains("sk-secret"));
    }
}
