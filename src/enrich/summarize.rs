// src/enrich/summarize.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EnrichError;

const DEFAULT_MODEL: &str = "MiniMax-M2.5";
const PLACEHOLDER_KEY: &str = "your_api_key_here";
const MAX_CONTENT_CHARS: usize = 4_000;

const SYSTEM_PROMPT: &str = "你是一个专业的视频内容摘要助手，擅长用简洁的中文概括视频要点。";

fn build_prompt(title: &str, content: &str) -> String {
    let content = if content.trim().is_empty() {
        "无".to_string()
    } else {
        content.chars().take(MAX_CONTENT_CHARS).collect()
    };
    format!(
        "请根据以下视频标题和描述，生成一个200字左右的中文摘要，概括视频的核心内容：\n\n\
         视频标题：{title}\n视频描述：{content}\n\n请直接输出摘要内容，不需要任何前缀："
    )
}

/// Credentialed completion endpoint.
#[async_trait]
pub trait SummarizationService: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, EnrichError>;
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

/// Anthropic-compatible `/v1/messages` endpoint (MiniMax by default).
pub struct MessagesApiService {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MessagesApiService {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("ai-news-collector/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl SummarizationService for MessagesApiService {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, EnrichError> {
        let req = MessageRequest {
            model: DEFAULT_MODEL,
            max_tokens: 500,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(EnrichError::Upstream(format!("HTTP {status}: {snippet}")));
        }

        let body: MessageResponse = resp.json().await?;
        body.content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .find_map(|b| b.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
            .ok_or_else(|| EnrichError::Malformed("no text block in response".into()))
    }
}

/// Summaries degrade to the raw content (or title) whenever the service is
/// missing or fails. Never errors.
#[derive(Clone, Default)]
pub struct Summarizer {
    service: Option<Arc<dyn SummarizationService>>,
}

impl Summarizer {
    pub fn new(service: Arc<dyn SummarizationService>) -> Self {
        Self {
            service: Some(service),
        }
    }

    pub fn disabled() -> Self {
        Self { service: None }
    }

    /// Build from configuration; an empty or placeholder key yields a pass-through.
    pub fn from_settings(base_url: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        match api_key.map(str::trim) {
            Some(key) if !key.is_empty() && key != PLACEHOLDER_KEY => {
                let svc = MessagesApiService::new(base_url, key)?;
                Ok(Self::new(Arc::new(svc)))
            }
            _ => {
                tracing::info!("summarizer not configured; summaries will use raw content");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_some()
    }

    pub async fn try_summarize(&self, title: &str, content: &str) -> Result<String, EnrichError> {
        let svc = self.service.as_ref().ok_or(EnrichError::NotConfigured)?;
        svc.complete(SYSTEM_PROMPT, &build_prompt(title, content)).await
    }

    pub async fn summarize(&self, title: &str, content: &str) -> String {
        let fallback = if content.is_empty() { title } else { content };
        self.try_summarize(title, content).await.unwrap_or_else(|e| {
            super::record_fallback("summarize", &e);
            fallback.to_string()
        })
    }
}
