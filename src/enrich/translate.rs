// src/enrich/translate.rs
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use serde::Deserialize;

use super::EnrichError;

const MYMEMORY_URL: &str = "https://api.mymemory.translated.net/get";
const CACHE_CAP: usize = 100;
const CACHE_KEY_CHARS: usize = 50;

/// Already written in the target script (CJK Unified Ideographs)?
pub fn is_target_language(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// External translation endpoint.
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, EnrichError>;
}

/// MyMemory public API (`GET /get?q=…&langpair=en|zh-CN`).
pub struct MyMemoryService {
    http: reqwest::Client,
    endpoint: String,
}

impl MyMemoryService {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("ai-news-collector/0.1")
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            endpoint: MYMEMORY_URL.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyMemoryResp {
    response_status: serde_json::Value,
    response_data: Option<MyMemoryData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyMemoryData {
    translated_text: String,
}

#[async_trait]
impl TranslationService for MyMemoryService {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, EnrichError> {
        let langpair = format!("{source_lang}|{target_lang}");
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("q", text), ("langpair", langpair.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(EnrichError::Upstream(format!("HTTP {}", resp.status())));
        }
        let body: MyMemoryResp = resp.json().await?;
        // responseStatus comes back as either 200 or "200" depending on the path taken.
        let ok = match &body.response_status {
            serde_json::Value::Number(n) => n.as_u64() == Some(200),
            serde_json::Value::String(s) => s == "200",
            _ => false,
        };
        if !ok {
            return Err(EnrichError::Upstream(format!(
                "responseStatus {}",
                body.response_status
            )));
        }
        body.response_data
            .map(|d| d.translated_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| EnrichError::Malformed("missing translatedText".into()))
    }
}

/// Translate-to-Chinese with a small process-lifetime cache.
///
/// Lookups use `peek`, so hits never refresh an entry and eviction drops the
/// oldest insertion.
pub struct Translator {
    service: Arc<dyn TranslationService>,
    cache: Mutex<LruCache<String, String>>,
}

impl Translator {
    pub fn new(service: Arc<dyn TranslationService>) -> Self {
        Self::with_cache_capacity(service, CACHE_CAP)
    }

    fn with_cache_capacity(service: Arc<dyn TranslationService>, cap: usize) -> Self {
        let cap = NonZeroUsize::new(cap).unwrap_or(NonZeroUsize::MIN);
        Self {
            service,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// `Ok(None)`: nothing to do (empty or already Chinese). No network call is made.
    pub async fn to_chinese(&self, text: &str) -> Result<Option<String>, EnrichError> {
        if text.trim().is_empty() || is_target_language(text) {
            return Ok(None);
        }

        let key: String = text.chars().take(CACHE_KEY_CHARS).collect();
        let cached = self.lock_cache().peek(&key).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let translated = self.service.translate(text, "en", "zh-CN").await?;
        self.lock_cache().put(key, translated.clone());
        Ok(Some(translated))
    }

    /// Translated text, or the input unchanged when no translation is available.
    pub async fn to_chinese_or_original(&self, text: &str) -> String {
        match self.to_chinese(text).await {
            Ok(t) => t.unwrap_or_else(|| text.to_string()),
            Err(e) => {
                super::record_fallback("translate", &e);
                text.to_string()
            }
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, String>> {
        // A panic while holding this lock cannot leave the map inconsistent.
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TranslationService for Counting {
        async fn translate(&self, text: &str, _s: &str, _t: &str) -> Result<String, EnrichError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(EnrichError::Timeout)
            } else {
                Ok(format!("译:{text}"))
            }
        }
    }

    fn counting(fail: bool) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn chinese_text_is_a_no_op() {
        let svc = counting(false);
        let tr = Translator::new(svc.clone());
        assert_eq!(tr.to_chinese("你好").await, Ok(None));
        assert_eq!(tr.to_chinese("  ").await, Ok(None));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_text_hits_cache() {
        let svc = counting(false);
        let tr = Translator::new(svc.clone());
        assert_eq!(tr.to_chinese("hello").await, Ok(Some("译:hello".into())));
        assert_eq!(tr.to_chinese("hello").await, Ok(Some("译:hello".into())));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_typed_and_falls_back() {
        let svc = counting(true);
        let tr = Translator::new(svc);
        assert_eq!(tr.to_chinese("hello").await, Err(EnrichError::Timeout));
        assert_eq!(tr.to_chinese_or_original("hello").await, "hello");
        assert_eq!(tr.cached_len(), 0);
    }

    #[tokio::test]
    async fn cache_evicts_oldest_insertion_even_after_hits() {
        let svc = counting(false);
        let tr = Translator::with_cache_capacity(svc.clone(), 2);
        tr.to_chinese("alpha").await.unwrap();
        tr.to_chinese("beta").await.unwrap();
        // A hit on "alpha" must not protect it from eviction.
        tr.to_chinese("alpha").await.unwrap();
        tr.to_chinese("gamma").await.unwrap();
        assert_eq!(tr.cached_len(), 2);
        assert_eq!(svc.calls.load(Ordering::SeqCst), 3);

        tr.to_chinese("beta").await.unwrap();
        assert_eq!(svc.calls.load(Ordering::SeqCst), 3);
        tr.to_chinese("alpha").await.unwrap();
        assert_eq!(svc.calls.load(Ordering::SeqCst), 4);
    }
}
