use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use llm::{
    builder::{LLMBackend, LLMBuilder},
    chat::ChatMessage,
    LLMProvider,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{Config, LlmProvider as LlmProviderKind, TranslatorKind};
use crate::error::TranslationError;
use crate::transcript::{format_timestamp, FormattedSegment, Segment};

/// Placeholder stored for a segment whose translation request failed
pub const SENTINEL_TEXT: &str = "translation failed";

/// A translation capability: one operation, segment text in, translated
/// text out. Backends are interchangeable and selected by configuration.
#[allow(async_fn_in_trait)]
pub trait Translate {
    async fn translate(&self, text: &str, target_language: &str)
        -> Result<String, TranslationError>;
}

/// Convert our provider enum to the llm crate's backend
fn to_llm_backend(provider: LlmProviderKind) -> LLMBackend {
    match provider {
        LlmProviderKind::Openai => LLMBackend::OpenAI,
        LlmProviderKind::Anthropic => LLMBackend::Anthropic,
        LlmProviderKind::Google => LLMBackend::Google,
        LlmProviderKind::Ollama => LLMBackend::Ollama,
        LlmProviderKind::Deepseek => LLMBackend::DeepSeek,
    }
}

/// LLM-backed translation: one chat request per segment, instructed to
/// produce modern, conversational phrasing rather than a literal rendering.
pub struct LlmTranslator {
    client: Box<dyn LLMProvider>,
}

impl LlmTranslator {
    pub fn new(
        provider: LlmProviderKind,
        api_key: &str,
        model: &str,
        base_url: Option<&str>,
    ) -> Result<Self, TranslationError> {
        let mut builder = LLMBuilder::new()
            .backend(to_llm_backend(provider))
            .api_key(api_key)
            .model(model)
            .system("You are a helpful translator that outputs clear and modern translations.");

        if let Some(url) = base_url {
            builder = builder.base_url(url);
        }

        let client = builder
            .build()
            .map_err(|e| TranslationError::Backend(e.to_string()))?;

        Ok(Self { client })
    }
}

impl Translate for LlmTranslator {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError> {
        let prompt = format!(
            "Translate the following sentence into {} using modern, simple, \
             and conversational language. Avoid overly formal or harsh words. \
             Only return the translated sentence:\n\n\"{}\"\n",
            target_language, text
        );

        let messages = vec![ChatMessage::user().content(prompt).build()];

        let response = self
            .client
            .chat(&messages)
            .await
            .map_err(|e| TranslationError::Request(e.to_string()))?;

        let translated = response
            .text()
            .ok_or_else(|| TranslationError::Request("empty response from translation API".into()))?;

        Ok(translated.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
struct HttpTranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct HttpTranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Direct translation against a LibreTranslate-compatible HTTP service.
/// No style instruction; the service returns a literal translation.
pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TranslationError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

impl Translate for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError> {
        let body = HttpTranslateRequest {
            q: text,
            source: "auto",
            target: target_language,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::Request(format!(
                "translation service returned {}: {}",
                status, body
            )));
        }

        let parsed: HttpTranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::Request(e.to_string()))?;

        Ok(parsed.translated_text)
    }
}

/// The backend selected by configuration; one call site for both strategies
pub enum Translator {
    Llm(LlmTranslator),
    Http(HttpTranslator),
}

impl Translator {
    pub fn from_config(config: &Config) -> Result<Self, TranslationError> {
        match config.translator {
            TranslatorKind::Llm => {
                let api_key = config.llm_api_key.as_deref().ok_or_else(|| {
                    TranslationError::Backend(
                        "LLM API key required for translation. Set --llm-api-key or DUBBER_LLM_API_KEY"
                            .into(),
                    )
                })?;
                Ok(Self::Llm(LlmTranslator::new(
                    config.llm_provider,
                    api_key,
                    &config.llm_model,
                    config.llm_url.as_deref(),
                )?))
            }
            TranslatorKind::Http => Ok(Self::Http(HttpTranslator::new(
                config.translate_url.clone(),
                config.translate_api_key.clone(),
            )?)),
        }
    }
}

impl Translate for Translator {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError> {
        match self {
            Self::Llm(t) => t.translate(text, target_language).await,
            Self::Http(t) => t.translate(text, target_language).await,
        }
    }
}

/// Translate segments one by one, preserving order and count and formatting
/// the timings.
///
/// A failed request substitutes [`SENTINEL_TEXT`] for that segment and the
/// batch continues; if EVERY segment ends up as the sentinel, the whole
/// operation fails with [`TranslationError::AllSegmentsFailed`].
pub async fn translate_segments<T: Translate>(
    translator: &T,
    segments: &[Segment],
    target_language: &str,
) -> Result<Vec<FormattedSegment>, TranslationError> {
    info!(
        "Translating {} segments to {}...",
        segments.len(),
        target_language
    );

    let pb = ProgressBar::new(segments.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut translated = Vec::with_capacity(segments.len());

    for segment in segments {
        let text = match translator.translate(&segment.text, target_language).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Segment translation failed: {}", e);
                SENTINEL_TEXT.to_string()
            }
        };

        translated.push(FormattedSegment {
            start: format_timestamp(segment.start),
            end: format_timestamp(segment.end),
            text,
        });
        pb.inc(1);
    }

    pb.finish_and_clear();

    if !translated.is_empty()
        && translated
            .iter()
            .all(|seg| seg.text.eq_ignore_ascii_case(SENTINEL_TEXT))
    {
        return Err(TranslationError::AllSegmentsFailed);
    }

    info!("Translation complete");
    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    impl Translate for Echo {
        async fn translate(
            &self,
            text: &str,
            target_language: &str,
        ) -> Result<String, TranslationError> {
            Ok(format!("{}:{}", target_language, text))
        }
    }

    struct AlwaysFails;

    impl Translate for AlwaysFails {
        async fn translate(&self, _: &str, _: &str) -> Result<String, TranslationError> {
            Err(TranslationError::Request("boom".into()))
        }
    }

    /// Fails every call except the one at `survivor`
    struct FailsExcept {
        survivor: usize,
        calls: AtomicUsize,
    }

    impl Translate for FailsExcept {
        async fn translate(&self, text: &str, _: &str) -> Result<String, TranslationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.survivor {
                Ok(format!("ok:{}", text))
            } else {
                Err(TranslationError::Request("boom".into()))
            }
        }
    }

    struct UppercaseSentinel;

    impl Translate for UppercaseSentinel {
        async fn translate(&self, _: &str, _: &str) -> Result<String, TranslationError> {
            Ok("Translation Failed".to_string())
        }
    }

    fn sample_segments() -> Vec<Segment> {
        vec![
            Segment::new(0.0, 2.0, "hello"),
            Segment::new(2.0, 4.0, "world"),
            Segment::new(4.0, 6.5, "goodbye"),
        ]
    }

    #[tokio::test]
    async fn test_preserves_order_count_and_timing() {
        let segments = sample_segments();
        let translated = translate_segments(&Echo, &segments, "es").await.unwrap();

        assert_eq!(translated.len(), segments.len());
        assert_eq!(translated[0].text, "es:hello");
        assert_eq!(translated[1].text, "es:world");
        assert_eq!(translated[2].text, "es:goodbye");
        for (seg, out) in segments.iter().zip(&translated) {
            assert_eq!(out.start, format_timestamp(seg.start));
            assert_eq!(out.end, format_timestamp(seg.end));
        }
    }

    #[tokio::test]
    async fn test_all_failures_abort_the_batch() {
        let err = translate_segments(&AlwaysFails, &sample_segments(), "es")
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::AllSegmentsFailed));
    }

    #[tokio::test]
    async fn test_partial_failures_substitute_sentinel() {
        let translator = FailsExcept {
            survivor: 1,
            calls: AtomicUsize::new(0),
        };
        let translated = translate_segments(&translator, &sample_segments(), "es")
            .await
            .unwrap();

        assert_eq!(translated.len(), 3);
        assert_eq!(translated[0].text, SENTINEL_TEXT);
        assert_eq!(translated[1].text, "ok:world");
        assert_eq!(translated[2].text, SENTINEL_TEXT);
    }

    #[tokio::test]
    async fn test_sentinel_comparison_is_case_insensitive() {
        let err = translate_segments(&UppercaseSentinel, &sample_segments(), "es")
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::AllSegmentsFailed));
    }

    #[tokio::test]
    async fn test_empty_input_is_not_a_failure() {
        let translated = translate_segments(&Echo, &[], "es").await.unwrap();
        assert!(translated.is_empty());
    }

    #[test]
    fn test_http_request_shape() {
        let body = HttpTranslateRequest {
            q: "hello",
            source: "auto",
            target: "es",
            format: "text",
            api_key: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["q"], "hello");
        assert_eq!(json["source"], "auto");
        assert_eq!(json["target"], "es");
        assert_eq!(json["format"], "text");
        assert!(json.get("api_key").is_none());
    }

    #[test]
    fn test_http_response_parse() {
        let parsed: HttpTranslateResponse =
            serde_json::from_str(r#"{"translatedText": "hola"}"#).unwrap();
        assert_eq!(parsed.translated_text, "hola");
    }
}
