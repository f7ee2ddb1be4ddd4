//! Vendor adapter implementations
//!
//! - `openai` - OpenAI 호환 계열 (OpenAI, DeepSeek, Grok, OpenRouter, ...)
//! - `anthropic` - Claude messages API
//! - `gemini` - Google Gemini
//! - `ollama` - 로컬 Ollama

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use crate::error::ProviderError;
use crate::r#trait::{merge_options, EventStream, ModelInfo, StreamEvent};
use crate::retry::RetryConfig;
use crate::stream::{stream_events, ChunkDecoder, Framing, StreamRequest};
use crate::vendor::Vendor;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tars_foundation::{ProviderOptions, ProviderSettings};
use tokio_util::sync::CancellationToken;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// State every adapter carries
pub(crate) struct AdapterCore {
    pub vendor: Vendor,
    pub tag: String,
    pub options: ProviderOptions,
    pub models: Vec<ModelInfo>,
    client: Client,
    retry: RetryConfig,
}

impl AdapterCore {
    pub fn new(vendor: Vendor, settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let options = merge_options(&vendor.default_options(), &settings.options);
        validate_base_url(&options.base_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        let models = vendor
            .profile()
            .models
            .iter()
            .map(|id| ModelInfo::new(*id, vendor.name()))
            .collect();

        Ok(Self {
            vendor,
            tag: settings.tag.clone(),
            options,
            models,
            client,
            retry: RetryConfig::default(),
        })
    }

    /// 호출별 옵션 (키/모델 누락은 요청 전에 거부)
    pub fn prepare(&self, overrides: &ProviderOptions) -> Result<ProviderOptions, ProviderError> {
        let options = merge_options(&self.options, overrides);

        if self.vendor.profile().requires_key && options.api_key.trim().is_empty() {
            return Err(ProviderError::Authentication(format!(
                "API key for '{}' is not set",
                self.tag
            )));
        }
        if options.model.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(format!(
                "model for '{}' is not set",
                self.tag
            )));
        }
        Ok(options)
    }

    /// 요청 생성 결과를 스트림으로
    pub fn stream<'a, D>(
        &self,
        request: Result<StreamRequest, ProviderError>,
        framing: Framing,
        decoder: D,
        cancel: CancellationToken,
    ) -> EventStream<'a>
    where
        D: ChunkDecoder + 'a,
    {
        match request {
            Ok(request) => stream_events(
                self.client.clone(),
                self.retry.clone(),
                request,
                framing,
                decoder,
                cancel,
            ),
            Err(e) => Box::pin(futures::stream::once(async move { StreamEvent::Error(e) })),
        }
    }

    pub fn operation(&self) -> String {
        format!("{}:{}", self.vendor.name(), self.tag)
    }
}

/// `{base}/{path}` (슬래시 중복 제거)
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// `parameters` 를 요청 본문에 병합. `reserved` 키는 덮어쓰지 않는다.
pub(crate) fn merge_parameters(
    body: &mut Map<String, Value>,
    parameters: &Map<String, Value>,
    reserved: &[&str],
) {
    for (key, value) in parameters {
        if !reserved.contains(&key.as_str()) {
            body.insert(key.clone(), value.clone());
        }
    }
}

fn validate_base_url(base_url: &str) -> Result<(), ProviderError> {
    let parsed = Url::parse(base_url).map_err(|e| {
        ProviderError::NotConfigured(format!("invalid base URL '{}': {}", base_url, e))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ProviderError::NotConfigured(format!(
            "unsupported URL scheme '{}' in '{}'",
            other, base_url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://api.x.ai/v1/", "/chat/completions"),
            "https://api.x.ai/v1/chat/completions"
        );
        assert_eq!(
            endpoint("http://127.0.0.1:11434", "api/chat"),
            "http://127.0.0.1:11434/api/chat"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let settings = ProviderSettings::new("bad", "OpenAI").base_url("not a url");
        assert!(matches!(
            AdapterCore::new(Vendor::OpenAI, &settings),
            Err(ProviderError::NotConfigured(_))
        ));

        let settings = ProviderSettings::new("ftp", "OpenAI").base_url("ftp://example.com");
        assert!(AdapterCore::new(Vendor::OpenAI, &settings).is_err());
    }

    #[test]
    fn test_empty_base_url_uses_vendor_default() {
        let settings = ProviderSettings::new("ds", "DeepSeek").api_key("k");
        let core = AdapterCore::new(Vendor::DeepSeek, &settings).unwrap();
        assert_eq!(core.options.base_url, "https://api.deepseek.com");
        assert_eq!(core.options.api_key, "k");
        assert_eq!(core.models.len(), 2);
    }

    #[test]
    fn test_prepare_requires_key() {
        let core = AdapterCore::new(Vendor::OpenAI, &ProviderSettings::new("o", "OpenAI")).unwrap();
        assert!(matches!(
            core.prepare(&ProviderOptions::default()),
            Err(ProviderError::Authentication(_))
        ));

        let core = AdapterCore::new(Vendor::Ollama, &ProviderSettings::new("l", "Ollama")).unwrap();
        assert!(core.prepare(&ProviderOptions::default()).is_ok());
    }

    #[test]
    fn test_reserved_parameters_are_kept() {
        let mut body = json!({ "model": "a", "stream": true })
            .as_object()
            .cloned()
            .unwrap();
        let params = json!({ "model": "b", "temperature": 0.3 })
            .as_object()
            .cloned()
            .unwrap();

        merge_parameters(&mut body, &params, &["model", "stream"]);
        assert_eq!(body["model"], "a");
        assert_eq!(body["temperature"], 0.3);
    }

    #[tokio::test]
    async fn test_failed_request_yields_single_error() {
        struct Never;
        impl ChunkDecoder for Never {
            fn decode(&mut self, _data: &str) -> Vec<StreamEvent> {
                Vec::new()
            }
        }

        let core = AdapterCore::new(Vendor::Ollama, &ProviderSettings::new("l", "Ollama")).unwrap();
        let events: Vec<_> = core
            .stream(
                Err(ProviderError::Cancelled),
                Framing::Ndjson,
                Never,
                CancellationToken::new(),
            )
            .collect()
            .await;
        assert_eq!(events, vec![StreamEvent::Error(ProviderError::Cancelled)]);
    }
}
