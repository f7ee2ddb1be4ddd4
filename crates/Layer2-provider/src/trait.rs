//! Vendor adapter trait and common types
//!
//! ## 타입 의존성
//!
//! - `ProviderOptions`, `ProviderSettings`: Layer1-foundation 설정 모델
//! - `StreamEvent`: 이 레이어 고유 정의 (ProviderError 포함)
//! - `Vendor`: 벤더 카탈로그 (vendor.rs)

use crate::error::ProviderError;
use crate::vendor::Vendor;
use crate::Message;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tars_foundation::ProviderOptions;
use tokio_util::sync::CancellationToken;

/// Token usage reported by a vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

/// Events emitted during streaming
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Text content delta
    Text(String),

    /// Thinking/reasoning content (for models that support it)
    Thinking(String),

    /// Token usage update
    Usage(TokenUsage),

    /// Stream completed
    Done,

    /// Error occurred; the stream ends after it
    Error(ProviderError),
}

impl StreamEvent {
    /// `Done` 또는 `Error` - 이후 이벤트 없음
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

/// Boxed event stream returned by adapters
pub type EventStream<'a> = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'a>>;

/// What a vendor can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextGeneration,
    ImageVision,
    Reasoning,
    WebSearch,
    ToolCalling,
}

/// Model information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model ID (e.g., "deepseek-chat")
    pub id: String,

    /// Vendor name (e.g., "DeepSeek")
    pub vendor: String,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vendor: vendor.into(),
        }
    }
}

/// Merge per-call overrides over base options.
///
/// Non-empty strings win; parameters are merged key by key.
pub fn merge_options(base: &ProviderOptions, overrides: &ProviderOptions) -> ProviderOptions {
    fn pick(base: &str, over: &str) -> String {
        if over.trim().is_empty() {
            base.to_string()
        } else {
            over.to_string()
        }
    }

    let mut parameters = base.parameters.clone();
    for (key, value) in &overrides.parameters {
        parameters.insert(key.clone(), value.clone());
    }

    ProviderOptions {
        api_key: pick(&base.api_key, &overrides.api_key),
        base_url: pick(&base.base_url, &overrides.base_url),
        model: pick(&base.model, &overrides.model),
        parameters,
    }
}

/// AI vendor adapter
///
/// One instance per configured tag. The registry builds it lazily from
/// `ProviderSettings` and shares it as `Arc<dyn VendorAdapter>`.
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    /// Catalog entry this adapter was built from
    fn vendor(&self) -> Vendor;

    /// Tag from the settings entry
    fn tag(&self) -> &str;

    /// Effective options (vendor defaults merged with settings)
    fn options(&self) -> &ProviderOptions;

    /// Models offered by the vendor
    fn models(&self) -> &[ModelInfo];

    /// Send messages and get a streaming response
    fn send_request(
        &self,
        messages: Vec<Message>,
        overrides: &ProviderOptions,
        cancel: CancellationToken,
    ) -> EventStream<'_>;

    /// Display name (e.g., "DeepSeek")
    fn name(&self) -> &str {
        self.vendor().profile().display_name
    }

    fn capabilities(&self) -> &'static [Capability] {
        self.vendor().profile().capabilities
    }

    fn website_to_obtain_key(&self) -> &'static str {
        self.vendor().profile().key_url
    }

    fn default_options(&self) -> ProviderOptions {
        self.vendor().default_options()
    }

    /// Collect the streamed text (thinking is dropped)
    async fn complete(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<String, ProviderError> {
        let mut stream = self.send_request(messages, &ProviderOptions::default(), cancel);
        let mut content = String::new();

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Text(text) => content.push_str(&text),
                StreamEvent::Error(e) => return Err(e),
                StreamEvent::Done => break,
                StreamEvent::Thinking(_) | StreamEvent::Usage(_) => {}
            }
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_options() {
        let mut base = ProviderOptions {
            api_key: "base-key".into(),
            base_url: "https://api.example.com".into(),
            model: "m1".into(),
            ..Default::default()
        };
        base.parameters.insert("temperature".into(), json!(0.7));

        let mut overrides = ProviderOptions {
            model: "m2".into(),
            ..Default::default()
        };
        overrides.parameters.insert("temperature".into(), json!(0.1));
        overrides.parameters.insert("top_p".into(), json!(0.9));

        let merged = merge_options(&base, &overrides);
        assert_eq!(merged.api_key, "base-key");
        assert_eq!(merged.model, "m2");
        assert_eq!(merged.parameters["temperature"], json!(0.1));
        assert_eq!(merged.parameters["top_p"], json!(0.9));
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::Error(ProviderError::Cancelled).is_terminal());
        assert!(!StreamEvent::Text("x".into()).is_terminal());
    }
}
