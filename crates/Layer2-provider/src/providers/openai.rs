//! OpenAI-compatible adapter with SSE streaming support
//!
//! OpenAI, DeepSeek, Grok, OpenRouter, SiliconFlow, Qwen, Kimi, Zhipu, Doubao
//! 가 같은 `/chat/completions` 포맷을 쓴다. 벤더 차이는 프로필
//! (기본 URL, reasoning 필드명)으로만 표현한다.

use super::{endpoint, merge_parameters, AdapterCore};
use crate::{
    error::ProviderError,
    r#trait::{EventStream, ModelInfo, StreamEvent, TokenUsage, VendorAdapter},
    stream::{ChunkDecoder, Framing, StreamRequest},
    vendor::Vendor,
    Message,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tars_foundation::{ProviderOptions, ProviderSettings};
use tokio_util::sync::CancellationToken;

const RESERVED_KEYS: &[&str] = &["model", "messages", "stream", "stream_options"];

pub(crate) fn create(
    vendor: Vendor,
    settings: &ProviderSettings,
) -> Result<Arc<dyn VendorAdapter>, ProviderError> {
    Ok(Arc::new(OpenAiCompatAdapter::new(vendor, settings)?))
}

/// OpenAI-compatible adapter
pub struct OpenAiCompatAdapter {
    core: AdapterCore,
}

impl OpenAiCompatAdapter {
    pub fn new(vendor: Vendor, settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            core: AdapterCore::new(vendor, settings)?,
        })
    }

    fn build_request(&self, messages: &[Message], options: &ProviderOptions) -> StreamRequest {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = Map::new();
        body.insert("model".into(), json!(options.model));
        body.insert("messages".into(), Value::Array(api_messages));
        body.insert("stream".into(), json!(true));
        body.insert("stream_options".into(), json!({ "include_usage": true }));
        merge_parameters(&mut body, &options.parameters, RESERVED_KEYS);

        let mut headers = vec![("Accept", "text/event-stream".to_string())];
        if !options.api_key.is_empty() {
            headers.push(("Authorization", format!("Bearer {}", options.api_key)));
        }

        StreamRequest {
            operation: self.core.operation(),
            url: endpoint(&options.base_url, "chat/completions"),
            headers,
            body: Value::Object(body),
        }
    }

    fn decoder(&self) -> OpenAiDecoder {
        OpenAiDecoder::new(self.core.vendor.profile().reasoning_field)
    }
}

#[async_trait]
impl VendorAdapter for OpenAiCompatAdapter {
    fn vendor(&self) -> Vendor {
        self.core.vendor
    }

    fn tag(&self) -> &str {
        &self.core.tag
    }

    fn options(&self) -> &ProviderOptions {
        &self.core.options
    }

    fn models(&self) -> &[ModelInfo] {
        &self.core.models
    }

    fn send_request(
        &self,
        messages: Vec<Message>,
        overrides: &ProviderOptions,
        cancel: CancellationToken,
    ) -> EventStream<'_> {
        let request = self
            .core
            .prepare(overrides)
            .map(|options| self.build_request(&messages, &options));
        self.core
            .stream(request, Framing::Sse, self.decoder(), cancel)
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// `chat.completion.chunk` 해석기
pub struct OpenAiDecoder {
    reasoning_field: Option<&'static str>,
    usage: Option<TokenUsage>,
}

impl OpenAiDecoder {
    pub fn new(reasoning_field: Option<&'static str>) -> Self {
        Self {
            reasoning_field,
            usage: None,
        }
    }
}

impl ChunkDecoder for OpenAiDecoder {
    fn decode(&mut self, data: &str) -> Vec<StreamEvent> {
        let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Failed to parse SSE chunk: {} - data: {}", e, data);
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error {
            return vec![StreamEvent::Error(ProviderError::StreamError(error.message))];
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            let delta = choice.delta;

            if let Some(reasoning) = self
                .reasoning_field
                .and_then(|field| delta.extra.get(field))
                .and_then(Value::as_str)
            {
                if !reasoning.is_empty() {
                    events.push(StreamEvent::Thinking(reasoning.to_string()));
                }
            }

            if let Some(content) = delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::Text(content));
                }
            }
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        self.usage.take().map(StreamEvent::Usage).into_iter().collect()
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    /// reasoning_content / reasoning 등 벤더별 필드
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
