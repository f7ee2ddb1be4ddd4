//! Anthropic (Claude) adapter with SSE streaming

use super::{endpoint, merge_parameters, AdapterCore};
use crate::{
    error::ProviderError,
    message::split_system,
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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const RESERVED_KEYS: &[&str] = &["model", "messages", "system", "stream"];

pub(crate) fn create(
    vendor: Vendor,
    settings: &ProviderSettings,
) -> Result<Arc<dyn VendorAdapter>, ProviderError> {
    Ok(Arc::new(ClaudeAdapter::new(vendor, settings)?))
}

/// Claude adapter
pub struct ClaudeAdapter {
    core: AdapterCore,
}

impl ClaudeAdapter {
    pub fn new(vendor: Vendor, settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            core: AdapterCore::new(vendor, settings)?,
        })
    }

    fn build_request(&self, messages: &[Message], options: &ProviderOptions) -> StreamRequest {
        let (system, rest) = split_system(messages);

        let api_messages: Vec<Value> = rest
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = Map::new();
        body.insert("model".into(), json!(options.model));
        body.insert("messages".into(), Value::Array(api_messages));
        body.insert("max_tokens".into(), json!(DEFAULT_MAX_TOKENS));
        body.insert("stream".into(), json!(true));
        if let Some(system) = system {
            body.insert("system".into(), json!(system));
        }
        merge_parameters(&mut body, &options.parameters, RESERVED_KEYS);

        StreamRequest {
            operation: self.core.operation(),
            url: endpoint(&options.base_url, "v1/messages"),
            headers: vec![
                ("x-api-key", options.api_key.clone()),
                ("anthropic-version", ANTHROPIC_VERSION.to_string()),
            ],
            body: Value::Object(body),
        }
    }
}

#[async_trait]
impl VendorAdapter for ClaudeAdapter {
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
            .stream(request, Framing::Sse, ClaudeDecoder::default(), cancel)
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Claude SSE 이벤트 해석기
#[derive(Default)]
pub struct ClaudeDecoder {
    usage: TokenUsage,
}

impl ChunkDecoder for ClaudeDecoder {
    fn decode(&mut self, data: &str) -> Vec<StreamEvent> {
        let event = match serde_json::from_str::<ClaudeStreamEvent>(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Failed to parse Claude event: {} - data: {}", e, data);
                return Vec::new();
            }
        };

        match event {
            ClaudeStreamEvent::MessageStart { message } => {
                if let Some(u) = message.usage {
                    self.usage.input_tokens = u.input_tokens;
                    self.usage.output_tokens = u.output_tokens;
                }
                Vec::new()
            }
            ClaudeStreamEvent::ContentBlockDelta { delta } => match delta {
                ContentDelta::TextDelta { text } if !text.is_empty() => {
                    vec![StreamEvent::Text(text)]
                }
                ContentDelta::ThinkingDelta { thinking } if !thinking.is_empty() => {
                    vec![StreamEvent::Thinking(thinking)]
                }
                _ => Vec::new(),
            },
            ClaudeStreamEvent::MessageDelta { usage } => {
                if let Some(u) = usage {
                    self.usage.output_tokens = u.output_tokens;
                }
                Vec::new()
            }
            ClaudeStreamEvent::MessageStop => {
                vec![StreamEvent::Usage(self.usage), StreamEvent::Done]
            }
            ClaudeStreamEvent::Error { error } => {
                let err = match error.error_type.as_str() {
                    "overloaded_error" => ProviderError::ServerError(error.message),
                    "rate_limit_error" => ProviderError::RateLimited {
                        retry_after_ms: None,
                    },
                    _ => ProviderError::StreamError(error.message),
                };
                vec![StreamEvent::Error(err)]
            }
            ClaudeStreamEvent::Other => Vec::new(),
        }
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.usage.is_empty() {
            Vec::new()
        } else {
            vec![StreamEvent::Usage(self.usage)]
        }
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeStreamEvent {
    MessageStart {
        message: MessageStartData,
    },
    ContentBlockDelta {
        delta: ContentDelta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<MessageDeltaUsage>,
    },
    MessageStop,
    Error {
        error: ErrorData,
    },
    /// ping, content_block_start, content_block_stop
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStartData {
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaUsage {
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(rename = "type", default)]
    error_type: String,
    message: String,
}
