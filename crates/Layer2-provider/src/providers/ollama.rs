//! Ollama adapter for local models (NDJSON streaming)

use super::{endpoint, AdapterCore};
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

pub(crate) fn create(
    vendor: Vendor,
    settings: &ProviderSettings,
) -> Result<Arc<dyn VendorAdapter>, ProviderError> {
    Ok(Arc::new(OllamaAdapter::new(vendor, settings)?))
}

/// Ollama adapter
pub struct OllamaAdapter {
    core: AdapterCore,
}

impl OllamaAdapter {
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
        if !options.parameters.is_empty() {
            body.insert("options".into(), Value::Object(options.parameters.clone()));
        }

        let mut headers = Vec::new();
        if !options.api_key.is_empty() {
            headers.push(("Authorization", format!("Bearer {}", options.api_key)));
        }

        StreamRequest {
            operation: self.core.operation(),
            url: endpoint(&options.base_url, "api/chat"),
            headers,
            body: Value::Object(body),
        }
    }
}

#[async_trait]
impl VendorAdapter for OllamaAdapter {
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
            .stream(request, Framing::Ndjson, OllamaDecoder, cancel)
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// `/api/chat` NDJSON 해석기
pub struct OllamaDecoder;

impl ChunkDecoder for OllamaDecoder {
    fn decode(&mut self, data: &str) -> Vec<StreamEvent> {
        let chunk = match serde_json::from_str::<OllamaStreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Failed to parse Ollama chunk: {} - line: {}", e, data);
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error {
            return vec![StreamEvent::Error(ProviderError::StreamError(error))];
        }

        let mut events = Vec::new();
        if let Some(message) = chunk.message {
            if !message.thinking.is_empty() {
                events.push(StreamEvent::Thinking(message.thinking));
            }
            if !message.content.is_empty() {
                events.push(StreamEvent::Text(message.content));
            }
        }

        if chunk.done {
            events.push(StreamEvent::Usage(TokenUsage {
                input_tokens: chunk.prompt_eval_count,
                output_tokens: chunk.eval_count,
            }));
            events.push(StreamEvent::Done);
        }

        events
    }
}

// ============================================================================
// Ollama API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: String,
}
