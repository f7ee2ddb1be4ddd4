//! Google Gemini adapter with SSE streaming support

use super::{endpoint, AdapterCore};
use crate::{
    error::ProviderError,
    message::split_system,
    r#trait::{EventStream, ModelInfo, StreamEvent, TokenUsage, VendorAdapter},
    stream::{ChunkDecoder, Framing, StreamRequest},
    vendor::Vendor,
    Message, MessageRole,
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
    Ok(Arc::new(GeminiAdapter::new(vendor, settings)?))
}

/// Gemini adapter
pub struct GeminiAdapter {
    core: AdapterCore,
}

impl GeminiAdapter {
    pub fn new(vendor: Vendor, settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            core: AdapterCore::new(vendor, settings)?,
        })
    }

    fn build_request(&self, messages: &[Message], options: &ProviderOptions) -> StreamRequest {
        let (system, rest) = split_system(messages);

        let contents: Vec<Value> = rest
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = Map::new();
        body.insert("contents".into(), Value::Array(contents));
        if let Some(system) = system {
            body.insert(
                "systemInstruction".into(),
                json!({ "parts": [{ "text": system }] }),
            );
        }
        // temperature, topP 등은 generationConfig 안으로
        if !options.parameters.is_empty() {
            body.insert(
                "generationConfig".into(),
                Value::Object(options.parameters.clone()),
            );
        }

        let path = format!("models/{}:streamGenerateContent?alt=sse", options.model);

        StreamRequest {
            operation: self.core.operation(),
            url: endpoint(&options.base_url, &path),
            headers: vec![("x-goog-api-key", options.api_key.clone())],
            body: Value::Object(body),
        }
    }
}

#[async_trait]
impl VendorAdapter for GeminiAdapter {
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
            .stream(request, Framing::Sse, GeminiDecoder::default(), cancel)
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// `GenerateContentResponse` 청크 해석기
#[derive(Default)]
pub struct GeminiDecoder {
    usage: Option<TokenUsage>,
}

impl ChunkDecoder for GeminiDecoder {
    fn decode(&mut self, data: &str) -> Vec<StreamEvent> {
        let chunk = match serde_json::from_str::<GeminiStreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Failed to parse Gemini chunk: {} - data: {}", e, data);
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error {
            return vec![StreamEvent::Error(ProviderError::StreamError(error.message))];
        }

        let mut events = Vec::new();
        for candidate in chunk.candidates {
            let Some(content) = candidate.content else {
                continue;
            };
            for part in content.parts {
                let Some(text) = part.text.filter(|t| !t.is_empty()) else {
                    continue;
                };
                if part.thought {
                    events.push(StreamEvent::Thinking(text));
                } else {
                    events.push(StreamEvent::Text(text));
                }
            }
        }

        if let Some(usage) = chunk.usage_metadata {
            self.usage = Some(TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            });
        }

        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        self.usage.take().map(StreamEvent::Usage).into_iter().collect()
    }
}

// ============================================================================
// Gemini API Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FrameDecoder;

    #[test]
    fn test_request_shape() {
        let settings = ProviderSettings::new("gem", "Gemini")
            .api_key("g-key")
            .parameter("temperature", json!(0.5));
        let adapter = GeminiAdapter::new(Vendor::Gemini, &settings).unwrap();
        let options = adapter.core.prepare(&ProviderOptions::default()).unwrap();

        let request = adapter.build_request(
            &[
                Message::system("sys"),
                Message::user("hi"),
                Message::assistant("hello"),
            ],
            &options,
        );

        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
        assert!(request.headers.contains(&("x-goog-api-key", "g-key".to_string())));
        assert_eq!(request.body["contents"][1]["role"], "model");
        assert_eq!(request.body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(request.body["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn test_recorded_stream() {
        let recorded = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"plan\",\"thought\":true}],\"role\":\"model\"}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello\"}],\"role\":\"model\"}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"!\"}],\"role\":\"model\"},\"finishReason\":\"STOP\"}],",
            "\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":2,\"totalTokenCount\":6}}\r\n\r\n",
        );

        let events = FrameDecoder::new(Framing::Sse, GeminiDecoder::default()).decode_all(recorded);

        assert_eq!(
            events,
            vec![
                StreamEvent::Thinking("plan".into()),
                StreamEvent::Text("Hello".into()),
                StreamEvent::Text("!".into()),
                StreamEvent::Usage(TokenUsage {
                    input_tokens: 4,
                    output_tokens: 2
                }),
                StreamEvent::Done,
            ]
        );
    }
}
