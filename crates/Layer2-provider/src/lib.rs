//! # tars-provider
//!
//! AI vendor adapters for Tars.
//! Every configured tag maps to one adapter with a unified streaming interface.
//!
//! ## Features
//! - SSE / NDJSON streaming with cancellation
//! - Automatic retry with exponential backoff on connection
//! - Closed vendor catalog (OpenAI-compatible family, Claude, Gemini, Ollama)
//! - Provider registry with lazy construction and cache invalidation

pub mod error;
pub mod message;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod stream;
pub mod r#trait;
pub mod vendor;

// Core traits and types
pub use message::{Message, MessageRole};
pub use r#trait::{
    merge_options, Capability, EventStream, ModelInfo, StreamEvent, TokenUsage, VendorAdapter,
};
pub use registry::{ProviderRegistry, RegistryConfig};
pub use stream::{ChunkDecoder, Frame, FrameDecoder, Framing};
pub use vendor::{Protocol, Vendor, VendorProfile};

// Error and retry
pub use error::ProviderError;
pub use retry::RetryConfig;

// Adapter implementations
pub use providers::anthropic::ClaudeAdapter;
pub use providers::gemini::GeminiAdapter;
pub use providers::ollama::OllamaAdapter;
pub use providers::openai::OpenAiCompatAdapter;

// Re-export for callers that cancel requests
pub use tokio_util::sync::CancellationToken;
