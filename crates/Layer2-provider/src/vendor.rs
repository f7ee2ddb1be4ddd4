//! Vendor catalog
//!
//! 지원 벤더는 닫힌 enum 으로 관리한다. 벤더마다 정적 프로필 하나
//! (기본 URL, 모델, 기능, 생성 함수)를 갖는다.

use crate::error::ProviderError;
use crate::providers::{anthropic, gemini, ollama, openai};
use crate::r#trait::{Capability, VendorAdapter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tars_foundation::{ProviderOptions, ProviderSettings};

/// Adapter constructor stored in the catalog
pub type AdapterFactory =
    fn(Vendor, &ProviderSettings) -> Result<Arc<dyn VendorAdapter>, ProviderError>;

/// Wire protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// `POST {base}/chat/completions`, SSE
    OpenAiCompatible,
    /// Anthropic messages API
    Claude,
    /// `streamGenerateContent?alt=sse`
    Gemini,
    /// `POST {base}/api/chat`, NDJSON
    Ollama,
}

/// Static description of a vendor
pub struct VendorProfile {
    pub display_name: &'static str,
    pub protocol: Protocol,
    pub default_base_url: &'static str,
    pub default_model: &'static str,
    pub models: &'static [&'static str],
    pub capabilities: &'static [Capability],
    pub key_url: &'static str,
    pub requires_key: bool,
    /// Delta field carrying reasoning text (OpenAI-compatible only)
    pub reasoning_field: Option<&'static str>,
    pub factory: AdapterFactory,
}

/// Supported vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    OpenAI,
    Claude,
    Gemini,
    DeepSeek,
    Grok,
    OpenRouter,
    SiliconFlow,
    Qwen,
    Kimi,
    Zhipu,
    Doubao,
    Ollama,
}

impl Vendor {
    pub const ALL: [Vendor; 12] = [
        Vendor::OpenAI,
        Vendor::Claude,
        Vendor::Gemini,
        Vendor::DeepSeek,
        Vendor::Grok,
        Vendor::OpenRouter,
        Vendor::SiliconFlow,
        Vendor::Qwen,
        Vendor::Kimi,
        Vendor::Zhipu,
        Vendor::Doubao,
        Vendor::Ollama,
    ];

    /// 대소문자 무시 이름 조회
    pub fn from_name(name: &str) -> Option<Vendor> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        self.profile().display_name
    }

    pub fn profile(&self) -> &'static VendorProfile {
        match self {
            Vendor::OpenAI => &OPENAI,
            Vendor::Claude => &CLAUDE,
            Vendor::Gemini => &GEMINI,
            Vendor::DeepSeek => &DEEPSEEK,
            Vendor::Grok => &GROK,
            Vendor::OpenRouter => &OPENROUTER,
            Vendor::SiliconFlow => &SILICONFLOW,
            Vendor::Qwen => &QWEN,
            Vendor::Kimi => &KIMI,
            Vendor::Zhipu => &ZHIPU,
            Vendor::Doubao => &DOUBAO,
            Vendor::Ollama => &OLLAMA,
        }
    }

    pub fn default_options(&self) -> ProviderOptions {
        let profile = self.profile();
        ProviderOptions {
            api_key: String::new(),
            base_url: profile.default_base_url.to_string(),
            model: profile.default_model.to_string(),
            parameters: Default::default(),
        }
    }

    /// 설정으로 어댑터 생성
    pub fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn VendorAdapter>, ProviderError> {
        (self.profile().factory)(*self, settings)
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Profiles
// ============================================================================

const TEXT: Capability = Capability::TextGeneration;
const VISION: Capability = Capability::ImageVision;
const REASONING: Capability = Capability::Reasoning;
const WEB: Capability = Capability::WebSearch;
const TOOLS: Capability = Capability::ToolCalling;

static OPENAI: VendorProfile = VendorProfile {
    display_name: "OpenAI",
    protocol: Protocol::OpenAiCompatible,
    default_base_url: "https://api.openai.com/v1",
    default_model: "gpt-4o-mini",
    models: &["gpt-4o-mini", "gpt-4o", "gpt-4.1", "o3-mini"],
    capabilities: &[TEXT, VISION, TOOLS],
    key_url: "https://platform.openai.com/api-keys",
    requires_key: true,
    reasoning_field: None,
    factory: openai::create,
};

static CLAUDE: VendorProfile = VendorProfile {
    display_name: "Claude",
    protocol: Protocol::Claude,
    default_base_url: "https://api.anthropic.com",
    default_model: "claude-sonnet-4-0",
    models: &["claude-sonnet-4-0", "claude-opus-4-0", "claude-3-5-haiku-latest"],
    capabilities: &[TEXT, VISION, REASONING, TOOLS],
    key_url: "https://console.anthropic.com",
    requires_key: true,
    reasoning_field: None,
    factory: anthropic::create,
};

static GEMINI: VendorProfile = VendorProfile {
    display_name: "Gemini",
    protocol: Protocol::Gemini,
    default_base_url: "https://generativelanguage.googleapis.com/v1beta",
    default_model: "gemini-2.0-flash",
    models: &["gemini-2.0-flash", "gemini-2.5-flash", "gemini-2.5-pro"],
    capabilities: &[TEXT, VISION, REASONING],
    key_url: "https://aistudio.google.com/app/apikey",
    requires_key: true,
    reasoning_field: None,
    factory: gemini::create,
};

static DEEPSEEK: VendorProfile = VendorProfile {
    display_name: "DeepSeek",
    protocol: Protocol::OpenAiCompatible,
    default_base_url: "https://api.deepseek.com",
    default_model: "deepseek-chat",
    models: &["deepseek-chat", "deepseek-reasoner"],
    capabilities: &[TEXT, REASONING],
    key_url: "https://platform.deepseek.com/api_keys",
    requires_key: true,
    reasoning_field: Some("reasoning_content"),
    factory: openai::create,
};

static GROK: VendorProfile = VendorProfile {
    display_name: "Grok",
    protocol: Protocol::OpenAiCompatible,
    default_base_url: "https://api.x.ai/v1",
    default_model: "grok-3",
    models: &["grok-3", "grok-3-mini"],
    capabilities: &[TEXT, REASONING, WEB],
    key_url: "https://console.x.ai",
    requires_key: true,
    reasoning_field: Some("reasoning_content"),
    factory: openai::create,
};

static OPENROUTER: VendorProfile = VendorProfile {
    display_name: "OpenRouter",
    protocol: Protocol::OpenAiCompatible,
    default_base_url: "https://openrouter.ai/api/v1",
    default_model: "openai/gpt-4o-mini",
    models: &["openai/gpt-4o-mini", "anthropic/claude-sonnet-4", "deepseek/deepseek-r1"],
    capabilities: &[TEXT, VISION, REASONING, WEB],
    key_url: "https://openrouter.ai/keys",
    requires_key: true,
    reasoning_field: Some("reasoning"),
    factory: openai::create,
};

static SILICONFLOW: VendorProfile = VendorProfile {
    display_name: "SiliconFlow",
    protocol: Protocol::OpenAiCompatible,
    default_base_url: "https://api.siliconflow.cn/v1",
    default_model: "deepseek-ai/DeepSeek-V3",
    models: &["deepseek-ai/DeepSeek-V3", "deepseek-ai/DeepSeek-R1", "Qwen/Qwen2.5-72B-Instruct"],
    capabilities: &[TEXT, REASONING],
    key_url: "https://cloud.siliconflow.cn/account/ak",
    requires_key: true,
    reasoning_field: Some("reasoning_content"),
    factory: openai::create,
};

static QWEN: VendorProfile = VendorProfile {
    display_name: "Qwen",
    protocol: Protocol::OpenAiCompatible,
    default_base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
    default_model: "qwen-plus",
    models: &["qwen-plus", "qwen-max", "qwen-turbo"],
    capabilities: &[TEXT, VISION, REASONING],
    key_url: "https://dashscope.console.aliyun.com/apiKey",
    requires_key: true,
    reasoning_field: Some("reasoning_content"),
    factory: openai::create,
};

static KIMI: VendorProfile = VendorProfile {
    display_name: "Kimi",
    protocol: Protocol::OpenAiCompatible,
    default_base_url: "https://api.moonshot.cn/v1",
    default_model: "moonshot-v1-auto",
    models: &["moonshot-v1-auto", "moonshot-v1-8k", "moonshot-v1-32k", "moonshot-v1-128k"],
    capabilities: &[TEXT],
    key_url: "https://platform.moonshot.cn/console/api-keys",
    requires_key: true,
    reasoning_field: None,
    factory: openai::create,
};

static ZHIPU: VendorProfile = VendorProfile {
    display_name: "Zhipu",
    protocol: Protocol::OpenAiCompatible,
    default_base_url: "https://open.bigmodel.cn/api/paas/v4",
    default_model: "glm-4-flash",
    models: &["glm-4-flash", "glm-4-plus", "glm-4-air"],
    capabilities: &[TEXT, WEB],
    key_url: "https://open.bigmodel.cn/usercenter/apikeys",
    requires_key: true,
    reasoning_field: None,
    factory: openai::create,
};

static DOUBAO: VendorProfile = VendorProfile {
    display_name: "Doubao",
    protocol: Protocol::OpenAiCompatible,
    default_base_url: "https://ark.cn-beijing.volces.com/api/v3",
    // Doubao 는 엔드포인트 ID 를 모델로 사용
    default_model: "",
    models: &[],
    capabilities: &[TEXT, REASONING],
    key_url: "https://console.volcengine.com/ark",
    requires_key: true,
    reasoning_field: Some("reasoning_content"),
    factory: openai::create,
};

static OLLAMA: VendorProfile = VendorProfile {
    display_name: "Ollama",
    protocol: Protocol::Ollama,
    default_base_url: "http://127.0.0.1:11434",
    default_model: "llama3.1",
    models: &["llama3.1", "qwen2.5", "deepseek-r1"],
    capabilities: &[TEXT, REASONING],
    key_url: "https://ollama.com",
    requires_key: false,
    reasoning_field: None,
    factory: ollama::create,
};
