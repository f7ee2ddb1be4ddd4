//! Settings - 플러그인 설정 데이터 모델
//!
//! - `PluginSettings` - 루트 설정 (프로바이더 목록 + 일반 옵션)
//! - `ProviderSettings` - 태그 하나에 대응하는 AI 벤더 설정
//! - `store.rs` - JSON 파일 저장소 (data.json)
//!
//! 저장된 JSON은 `#[serde(default)]` 덕분에 기본값 위에 필드 단위로 병합된다.

mod store;

pub use store::{JsonStore, SETTINGS_FILE};

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 일반(프로바이더 외) 설정 필드 목록 - 변경 감지 대상
///
/// 이름은 직렬화된 JSON 키(camelCase)와 같다.
pub const GENERAL_FIELDS: &[&str] = &[
    "systemTags",
    "userTags",
    "newChatTags",
    "roleEmojis",
    "defaultSystemMsg",
    "enableDefaultSystemMsg",
    "enableInternalLink",
    "enableInternalLinkForAssistantMsg",
    "confirmRegenerate",
    "enableTagSuggest",
    "enableReplaceTag",
    "enableExportToJSON",
    "enableStreamLog",
    "answerDelayInMilliseconds",
    "mcpConcurrentLimit",
    "mcpSessionLimit",
    "mcpGlobalTimeout",
];

// ============================================================================
// ProviderOptions
// ============================================================================

/// 벤더 호출 옵션
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderOptions {
    /// API 키
    pub api_key: String,

    /// Base URL (빈 문자열이면 벤더 기본값)
    #[serde(rename = "baseURL")]
    pub base_url: String,

    /// 모델 ID
    pub model: String,

    /// 요청 본문에 그대로 병합되는 추가 파라미터 (temperature 등)
    pub parameters: Map<String, Value>,
}

// ============================================================================
// ProviderSettings
// ============================================================================

/// 개별 프로바이더 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// 사용자가 지정한 고유 키 (노트에서 `#tag:` 로 호출)
    pub tag: String,

    /// 벤더 이름 (예: "OpenAI", "Claude")
    pub vendor: String,

    /// 호출 옵션
    pub options: ProviderOptions,
}

impl ProviderSettings {
    pub fn new(tag: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            vendor: vendor.into(),
            options: ProviderOptions::default(),
        }
    }

    // 빌더
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.options.api_key = key.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.options.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = model.into();
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.parameters.insert(key.into(), value);
        self
    }
}

// ============================================================================
// PluginSettings
// ============================================================================

/// Tars 루트 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginSettings {
    /// 설정된 프로바이더 (순서 유지, tag 중복은 검증 단계에서 거부)
    pub providers: Vec<ProviderSettings>,

    pub system_tags: Vec<String>,
    pub user_tags: Vec<String>,
    pub new_chat_tags: Vec<String>,

    /// role → emoji
    pub role_emojis: BTreeMap<String, String>,

    pub default_system_msg: String,
    pub enable_default_system_msg: bool,

    pub enable_internal_link: bool,
    pub enable_internal_link_for_assistant_msg: bool,
    pub confirm_regenerate: bool,
    pub enable_tag_suggest: bool,
    pub enable_replace_tag: bool,
    #[serde(rename = "enableExportToJSON")]
    pub enable_export_to_json: bool,
    pub enable_stream_log: bool,

    /// 응답 시작 전 지연 (ms)
    pub answer_delay_in_milliseconds: u64,

    // MCP 한도
    pub mcp_concurrent_limit: u32,
    pub mcp_session_limit: u32,
    /// 전역 타임아웃 (ms)
    pub mcp_global_timeout: u64,
}

impl Default for PluginSettings {
    fn default() -> Self {
        let role_emojis = [
            ("assistant", "✨"),
            ("system", "🔧"),
            ("newChat", "🚀"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            providers: Vec::new(),
            system_tags: vec!["System".to_string(), "系统".to_string()],
            user_tags: vec!["User".to_string(), "我".to_string()],
            new_chat_tags: vec!["NewChat".to_string(), "新对话".to_string()],
            role_emojis,
            default_system_msg: String::new(),
            enable_default_system_msg: false,
            enable_internal_link: true,
            enable_internal_link_for_assistant_msg: false,
            confirm_regenerate: true,
            enable_tag_suggest: true,
            enable_replace_tag: false,
            enable_export_to_json: true,
            enable_stream_log: false,
            answer_delay_in_milliseconds: 2000,
            mcp_concurrent_limit: 3,
            mcp_session_limit: 5,
            mcp_global_timeout: 30_000,
        }
    }
}

impl PluginSettings {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 저장된 JSON 값을 기본값 위에 병합
    pub fn from_persisted(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// 저장소에서 로드 (파일이 없으면 기본값)
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<PluginSettings>(SETTINGS_FILE)?
            .unwrap_or_default())
    }

    /// 저장소에 저장
    pub fn save_to(&self, store: &JsonStore) -> Result<()> {
        store.save(SETTINGS_FILE, self)
    }

    // ========================================================================
    // Provider 조회
    // ========================================================================

    /// tag 로 조회 (중복 시 첫 번째)
    pub fn find_provider(&self, tag: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.tag == tag)
    }

    /// tag 로 가변 조회
    pub fn find_provider_mut(&mut self, tag: &str) -> Option<&mut ProviderSettings> {
        self.providers.iter_mut().find(|p| p.tag == tag)
    }

    /// 벤더 이름으로 조회 (대소문자 무시, 첫 번째)
    pub fn find_provider_by_vendor(&self, vendor: &str) -> Option<&ProviderSettings> {
        self.providers
            .iter()
            .find(|p| p.vendor.eq_ignore_ascii_case(vendor))
    }

    /// 모든 tag
    pub fn tags(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.tag.as_str()).collect()
    }

    // ========================================================================
    // 일반 필드
    // ========================================================================

    /// `GENERAL_FIELDS` 순서대로 (필드명, JSON 값) 목록을 반환
    pub fn general_values(&self) -> Result<Vec<(&'static str, Value)>> {
        let value = serde_json::to_value(self)?;
        let Value::Object(mut map) = value else {
            return Err(crate::Error::Internal(
                "settings did not serialize to an object".to_string(),
            ));
        };

        Ok(GENERAL_FIELDS
            .iter()
            .map(|name| (*name, map.remove(*name).unwrap_or(Value::Null)))
            .collect())
    }
}
