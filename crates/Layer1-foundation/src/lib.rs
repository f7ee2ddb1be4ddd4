//! # tars-foundation
//!
//! Foundation layer for Tars:
//! - Settings: 플러그인 설정 모델 + JSON 저장소 (data.json)
//! - Change: 설정 스냅샷 비교 (프로바이더 추가/삭제/수정, 일반 필드 수정)
//! - Event: 리스너별 에러 격리를 갖춘 동기 이벤트 버스
//! - Error: 전체 워크스페이스가 공유하는 에러 타입
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  PluginSettings (prev)      PluginSettings (new)         │
//! │          │                          │                    │
//! │          └──────────┬───────────────┘                    │
//! │                     ▼                                    │
//! │             detect_changes()                             │
//! │                     │                                    │
//! │                     ▼                                    │
//! │   SettingsChanges { providers[], general[] }             │
//! │                     │                                    │
//! │                     ▼                                    │
//! │           EventBus::publish()  ──▶ listeners             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod change;
pub mod error;
pub mod event;
pub mod logging;
pub mod settings;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result, ValidationIssue};

// ============================================================================
// Settings
// ============================================================================
pub use settings::{
    JsonStore, PluginSettings, ProviderOptions, ProviderSettings, GENERAL_FIELDS, SETTINGS_FILE,
};

// ============================================================================
// Change detection
// ============================================================================
pub use change::{
    apply_field_changes, detect_changes, ChangeKind, FieldChange, GeneralSettingChange,
    ProviderChange, SettingsChanges, PROVIDER_FIELDS,
};

// ============================================================================
// Event
// ============================================================================
pub use event::{
    BusEvent, DispatchReport, EventBus, EventBusConfig, EventListener, ListenerFailure,
    ListenerId,
};

// ============================================================================
// Logging
// ============================================================================
pub use logging::{init_logging, LogConfig};
