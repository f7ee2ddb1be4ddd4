//! tars-core: settings pipeline and plugin container for Tars
//!
//! Layer2 - 설정 변경 전파 + DI 컨테이너
//!
//! # 주요 모듈
//!
//! - `container`: 단방향 생명주기를 가진 DI scope 래퍼
//! - `notifier`: 설정 변경 감지 + 동기 브로드캐스트 + 이력/메트릭
//! - `binding`: 변경을 검증 후 프로바이더 레지스트리에 반영
//! - `validation`: 전체 설정 검증
//! - `facade`: 프로그램 방식의 설정 수정 진입점
//! - `host`: 호스트 앱 경계 (저장, 알림)
//!
//! # 사용 예시
//!
//! ```ignore
//! use tars_core::{ContainerConfig, FileHost, PluginContainer};
//!
//! let host = Arc::new(FileHost::new("vault", vault_dir));
//! let settings = host.load_settings()?;
//!
//! let container = PluginContainer::new();
//! container.initialize(host, settings, ContainerConfig::default()).await?;
//!
//! // 설정 수정 → notifier → binding → registry
//! container.facade()?.update_provider("openai", |p| p.options.api_key = key)?;
//!
//! let adapter = container.registry()?.get_provider("openai");
//!
//! container.dispose().await;
//! ```

pub mod binding;
pub mod container;
pub mod facade;
pub mod host;
pub mod notifier;
pub mod validation;

pub use binding::{BindingConfig, BindingEvent, BindingStats, ConfigBindingService};
pub use container::{
    tokens, ContainerConfig, ContainerState, ContainerStats, PluginContainer, ResolutionError,
    Scope, StateTransition, Token,
};
pub use facade::SettingsFacade;
pub use host::{FileHost, HostApp};
pub use notifier::{
    ChangeMetrics, NotifierConfig, NotifierEvent, SettingsChangeEvent, SettingsChangeNotifier,
};
pub use validation::SettingsValidator;

// Re-export foundation / provider
pub use tars_foundation::{Error, PluginSettings, ProviderSettings, Result};
pub use tars_provider::{ProviderRegistry, VendorAdapter};
