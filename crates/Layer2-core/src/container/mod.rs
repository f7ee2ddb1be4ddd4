//! Plugin Container - DI scope 래퍼
//!
//! 플러그인 로드 시 한 번 초기화되고, 언로드 시 한 번 정리된다.
//!
//! ```text
//! PluginContainer
//!   ├── state: Uninitialized → Configured → Ready → Disposed
//!   └── scope
//!         ├── App, Settings              (값)
//!         ├── SettingsChangeNotifier     (지연 싱글톤)
//!         ├── ProviderRegistry           (지연 싱글톤)
//!         ├── SettingsValidator          (지연 싱글톤)
//!         ├── ConfigBindingService       (notifier, registry, validator)
//!         └── SettingsFacade             (app, notifier, validator)
//! ```

mod scope;
mod state;
mod token;

pub use scope::Scope;
pub use state::{ContainerState, StateTransition};
pub use token::{tokens, Token};

use crate::binding::{BindingConfig, ConfigBindingService};
use crate::facade::SettingsFacade;
use crate::host::HostApp;
use crate::notifier::SettingsChangeNotifier;
use crate::validation::SettingsValidator;
use parking_lot::{Mutex, RwLock};
use scope::ScopeCounters;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tars_foundation::{BusEvent, Error, EventBus, ListenerId, PluginSettings, Result};
use tars_provider::{ProviderRegistry, RegistryConfig};
use tracing::{debug, error, info};

// ============================================================================
// Config / Stats
// ============================================================================

/// Container configuration
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// resolve 로그를 debug 레벨로
    pub debug: bool,
    /// 바인딩 서비스의 설정 검증
    pub enable_validation: bool,
    /// 레지스트리 어댑터 캐시
    pub enable_cache: bool,
    /// 초기화 직후 바인딩 서비스 구독
    pub auto_bind: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            enable_validation: true,
            enable_cache: true,
            auto_bind: true,
        }
    }
}

impl ContainerConfig {
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    pub fn with_cache(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub fn with_auto_bind(mut self, enable: bool) -> Self {
        self.auto_bind = enable;
        self
    }
}

/// Container 통계
#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    /// 성공한 resolve 호출
    pub resolutions: u64,
    /// 실패한 resolve 호출
    pub failures: u64,
    /// 이미 만들어진 인스턴스 재사용 (중첩 resolve 포함)
    pub cache_hits: u64,
    pub instances_created: u64,
    pub init_duration: Option<Duration>,
}

/// resolve 실패 알림
#[derive(Debug, Clone)]
pub struct ResolutionError {
    pub token: String,
    pub message: String,
}

impl BusEvent for ResolutionError {
    fn topic(&self) -> &'static str {
        "resolutionError"
    }
}

// ============================================================================
// PluginContainer
// ============================================================================

pub struct PluginContainer {
    state: RwLock<ContainerState>,
    config: RwLock<ContainerConfig>,
    scope: RwLock<Option<Arc<Scope>>>,
    transitions: Mutex<Vec<StateTransition>>,
    counters: Arc<ScopeCounters>,
    resolutions: AtomicU64,
    failures: AtomicU64,
    init_duration: Mutex<Option<Duration>>,
    errors: EventBus<ResolutionError>,
}

impl Default for PluginContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginContainer {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ContainerState::Uninitialized),
            config: RwLock::new(ContainerConfig::default()),
            scope: RwLock::new(None),
            transitions: Mutex::new(Vec::new()),
            counters: Arc::new(ScopeCounters::default()),
            resolutions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            init_duration: Mutex::new(None),
            errors: EventBus::new("container-errors"),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// 호스트 핸들과 설정 스냅샷으로 초기화
    ///
    /// `Uninitialized` 가 아니면 (정리 이후 포함) `AlreadyInitialized`.
    /// 자동 바인딩에 실패하면 `Uninitialized` 로 되돌린다.
    pub async fn initialize(
        &self,
        app: Arc<dyn HostApp>,
        settings: PluginSettings,
        config: ContainerConfig,
    ) -> Result<()> {
        let started = Instant::now();

        {
            let mut state = self.state.write();
            if *state != ContainerState::Uninitialized {
                return Err(Error::AlreadyInitialized(format!(
                    "container is {}",
                    *state
                )));
            }
            self.transition(&mut state, ContainerState::Configured);
        }

        info!(
            app = app.app_name(),
            providers = settings.providers.len(),
            "Initializing plugin container"
        );

        let scope = Arc::new(Scope::with_counters(
            app.app_name(),
            config.debug,
            Arc::clone(&self.counters),
        ));
        register_defaults(&scope, app, settings, &config);

        *self.config.write() = config.clone();
        *self.scope.write() = Some(Arc::clone(&scope));

        if config.auto_bind {
            if let Err(e) = scope.resolve(&tokens::BINDING).map(|binding| binding.bind()) {
                error!("Container initialization failed: {}", e);
                self.scope.write().take();
                let mut state = self.state.write();
                self.transition(&mut state, ContainerState::Uninitialized);
                return Err(e);
            }
        }

        {
            let mut state = self.state.write();
            self.transition(&mut state, ContainerState::Ready);
        }

        let elapsed = started.elapsed();
        *self.init_duration.lock() = Some(elapsed);
        info!(duration_ms = elapsed.as_millis() as u64, "Plugin container ready");
        Ok(())
    }

    /// 정리. 여러 번 호출해도 안전하다
    pub async fn dispose(&self) {
        let scope = {
            let mut state = self.state.write();
            match *state {
                ContainerState::Uninitialized | ContainerState::Disposed => {
                    debug!(state = %*state, "Dispose skipped");
                    return;
                }
                ContainerState::Configured | ContainerState::Ready => {}
            }
            self.transition(&mut state, ContainerState::Disposed);
            self.scope.write().take()
        };

        if let Some(scope) = scope {
            // 만들어진 적 없는 서비스는 새로 만들지 않는다
            if let Some(binding) = scope.cached(&tokens::BINDING) {
                binding.unbind();
            }
            scope.clear();
        }

        let stats = self.stats();
        info!(
            resolutions = stats.resolutions,
            failures = stats.failures,
            cache_hits = stats.cache_hits,
            "Plugin container disposed"
        );
    }

    fn transition(&self, state: &mut ContainerState, next: ContainerState) {
        debug_assert!(state.can_transition_to(next), "{} -> {}", state, next);
        debug!(from = %*state, to = %next, "Container state transition");
        self.transitions
            .lock()
            .push(StateTransition::new(*state, next));
        *state = next;
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    pub fn resolve<T>(&self, token: &Token<T>) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let resolved = self
            .ready_scope(token.name())
            .and_then(|scope| scope.resolve(token));

        match resolved {
            Ok(value) => {
                self.resolutions.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.errors.publish(&ResolutionError {
                    token: token.name().to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn ready_scope(&self, token: &str) -> Result<Arc<Scope>> {
        let state = *self.state.read();
        if !state.is_ready() {
            return Err(Error::NotInitialized(format!(
                "cannot resolve '{}' while container is {}",
                token, state
            )));
        }
        self.scope
            .read()
            .clone()
            .ok_or_else(|| Error::NotInitialized(format!("no scope for '{}'", token)))
    }

    fn active_scope(&self) -> Result<Arc<Scope>> {
        self.scope
            .read()
            .clone()
            .ok_or_else(|| Error::NotInitialized(format!("container is {}", self.state())))
    }

    /// 추가 factory 등록 (초기화 이후)
    pub fn register_factory<T, F>(&self, token: &Token<T>, factory: F) -> Result<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Scope) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.active_scope()?.register_factory(token, factory);
        Ok(())
    }

    /// 추가 값 바인딩 (초기화 이후)
    pub fn bind_value<T>(&self, token: &Token<T>, value: Arc<T>) -> Result<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.active_scope()?.bind_value(token, value);
        Ok(())
    }

    // ========================================================================
    // Shortcuts
    // ========================================================================

    pub fn notifier(&self) -> Result<Arc<SettingsChangeNotifier>> {
        self.resolve(&tokens::NOTIFIER)
    }

    pub fn registry(&self) -> Result<Arc<ProviderRegistry>> {
        self.resolve(&tokens::REGISTRY)
    }

    pub fn binding(&self) -> Result<Arc<ConfigBindingService>> {
        self.resolve(&tokens::BINDING)
    }

    pub fn facade(&self) -> Result<Arc<SettingsFacade>> {
        self.resolve(&tokens::FACADE)
    }

    // ========================================================================
    // Error handlers
    // ========================================================================

    /// resolve 실패 시 호출 (에러 반환 전)
    pub fn on_error<F>(&self, name: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&ResolutionError) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.errors.subscribe_fn(name, handler)
    }

    pub fn off_error(&self, id: ListenerId) -> bool {
        self.errors.unsubscribe(id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> ContainerState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn config(&self) -> ContainerConfig {
        self.config.read().clone()
    }

    pub fn transitions(&self) -> Vec<StateTransition> {
        self.transitions.lock().clone()
    }

    pub fn stats(&self) -> ContainerStats {
        ContainerStats {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            instances_created: self.counters.instances_created.load(Ordering::Relaxed),
            init_duration: *self.init_duration.lock(),
        }
    }
}

fn register_defaults(
    scope: &Scope,
    app: Arc<dyn HostApp>,
    settings: PluginSettings,
    config: &ContainerConfig,
) {
    scope.bind_value(&tokens::APP, app);
    scope.bind_value(&tokens::SETTINGS, Arc::new(settings));

    scope.register_factory(&tokens::VALIDATOR, |_| Ok(Arc::new(SettingsValidator::new())));

    scope.register_factory(&tokens::NOTIFIER, |scope| {
        let settings = scope.resolve(&tokens::SETTINGS)?;
        Ok(Arc::new(SettingsChangeNotifier::new((*settings).clone())))
    });

    let registry_config = RegistryConfig::default().with_cache(config.enable_cache);
    scope.register_factory(&tokens::REGISTRY, move |scope| {
        let settings = scope.resolve(&tokens::SETTINGS)?;
        Ok(Arc::new(ProviderRegistry::with_config(
            (*settings).clone(),
            registry_config.clone(),
        )))
    });

    let binding_config = BindingConfig::default().with_validation(config.enable_validation);
    scope.register_factory(&tokens::BINDING, move |scope| {
        Ok(Arc::new(ConfigBindingService::new(
            scope.resolve(&tokens::NOTIFIER)?,
            scope.resolve(&tokens::REGISTRY)?,
            scope.resolve(&tokens::VALIDATOR)?,
            binding_config.clone(),
        )))
    });

    let validate_updates = config.enable_validation;
    scope.register_factory(&tokens::FACADE, move |scope| {
        let facade = SettingsFacade::new(
            scope.resolve(&tokens::APP)?,
            scope.resolve(&tokens::NOTIFIER)?,
        );
        if validate_updates {
            Ok(Arc::new(facade.with_validator(scope.resolve(&tokens::VALIDATOR)?)))
        } else {
            Ok(Arc::new(facade))
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FileHost;
    use tempfile::TempDir;

    fn host(dir: &TempDir) -> Arc<dyn HostApp> {
        Arc::new(FileHost::new("test-vault", dir.path()))
    }

    #[test]
    fn test_resolve_before_initialize() {
        let container = PluginContainer::new();

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        container.on_error("test", move |e| {
            sink.lock().push(e.token.clone());
            Ok(())
        });

        assert!(matches!(
            container.notifier(),
            Err(Error::NotInitialized(_))
        ));
        assert_eq!(container.stats().failures, 1);
        assert_eq!(reported.lock().as_slice(), &["SettingsChangeNotifier".to_string()]);

        // 초기화 전 dispose 는 아무 일도 하지 않는다
        tokio_test::block_on(container.dispose());
        assert_eq!(container.state(), ContainerState::Uninitialized);
    }

    #[tokio::test]
    async fn test_resolution_failure_wraps_cause() {
        const MISSING: Token<String> = Token::new("Missing");

        let dir = TempDir::new().unwrap();
        let container = PluginContainer::new();
        container
            .initialize(host(&dir), PluginSettings::default(), ContainerConfig::default())
            .await
            .unwrap();

        let err = container.resolve(&MISSING).unwrap_err();
        assert!(matches!(err, Error::ResolutionFailed { ref token, .. } if token == "Missing"));

        container
            .register_factory(&MISSING, |scope| {
                let app = scope.resolve(&tokens::APP)?;
                Ok(Arc::new(app.app_name().to_string()))
            })
            .unwrap();
        assert_eq!(container.resolve(&MISSING).unwrap().as_str(), "test-vault");
    }

    #[tokio::test]
    async fn test_initialize_twice() {
        let dir = TempDir::new().unwrap();
        let container = PluginContainer::new();

        container
            .initialize(host(&dir), PluginSettings::default(), ContainerConfig::default())
            .await
            .unwrap();
        assert_eq!(container.state(), ContainerState::Ready);
        assert!(container.binding().unwrap().is_bound());

        let err = container
            .initialize(host(&dir), PluginSettings::default(), ContainerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized(_)));
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let container = PluginContainer::new();

        container.dispose().await;
        assert_eq!(container.state(), ContainerState::Uninitialized);

        container
            .initialize(host(&dir), PluginSettings::default(), ContainerConfig::default())
            .await
            .unwrap();
        let notifier = container.notifier().unwrap();
        assert_eq!(notifier.listener_count(), 1);

        container.dispose().await;
        container.dispose().await;
        assert_eq!(container.state(), ContainerState::Disposed);
        assert_eq!(notifier.listener_count(), 0);

        assert!(matches!(
            container.notifier(),
            Err(Error::NotInitialized(_))
        ));
        assert!(matches!(
            container
                .initialize(host(&dir), PluginSettings::default(), ContainerConfig::default())
                .await,
            Err(Error::AlreadyInitialized(_))
        ));

        let states: Vec<ContainerState> = container.transitions().iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                ContainerState::Configured,
                ContainerState::Ready,
                ContainerState::Disposed
            ]
        );
    }

    #[tokio::test]
    async fn test_singletons_are_shared() {
        let dir = TempDir::new().unwrap();
        let container = PluginContainer::new();
        container
            .initialize(
                host(&dir),
                PluginSettings::default(),
                ContainerConfig::default().with_auto_bind(false),
            )
            .await
            .unwrap();

        assert_eq!(container.stats().instances_created, 0);

        let binding = container.binding().unwrap();
        assert!(!binding.is_bound());
        assert!(Arc::ptr_eq(
            binding.registry(),
            &container.registry().unwrap()
        ));

        let stats = container.stats();
        assert_eq!(stats.resolutions, 2);
        assert!(stats.cache_hits >= 1);
        assert!(stats.init_duration.is_some());
    }
}
