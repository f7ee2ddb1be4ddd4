//! Config Binding Service - 설정 변경을 프로바이더 레지스트리에 반영
//!
//! notifier 의 `settingsChanged` 를 구독하고, 검증 후 변경 집합을 적용한다.
//! 적용 순서는 제거 → 추가 → 수정이다. 어댑터는 미리 만들지 않는다.

use crate::notifier::{SettingsChangeEvent, SettingsChangeNotifier};
use crate::validation::SettingsValidator;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tars_foundation::{
    BusEvent, ChangeKind, Error, EventBus, ListenerId, ProviderChange, Result, SettingsChanges,
    ValidationIssue,
};
use tars_provider::ProviderRegistry;
use tracing::{debug, error, info, warn};

pub const VALIDATION_ERROR: &str = "validationError";
pub const PROPAGATION_COMPLETE: &str = "propagationComplete";
pub const PROPAGATION_ERROR: &str = "propagationError";

/// 바인딩 서비스가 내보내는 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum BindingEvent {
    ValidationError {
        change_id: String,
        issues: Vec<ValidationIssue>,
    },
    PropagationComplete {
        change_id: String,
        providers_processed: usize,
    },
    PropagationError {
        change_id: String,
        message: String,
    },
}

impl BusEvent for BindingEvent {
    fn topic(&self) -> &'static str {
        match self {
            BindingEvent::ValidationError { .. } => VALIDATION_ERROR,
            BindingEvent::PropagationComplete { .. } => PROPAGATION_COMPLETE,
            BindingEvent::PropagationError { .. } => PROPAGATION_ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BindingConfig {
    /// 적용 전 전체 설정 검증
    pub enable_validation: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            enable_validation: true,
        }
    }
}

impl BindingConfig {
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }
}

/// 처리 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingStats {
    pub applied: u64,
    pub rejected: u64,
    pub failed: u64,
    pub skipped: u64,
}

struct BindingInner {
    registry: Arc<ProviderRegistry>,
    validator: Arc<SettingsValidator>,
    config: BindingConfig,
    in_flight: Mutex<HashSet<String>>,
    events: EventBus<BindingEvent>,
    applied: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// 처리 중인 changeId 표시. drop 시 해제
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    change_id: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(self.change_id);
    }
}

pub struct ConfigBindingService {
    notifier: Arc<SettingsChangeNotifier>,
    inner: Arc<BindingInner>,
    subscription: Mutex<Option<ListenerId>>,
}

impl ConfigBindingService {
    pub fn new(
        notifier: Arc<SettingsChangeNotifier>,
        registry: Arc<ProviderRegistry>,
        validator: Arc<SettingsValidator>,
        config: BindingConfig,
    ) -> Self {
        Self {
            notifier,
            inner: Arc::new(BindingInner {
                registry,
                validator,
                config,
                in_flight: Mutex::new(HashSet::new()),
                events: EventBus::new("config-binding"),
                applied: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            subscription: Mutex::new(None),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// notifier 구독. 이미 바인딩되어 있으면 false
    pub fn bind(&self) -> bool {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            debug!("Config binding already active");
            return false;
        }

        // 리스너는 약한 참조만 들고 있는다 (notifier ↔ binding 순환 방지)
        let weak: Weak<BindingInner> = Arc::downgrade(&self.inner);
        let id = self
            .notifier
            .on_settings_changed("config-binding", move |event| match weak.upgrade() {
                Some(inner) => inner.handle(event).map(|_| ()).map_err(anyhow::Error::from),
                None => Ok(()),
            });

        *subscription = Some(id);
        info!(listener_id = %id, "Config binding active");
        true
    }

    pub fn unbind(&self) -> bool {
        match self.subscription.lock().take() {
            Some(id) => {
                self.notifier.unsubscribe(id);
                info!(listener_id = %id, "Config binding released");
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.subscription.lock().is_some()
    }

    // ========================================================================
    // Handling
    // ========================================================================

    /// 변경 이벤트 한 건 처리. 처리한 프로바이더 변경 수를 돌려준다
    pub fn handle_settings_change(&self, event: &SettingsChangeEvent) -> Result<usize> {
        self.inner.handle(event)
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&BindingEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.subscribe_fn(name, handler)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    pub fn stats(&self) -> BindingStats {
        BindingStats {
            applied: self.inner.applied.load(Ordering::Relaxed),
            rejected: self.inner.rejected.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            skipped: self.inner.skipped.load(Ordering::Relaxed),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }
}

impl Drop for ConfigBindingService {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.get_mut().take() {
            self.notifier.unsubscribe(id);
        }
    }
}

impl BindingInner {
    fn handle(&self, event: &SettingsChangeEvent) -> Result<usize> {
        let change_id = event.change_id.as_str();

        if !self.in_flight.lock().insert(change_id.to_string()) {
            debug!(change_id, "Change already being applied, skipping");
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(0);
        }
        let _guard = InFlight {
            set: &self.in_flight,
            change_id,
        };

        if self.config.enable_validation {
            if let Err(e) = self.validator.validate(&event.new_settings) {
                let issues = match &e {
                    Error::ValidationFailed { issues } => issues.clone(),
                    _ => Vec::new(),
                };
                warn!(change_id, issues = issues.len(), "Rejected settings change: {}", e);
                self.rejected.fetch_add(1, Ordering::Relaxed);
                self.events.publish(&BindingEvent::ValidationError {
                    change_id: change_id.to_string(),
                    issues,
                });
                return Err(e);
            }
        }

        match self.apply(event) {
            Ok(processed) => {
                self.applied.fetch_add(1, Ordering::Relaxed);
                info!(change_id, processed, "Settings change applied");
                self.events.publish(&BindingEvent::PropagationComplete {
                    change_id: change_id.to_string(),
                    providers_processed: processed,
                });
                Ok(processed)
            }
            Err(message) => {
                error!(change_id, "Settings propagation failed: {}", message);
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.events.publish(&BindingEvent::PropagationError {
                    change_id: change_id.to_string(),
                    message: message.clone(),
                });
                Err(Error::Propagation {
                    change_id: change_id.to_string(),
                    message,
                })
            }
        }
    }

    fn apply(&self, event: &SettingsChangeEvent) -> std::result::Result<usize, String> {
        let changes: &SettingsChanges = &event.changes;
        if changes.providers.is_empty() {
            return Ok(0);
        }

        // 추가/수정된 tag 는 새 스냅샷에 있어야 한다
        for change in &changes.providers {
            if change.kind() != ChangeKind::Removed
                && event.new_settings.find_provider(change.tag()).is_none()
            {
                return Err(format!(
                    "provider '{}' is missing from the new settings",
                    change.tag()
                ));
            }
        }

        let mut processed = 0;

        for change in changes.providers_of(ChangeKind::Removed) {
            self.registry.remove_provider(change.tag());
            processed += 1;
        }

        // 제거만 있어도 스냅샷은 교체해야 재생성되지 않는다
        self.registry.update_settings(event.new_settings.clone());

        for kind in [ChangeKind::Added, ChangeKind::Modified] {
            for change in changes.providers_of(kind) {
                self.registry.update_provider(change.tag());
                log_change(change);
                processed += 1;
            }
        }

        Ok(processed)
    }
}

fn log_change(change: &ProviderChange) {
    match change {
        ProviderChange::Added { tag, .. } => debug!(tag = %tag, "Provider added"),
        ProviderChange::Modified {
            tag, field_changes, ..
        } => debug!(tag = %tag, fields = field_changes.len(), "Provider modified"),
        ProviderChange::Removed { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use tars_foundation::{PluginSettings, ProviderSettings};

    fn settings(providers: Vec<ProviderSettings>) -> PluginSettings {
        PluginSettings {
            providers,
            ..Default::default()
        }
    }

    struct Fixture {
        notifier: Arc<SettingsChangeNotifier>,
        registry: Arc<ProviderRegistry>,
        binding: ConfigBindingService,
        events: Arc<PlMutex<Vec<BindingEvent>>>,
    }

    fn fixture(initial: PluginSettings) -> Fixture {
        let notifier = Arc::new(SettingsChangeNotifier::new(initial.clone()));
        let registry = Arc::new(ProviderRegistry::new(initial));
        let binding = ConfigBindingService::new(
            Arc::clone(&notifier),
            Arc::clone(&registry),
            Arc::new(SettingsValidator::new()),
            BindingConfig::default(),
        );
        let events = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        binding.subscribe("test", move |e| {
            sink.lock().push(e.clone());
            Ok(())
        });
        Fixture {
            notifier,
            registry,
            binding,
            events,
        }
    }

    #[test]
    fn test_bind_once() {
        let f = fixture(PluginSettings::default());
        assert!(f.binding.bind());
        assert!(!f.binding.bind());
        assert_eq!(f.notifier.listener_count(), 1);

        assert!(f.binding.unbind());
        assert!(!f.binding.is_bound());
        assert_eq!(f.notifier.listener_count(), 0);
    }

    #[test]
    fn test_modification_reaches_registry() {
        let f = fixture(settings(vec![
            ProviderSettings::new("openai", "OpenAI").api_key("k1")
        ]));
        f.binding.bind();
        let before = f.registry.get_provider("openai").unwrap();

        let event = f
            .notifier
            .notify_settings_changed(
                settings(vec![ProviderSettings::new("openai", "OpenAI").api_key("k2")]),
                None,
            )
            .unwrap();

        let after = f.registry.get_provider("openai").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.options().api_key, "k2");

        assert_eq!(
            f.events.lock().as_slice(),
            &[BindingEvent::PropagationComplete {
                change_id: event.change_id.clone(),
                providers_processed: 1,
            }]
        );
        assert_eq!(f.binding.stats().applied, 1);
    }

    #[test]
    fn test_invalid_settings_are_not_applied() {
        let f = fixture(settings(vec![
            ProviderSettings::new("openai", "OpenAI").api_key("k1")
        ]));
        f.binding.bind();

        let event = f
            .notifier
            .notify_settings_changed(
                settings(vec![ProviderSettings::new("openai", "Nope").api_key("k2")]),
                None,
            )
            .unwrap();

        // 레지스트리는 이전 스냅샷 유지
        assert_eq!(f.registry.settings().providers[0].vendor, "OpenAI");
        assert_eq!(f.notifier.metrics(&event.change_id).unwrap().errors_count, 1);

        let first = f.events.lock()[0].clone();
        assert!(matches!(
            first,
            BindingEvent::ValidationError { issues, .. } if issues[0].path == "providers[0].vendor"
        ));

        let err = f.binding.handle_settings_change(&event).unwrap_err();
        assert!(matches!(err, Error::ValidationFailed { .. }));
    }

    #[test]
    fn test_removal_is_not_rebuilt() {
        let f = fixture(settings(vec![
            ProviderSettings::new("openai", "OpenAI").api_key("k1")
        ]));
        f.binding.bind();
        f.registry.get_provider("openai").unwrap();

        f.notifier
            .notify_settings_changed(PluginSettings::default(), None)
            .unwrap();

        assert_eq!(f.registry.cached_count(), 0);
        assert!(f.registry.get_provider("openai").is_none());
    }

    #[test]
    fn test_inconsistent_event_is_a_propagation_error() {
        let f = fixture(PluginSettings::default());
        let mut event = (*f
            .notifier
            .notify_settings_changed(
                settings(vec![ProviderSettings::new("openai", "OpenAI")]),
                None,
            )
            .unwrap())
        .clone();
        event.new_settings.providers.clear();

        let err = f.binding.handle_settings_change(&event).unwrap_err();
        assert!(matches!(err, Error::Propagation { .. }));
        assert!(matches!(
            f.events.lock().last(),
            Some(BindingEvent::PropagationError { .. })
        ));
        assert_eq!(f.binding.stats().failed, 1);
    }

    #[test]
    fn test_reentrant_delivery_is_skipped() {
        let f = fixture(PluginSettings::default());
        let binding = Arc::new(f.binding);

        let event = f
            .notifier
            .notify_settings_changed(
                settings(vec![ProviderSettings::new("openai", "OpenAI")]),
                None,
            )
            .unwrap();

        // 처리 중 같은 이벤트를 다시 받는 경우
        let again = Arc::clone(&event);
        let inner = Arc::downgrade(&binding);
        let nested = Arc::new(PlMutex::new(None));
        let nested_sink = Arc::clone(&nested);
        binding.subscribe("reentrant", move |e| {
            if matches!(e, BindingEvent::PropagationComplete { .. }) && nested_sink.lock().is_none() {
                if let Some(binding) = inner.upgrade() {
                    *nested_sink.lock() = Some(binding.handle_settings_change(&again)?);
                }
            }
            Ok(())
        });

        assert_eq!(binding.handle_settings_change(&event).unwrap(), 1);
        assert_eq!(*nested.lock(), Some(0));
        assert_eq!(binding.stats().skipped, 1);
    }
}
