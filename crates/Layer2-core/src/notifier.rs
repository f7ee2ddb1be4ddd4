//! Settings Change Notifier
//!
//! 설정 스냅샷 교체를 감지해 구독자에게 동기 브로드캐스트한다.
//!
//! ```text
//! notify_settings_changed(new, prev)
//!   1. detect_changes(new, prev)
//!   2. SettingsChangeEvent 생성
//!   3. current ← new
//!   4. metrics 기록
//!   5. history 추가 (100 초과 시 최근 50개만 유지)
//!   6. "settingsChanged" 발행
//!   7. errorsCount 갱신 → "metricsRecorded" 발행
//! ```

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tars_foundation::{
    detect_changes, BusEvent, EventBus, EventListener, ListenerId, PluginSettings, Result,
    SettingsChanges,
};
use tracing::{debug, info};

pub const SETTINGS_CHANGED: &str = "settingsChanged";
pub const METRICS_RECORDED: &str = "metricsRecorded";

// ============================================================================
// Events
// ============================================================================

/// 한 번의 설정 변경
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsChangeEvent {
    pub new_settings: PluginSettings,
    pub previous_settings: PluginSettings,
    pub changes: SettingsChanges,
    pub change_id: String,
    /// notifier 내에서 단조 증가
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

/// 변경 처리 측정값
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMetrics {
    pub change_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub providers_updated: usize,
    /// settingsChanged 리스너 실패 수
    pub errors_count: usize,
}

/// Notifier 버스 이벤트
#[derive(Debug, Clone)]
pub enum NotifierEvent {
    SettingsChanged(Arc<SettingsChangeEvent>),
    MetricsRecorded(ChangeMetrics),
}

impl BusEvent for NotifierEvent {
    fn topic(&self) -> &'static str {
        match self {
            NotifierEvent::SettingsChanged(_) => SETTINGS_CHANGED,
            NotifierEvent::MetricsRecorded(_) => METRICS_RECORDED,
        }
    }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// 이력 최대 길이
    pub history_capacity: usize,
    /// 넘쳤을 때 남길 개수
    pub history_retain: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            history_retain: 50,
        }
    }
}

impl NotifierConfig {
    pub fn with_history(mut self, capacity: usize, retain: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self.history_retain = retain.min(self.history_capacity);
        self
    }
}

// ============================================================================
// Notifier
// ============================================================================

pub struct SettingsChangeNotifier {
    config: NotifierConfig,
    current: RwLock<PluginSettings>,
    history: Mutex<VecDeque<Arc<SettingsChangeEvent>>>,
    metrics: Mutex<HashMap<String, ChangeMetrics>>,
    sequence: AtomicU64,
    bus: EventBus<NotifierEvent>,
}

impl std::fmt::Debug for SettingsChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsChangeNotifier")
            .field("config", &self.config)
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .field("history", &self.history.lock().len())
            .field("listeners", &self.bus.listener_count())
            .finish()
    }
}

impl SettingsChangeNotifier {
    pub fn new(initial: PluginSettings) -> Self {
        Self::with_config(initial, NotifierConfig::default())
    }

    pub fn with_config(initial: PluginSettings, config: NotifierConfig) -> Self {
        Self {
            config,
            current: RwLock::new(initial),
            history: Mutex::new(VecDeque::new()),
            metrics: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            bus: EventBus::new("settings-notifier"),
        }
    }

    /// 변경 감지 + 발행
    ///
    /// `previous` 가 없으면 현재 스냅샷을 기준으로 삼는다.
    /// 구독자 실패는 버스가 격리하므로 여기서 돌아오는 에러는 감지 실패뿐이다.
    pub fn notify_settings_changed(
        &self,
        new_settings: PluginSettings,
        previous: Option<PluginSettings>,
    ) -> Result<Arc<SettingsChangeEvent>> {
        let start_time = Utc::now();
        let previous_settings = previous.unwrap_or_else(|| self.current.read().clone());

        let changes = detect_changes(&new_settings, &previous_settings)?;
        let providers_updated = changes.providers.len();

        let event = Arc::new(SettingsChangeEvent {
            new_settings: new_settings.clone(),
            previous_settings,
            changes,
            change_id: generate_change_id(start_time),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            timestamp: start_time,
        });

        *self.current.write() = new_settings;

        let end_time = Utc::now();
        let mut metrics = ChangeMetrics {
            change_id: event.change_id.clone(),
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds().max(0) as u64,
            providers_updated,
            errors_count: 0,
        };
        self.metrics
            .lock()
            .insert(metrics.change_id.clone(), metrics.clone());

        self.push_history(Arc::clone(&event));

        info!(
            change_id = %event.change_id,
            sequence = event.sequence,
            providers = providers_updated,
            general = event.changes.general.len(),
            "Settings changed"
        );

        let report = self
            .bus
            .publish(&NotifierEvent::SettingsChanged(Arc::clone(&event)));

        metrics.errors_count = report.failed;
        if let Some(stored) = self.metrics.lock().get_mut(&metrics.change_id) {
            stored.errors_count = report.failed;
        }
        self.bus.publish(&NotifierEvent::MetricsRecorded(metrics));

        Ok(event)
    }

    fn push_history(&self, event: Arc<SettingsChangeEvent>) {
        let mut history = self.history.lock();
        history.push_back(event);

        if history.len() <= self.config.history_capacity {
            return;
        }

        let excess = history.len() - self.config.history_retain;
        history.drain(..excess);

        let kept: HashSet<&str> = history.iter().map(|e| e.change_id.as_str()).collect();
        self.metrics
            .lock()
            .retain(|id, _| kept.contains(id.as_str()));

        debug!(retained = history.len(), "Trimmed settings history");
    }

    // ========================================================================
    // Subscription
    // ========================================================================

    /// 모든 notifier 이벤트 구독
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&NotifierEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe_fn(name, handler)
    }

    /// settingsChanged 만 구독
    pub fn on_settings_changed<F>(&self, name: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&SettingsChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus
            .subscribe_topic(SETTINGS_CHANGED, name, move |event| match event {
                NotifierEvent::SettingsChanged(change) => handler(change),
                NotifierEvent::MetricsRecorded(_) => Ok(()),
            })
    }

    pub fn subscribe_listener(&self, listener: Arc<dyn EventListener<NotifierEvent>>) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.bus.listener_count()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn current_settings(&self) -> PluginSettings {
        self.current.read().clone()
    }

    /// 최근 이력 (오래된 것부터). `limit` 이 있으면 마지막 N개
    pub fn history(&self, limit: Option<usize>) -> Vec<Arc<SettingsChangeEvent>> {
        let history = self.history.lock();
        let skip = limit.map_or(0, |n| history.len().saturating_sub(n));
        history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn metrics(&self, change_id: &str) -> Option<ChangeMetrics> {
        self.metrics.lock().get(change_id).cloned()
    }

    /// 시작 시각 순
    pub fn all_metrics(&self) -> Vec<ChangeMetrics> {
        let mut all: Vec<ChangeMetrics> = self.metrics.lock().values().cloned().collect();
        all.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        all
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
        self.metrics.lock().clear();
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }
}

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// `change_<unix-millis>_<9 chars>`
fn generate_change_id(at: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("change_{}_{}", at.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use tars_foundation::{ChangeKind, ProviderChange, ProviderSettings};

    fn with_key(key: &str) -> PluginSettings {
        PluginSettings {
            providers: vec![ProviderSettings::new("openai", "OpenAI").api_key(key)],
            ..Default::default()
        }
    }

    #[test]
    fn test_change_id_format() {
        let id = generate_change_id(Utc::now());
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "change");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_api_key_change_event() {
        let notifier = SettingsChangeNotifier::new(with_key("k1"));
        let received = Arc::new(PlMutex::new(Vec::new()));

        let sink = Arc::clone(&received);
        notifier.on_settings_changed("test", move |event| {
            sink.lock().push(event.change_id.clone());
            Ok(())
        });

        let event = notifier
            .notify_settings_changed(with_key("k2"), None)
            .unwrap();

        assert_eq!(received.lock().as_slice(), &[event.change_id.clone()]);
        assert_eq!(event.changes.providers.len(), 1);

        let ProviderChange::Modified {
            path,
            old_value,
            new_value,
            ..
        } = &event.changes.providers[0]
        else {
            panic!("expected modified change");
        };
        assert_eq!(path, "providers[0].options.apiKey");
        assert_eq!(old_value, "k1");
        assert_eq!(new_value, "k2");
        assert_eq!(notifier.current_settings(), with_key("k2"));
    }

    #[test]
    fn test_explicit_previous_baseline() {
        let notifier = SettingsChangeNotifier::new(PluginSettings::default());
        let event = notifier
            .notify_settings_changed(with_key("k1"), Some(with_key("k1")))
            .unwrap();
        assert!(event.changes.is_empty());

        let event = notifier
            .notify_settings_changed(PluginSettings::default(), None)
            .unwrap();
        assert_eq!(event.changes.providers[0].kind(), ChangeKind::Removed);
    }

    #[test]
    fn test_metrics_record_listener_failures() {
        let notifier = SettingsChangeNotifier::new(PluginSettings::default());
        notifier.on_settings_changed("broken", |_| anyhow::bail!("nope"));
        notifier.on_settings_changed("fine", |_| Ok(()));

        let recorded = Arc::new(PlMutex::new(None));
        let sink = Arc::clone(&recorded);
        notifier.subscribe("metrics", move |event| {
            if let NotifierEvent::MetricsRecorded(m) = event {
                *sink.lock() = Some(m.clone());
            }
            Ok(())
        });

        let event = notifier
            .notify_settings_changed(with_key("k1"), None)
            .unwrap();

        let emitted = recorded.lock().clone().unwrap();
        assert_eq!(emitted.change_id, event.change_id);
        assert_eq!(emitted.errors_count, 1);
        assert_eq!(emitted.providers_updated, 1);
        assert_eq!(notifier.metrics(&event.change_id).unwrap().errors_count, 1);
    }

    #[test]
    fn test_sequence_and_history_limit() {
        let notifier = SettingsChangeNotifier::with_config(
            PluginSettings::default(),
            NotifierConfig::default().with_history(4, 2),
        );

        for i in 0..5 {
            notifier
                .notify_settings_changed(with_key(&format!("k{}", i)), None)
                .unwrap();
        }

        let history = notifier.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sequence, 4);
        assert_eq!(history[1].sequence, 5);
        assert_eq!(notifier.all_metrics().len(), 2);

        assert_eq!(notifier.history(Some(1))[0].sequence, 5);

        notifier.clear_history();
        assert_eq!(notifier.history_len(), 0);
        assert!(notifier.all_metrics().is_empty());
    }
}
