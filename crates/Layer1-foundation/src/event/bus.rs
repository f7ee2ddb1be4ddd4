//! Event Bus - 리스너별 에러 격리를 갖춘 동기 브로드캐스트

use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

// ============================================================================
// Traits
// ============================================================================

/// 버스로 흘려보낼 수 있는 이벤트
pub trait BusEvent: Send + Sync {
    /// 토픽 이름 (예: "settingsChanged")
    fn topic(&self) -> &'static str;
}

/// 이벤트 리스너 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 이벤트 리스너 trait
pub trait EventListener<E>: Send + Sync {
    /// 리스너 이름 (로그용)
    fn name(&self) -> &str;

    /// 관심 있는 토픽 (None이면 모든 이벤트)
    fn topics(&self) -> Option<&[&'static str]> {
        None
    }

    /// 이벤트 처리 - 에러는 버스가 기록하고 삼킨다
    fn on_event(&self, event: &E) -> anyhow::Result<()>;
}

/// 클로저 리스너
struct FnListener<E, F>
where
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync,
{
    name: String,
    topics: Option<Vec<&'static str>>,
    handler: F,
    _marker: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn topics(&self) -> Option<&[&'static str]> {
        self.topics.as_deref()
    }

    fn on_event(&self, event: &E) -> anyhow::Result<()> {
        (self.handler)(event)
    }
}

// ============================================================================
// Dispatch report
// ============================================================================

/// 리스너 한 개의 실패 기록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    pub listener: String,
    pub message: String,
}

/// 발행 결과
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// 정상 처리한 리스너 수
    pub delivered: usize,
    /// 실패(에러 또는 패닉)한 리스너 수
    pub failed: usize,
    pub failures: Vec<ListenerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스 설정
#[derive(Debug, Clone, Default)]
pub struct EventBusConfig {
    /// 디버그 모드 (모든 발행을 trace 로깅)
    pub debug_mode: bool,
}

struct RegisteredListener<E> {
    id: ListenerId,
    listener: Arc<dyn EventListener<E>>,
}

/// 동기 이벤트 버스
///
/// 리스너는 등록 순서대로 호출된다. 발행 전에 리스너 목록을 복사하므로
/// 리스너 안에서 구독/해제를 해도 교착되지 않는다.
pub struct EventBus<E> {
    name: String,
    config: EventBusConfig,
    listeners: RwLock<Vec<RegisteredListener<E>>>,
    listener_counter: AtomicU64,
    event_count: AtomicU64,
}

impl<E: BusEvent> EventBus<E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, EventBusConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: EventBusConfig) -> Self {
        Self {
            name: name.into(),
            config,
            listeners: RwLock::new(Vec::new()),
            listener_counter: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
        }
    }

    /// 리스너 등록
    pub fn subscribe(&self, listener: Arc<dyn EventListener<E>>) -> ListenerId {
        let id = ListenerId(self.listener_counter.fetch_add(1, Ordering::SeqCst));

        debug!(
            bus = %self.name,
            listener_name = listener.name(),
            listener_id = %id,
            "Registering event listener"
        );

        self.listeners
            .write()
            .push(RegisteredListener { id, listener });
        id
    }

    /// 클로저 등록 (모든 토픽)
    pub fn subscribe_fn<F>(&self, name: impl Into<String>, handler: F) -> ListenerId
    where
        E: 'static,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnListener {
            name: name.into(),
            topics: None,
            handler,
            _marker: std::marker::PhantomData,
        }))
    }

    /// 클로저 등록 (단일 토픽)
    pub fn subscribe_topic<F>(
        &self,
        topic: &'static str,
        name: impl Into<String>,
        handler: F,
    ) -> ListenerId
    where
        E: 'static,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnListener {
            name: name.into(),
            topics: Some(vec![topic]),
            handler,
            _marker: std::marker::PhantomData,
        }))
    }

    /// 리스너 해제
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        let removed = listeners.len() != before;

        if removed {
            debug!(bus = %self.name, listener_id = %id, "Unregistered event listener");
        }
        removed
    }

    /// 이벤트 발행
    pub fn publish(&self, event: &E) -> DispatchReport {
        let event_count = self.event_count.fetch_add(1, Ordering::SeqCst);
        let topic = event.topic();

        if self.config.debug_mode {
            trace!(bus = %self.name, topic, "Publishing event #{}", event_count + 1);
        }

        let targets: Vec<(ListenerId, Arc<dyn EventListener<E>>)> = self
            .listeners
            .read()
            .iter()
            .filter(|r| match r.listener.topics() {
                Some(topics) => topics.contains(&topic),
                None => true,
            })
            .map(|r| (r.id, Arc::clone(&r.listener)))
            .collect();

        let mut report = DispatchReport::default();

        for (id, listener) in targets {
            trace!(
                listener_id = %id,
                listener_name = listener.name(),
                topic,
                "Delivering event to listener"
            );

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
            };

            match failure {
                None => report.delivered += 1,
                Some(message) => {
                    warn!(
                        bus = %self.name,
                        listener_name = listener.name(),
                        topic,
                        "Listener failed: {}",
                        message
                    );
                    report.failed += 1;
                    report.failures.push(ListenerFailure {
                        listener: listener.name().to_string(),
                        message,
                    });
                }
            }
        }

        report
    }

    /// 등록된 리스너 수
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// 총 발행된 이벤트 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// 테스트
// ============================================================================
