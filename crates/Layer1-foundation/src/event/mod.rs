//! Event System - 동기 이벤트 발행/구독
//!
//! 설정 변경 파이프라인의 각 단계가 이벤트를 발행한다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      EventBus<E>                             │
//! │  publish(&event) ─┬─────────────────┬─────────────────┐      │
//! │                   ▼                 ▼                 ▼      │
//! │            ┌────────────┐   ┌────────────┐   ┌────────────┐  │
//! │            │ Listener 1 │   │ Listener 2 │   │ Listener N │  │
//! │            │ (binding)  │   │ (metrics)  │   │ (UI)       │  │
//! │            └────────────┘   └────────────┘   └────────────┘  │
//! │   실패/패닉한 리스너는 로그만 남기고 다음 리스너로 진행        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 사용법
//!
//! ```ignore
//! use tars_foundation::event::{BusEvent, EventBus};
//!
//! let bus: EventBus<MyEvent> = EventBus::new("settings");
//! let id = bus.subscribe_fn("logger", |event| {
//!     println!("{}", event.topic());
//!     Ok(())
//! });
//!
//! let report = bus.publish(&MyEvent::Changed);
//! assert_eq!(report.failed, 0);
//! bus.unsubscribe(id);
//! ```

pub mod bus;

pub use bus::{
    BusEvent, DispatchReport, EventBus, EventBusConfig, EventListener, ListenerFailure,
    ListenerId,
};
