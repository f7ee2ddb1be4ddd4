//! Scope - 지연 싱글톤 바인딩 테이블
//!
//! ```text
//! resolve(token)
//!   ├── instances 에 있음 → Arc clone (cache hit)
//!   ├── 현재 스레드의 resolution stack 에 있음 → CircularDependency
//!   └── factory 실행 (락 없이) → instances 저장
//! ```
//!
//! 값은 `Arc<T>` 를 `Any` 로 감싸 저장하므로 `dyn Trait` 토큰도 쓸 수 있다.

use super::token::Token;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use tars_foundation::{Error, Result};
use tracing::{debug, trace};

/// `Arc<T>` 를 담은 타입 소거 값
type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Scope) -> Result<Instance> + Send + Sync>;

/// scope 가 갱신하는 카운터 (컨테이너와 공유)
#[derive(Debug, Default)]
pub(crate) struct ScopeCounters {
    pub cache_hits: AtomicU64,
    pub instances_created: AtomicU64,
}

pub struct Scope {
    name: String,
    debug: bool,
    factories: RwLock<HashMap<&'static str, Factory>>,
    instances: RwLock<HashMap<&'static str, Instance>>,
    /// 스레드별 resolution stack
    resolving: Mutex<HashMap<ThreadId, Vec<&'static str>>>,
    counters: Arc<ScopeCounters>,
}

impl Scope {
    pub fn new(name: impl Into<String>, debug: bool) -> Self {
        Self::with_counters(name, debug, Arc::new(ScopeCounters::default()))
    }

    pub(crate) fn with_counters(
        name: impl Into<String>,
        debug: bool,
        counters: Arc<ScopeCounters>,
    ) -> Self {
        Self {
            name: name.into(),
            debug,
            factories: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            resolving: Mutex::new(HashMap::new()),
            counters,
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// 이미 만들어진 값 바인딩 (같은 이름의 factory 는 대체)
    pub fn bind_value<T>(&self, token: &Token<T>, value: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.factories.write().remove(token.name());
        self.instances
            .write()
            .insert(token.name(), Arc::new(value) as Instance);
        trace!(scope = %self.name, token = token.name(), "Bound value");
    }

    /// 지연 싱글톤 factory 등록 (기존 인스턴스는 버린다)
    pub fn register_factory<T, F>(&self, token: &Token<T>, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Scope) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let erased: Factory =
            Arc::new(move |scope: &Scope| factory(scope).map(|value| Arc::new(value) as Instance));

        self.instances.write().remove(token.name());
        self.factories.write().insert(token.name(), erased);
        trace!(scope = %self.name, token = token.name(), "Registered factory");
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    pub fn resolve<T>(&self, token: &Token<T>) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let name = token.name();

        let cached = self.instances.read().get(name).cloned();
        if let Some(instance) = cached {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            self.log_resolution(name, "cache hit");
            return downcast(name, &instance);
        }

        let factory = self.factories.read().get(name).cloned().ok_or_else(|| {
            Error::resolution(
                name,
                Error::Internal(format!("no binding registered for '{}'", name)),
            )
        })?;

        let created = {
            let _resolving = self.enter(name)?;
            factory(self)
        };

        let instance = created.map_err(|e| Error::resolution(name, e))?;

        // 재진입으로 먼저 저장된 값이 있으면 그것을 쓴다
        let instance = {
            let mut instances = self.instances.write();
            Arc::clone(instances.entry(name).or_insert(instance))
        };
        self.counters.instances_created.fetch_add(1, Ordering::Relaxed);
        self.log_resolution(name, "created");

        downcast(name, &instance)
    }

    /// 이미 만들어진 인스턴스만 조회 (생성하지 않음)
    pub fn cached<T>(&self, token: &Token<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let instance = self.instances.read().get(token.name()).cloned()?;
        instance.downcast_ref::<Arc<T>>().cloned()
    }

    fn enter(&self, name: &'static str) -> Result<Resolving<'_>> {
        let mut resolving = self.resolving.lock();
        let stack = resolving.entry(std::thread::current().id()).or_default();

        if stack.contains(&name) {
            let mut path: Vec<String> = stack.iter().map(|s| s.to_string()).collect();
            path.push(name.to_string());
            return Err(Error::resolution(
                name,
                Error::CircularDependency { path },
            ));
        }

        stack.push(name);
        Ok(Resolving { scope: self })
    }

    fn leave(&self) {
        let thread = std::thread::current().id();
        let mut resolving = self.resolving.lock();
        if let Some(stack) = resolving.get_mut(&thread) {
            stack.pop();
            if stack.is_empty() {
                resolving.remove(&thread);
            }
        }
    }

    fn log_resolution(&self, name: &str, outcome: &str) {
        if self.debug {
            debug!(scope = %self.name, token = name, outcome, "Resolved");
        } else {
            trace!(scope = %self.name, token = name, outcome, "Resolved");
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn contains(&self, name: &str) -> bool {
        self.instances.read().contains_key(name) || self.factories.read().contains_key(name)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 모든 인스턴스와 factory 제거
    pub fn clear(&self) {
        self.instances.write().clear();
        self.factories.write().clear();
    }
}

/// drop 시 resolution stack 에서 pop (factory 가 panic 해도)
struct Resolving<'a> {
    scope: &'a Scope,
}

impl Drop for Resolving<'_> {
    fn drop(&mut self) {
        self.scope.leave();
    }
}

fn downcast<T>(name: &str, instance: &Instance) -> Result<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance.downcast_ref::<Arc<T>>().cloned().ok_or_else(|| {
        Error::resolution(
            name,
            Error::Internal(format!("binding '{}' holds a different type", name)),
        )
    })
}
