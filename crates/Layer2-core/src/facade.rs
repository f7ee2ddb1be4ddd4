//! Settings Facade - 설정 변경의 프로그램 진입점
//!
//! 현재 스냅샷 복제 → 변경 적용 → 검증 → notifier 통지 → 호스트에 저장.
//! 검증에 실패한 변경은 통지도 저장도 하지 않는다.

use crate::host::HostApp;
use crate::notifier::{SettingsChangeEvent, SettingsChangeNotifier};
use crate::validation::SettingsValidator;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tars_foundation::{Error, PluginSettings, ProviderSettings, Result};
use tracing::warn;

/// 설정 수정 진입점
///
/// 변경은 한 번에 하나씩 처리된다. 리스너 안에서 `update` 를 다시 부르면
/// 교착 대신 `Error::Internal` 을 돌려준다.
pub struct SettingsFacade {
    app: Arc<dyn HostApp>,
    notifier: Arc<SettingsChangeNotifier>,
    validator: Option<Arc<SettingsValidator>>,
    /// 변경 직렬화
    write_lock: Mutex<()>,
    /// 현재 변경을 처리 중인 스레드
    writer: Mutex<Option<ThreadId>>,
}

/// drop 시 writer 표시 해제
struct WriterMark<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for WriterMark<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

impl SettingsFacade {
    pub fn new(app: Arc<dyn HostApp>, notifier: Arc<SettingsChangeNotifier>) -> Self {
        Self {
            app,
            notifier,
            validator: None,
            write_lock: Mutex::new(()),
            writer: Mutex::new(None),
        }
    }

    /// 통지 전에 전체 설정 검증
    pub fn with_validator(mut self, validator: Arc<SettingsValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn snapshot(&self) -> PluginSettings {
        self.notifier.current_settings()
    }

    /// 클로저로 설정 수정
    ///
    /// 검증 실패 시 `ValidationFailed` 를 돌려주고 현재 스냅샷은 그대로 둔다.
    pub fn update<F>(&self, mutate: F) -> Result<Arc<SettingsChangeEvent>>
    where
        F: FnOnce(&mut PluginSettings),
    {
        let current = thread::current().id();
        if *self.writer.lock() == Some(current) {
            return Err(Error::Internal(
                "settings update re-entered from a settings listener".to_string(),
            ));
        }

        let _guard = self.write_lock.lock();
        *self.writer.lock() = Some(current);
        let _mark = WriterMark(&self.writer);

        let previous = self.notifier.current_settings();
        let mut next = previous.clone();
        mutate(&mut next);

        if let Some(validator) = &self.validator {
            if let Err(e) = validator.validate(&next) {
                warn!("Rejected settings update: {}", e);
                self.app.notice(&format!("Invalid settings: {}", e));
                return Err(e);
            }
        }

        let event = self
            .notifier
            .notify_settings_changed(next, Some(previous))?;

        if let Some(metrics) = self.notifier.metrics(&event.change_id) {
            if metrics.errors_count > 0 {
                warn!(
                    change_id = %event.change_id,
                    failures = metrics.errors_count,
                    "Some settings listeners failed"
                );
            }
        }

        if let Err(e) = self.app.save_settings(&event.new_settings) {
            self.app
                .notice(&format!("Failed to save settings: {}", e));
            return Err(e);
        }

        Ok(event)
    }

    pub fn add_provider(&self, provider: ProviderSettings) -> Result<Arc<SettingsChangeEvent>> {
        self.update(|settings| settings.providers.push(provider))
    }

    /// tag 로 제거. 없으면 `ProviderNotFound`
    pub fn remove_provider(&self, tag: &str) -> Result<Arc<SettingsChangeEvent>> {
        self.ensure_exists(tag)?;
        self.update(|settings| {
            if let Some(index) = settings.providers.iter().position(|p| p.tag == tag) {
                settings.providers.remove(index);
            }
        })
    }

    pub fn update_provider<F>(&self, tag: &str, mutate: F) -> Result<Arc<SettingsChangeEvent>>
    where
        F: FnOnce(&mut ProviderSettings),
    {
        self.ensure_exists(tag)?;
        self.update(|settings| {
            if let Some(provider) = settings.find_provider_mut(tag) {
                mutate(provider);
            }
        })
    }

    fn ensure_exists(&self, tag: &str) -> Result<()> {
        if self.snapshot().find_provider(tag).is_some() {
            Ok(())
        } else {
            Err(Error::ProviderNotFound(tag.to_string()))
        }
    }
}
