//! Host boundary - 노트 앱과의 경계
//!
//! 플러그인은 호스트 앱에 대해 설정 저장과 사용자 알림만 요구한다.

use std::path::PathBuf;
use tars_foundation::{JsonStore, PluginSettings, Result};
use tracing::info;

/// 호스트 앱 핸들
pub trait HostApp: Send + Sync {
    fn app_name(&self) -> &str;

    /// 설정 영속화
    fn save_settings(&self, settings: &PluginSettings) -> Result<()>;

    /// 사용자에게 보이는 유일한 채널
    fn notice(&self, message: &str);
}

/// 디렉터리에 `data.json` 을 쓰는 호스트
pub struct FileHost {
    name: String,
    store: JsonStore,
}

impl FileHost {
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            store: JsonStore::new(base_dir),
        }
    }

    /// 저장된 설정 로드 (없으면 기본값)
    pub fn load_settings(&self) -> Result<PluginSettings> {
        PluginSettings::load_from(&self.store)
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }
}

impl HostApp for FileHost {
    fn app_name(&self) -> &str {
        &self.name
    }

    fn save_settings(&self, settings: &PluginSettings) -> Result<()> {
        settings.save_to(&self.store)
    }

    fn notice(&self, message: &str) {
        info!(app = %self.name, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tars_foundation::ProviderSettings;
    use tempfile::TempDir;

    #[test]
    fn test_file_host_round_trip() {
        let dir = TempDir::new().unwrap();
        let host = FileHost::new("vault", dir.path());

        assert_eq!(host.load_settings().unwrap(), PluginSettings::default());

        let mut settings = PluginSettings::default();
        settings
            .providers
            .push(ProviderSettings::new("openai", "OpenAI").api_key("k1"));
        host.save_settings(&settings).unwrap();

        assert_eq!(host.load_settings().unwrap(), settings);
        assert_eq!(host.app_name(), "vault");
    }
}
