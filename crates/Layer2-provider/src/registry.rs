//! Provider Registry - tag → 어댑터 지연 생성 + 캐시
//!
//! 설정 스냅샷을 들고 있다가 요청이 오면 어댑터를 만든다.
//!
//! ```text
//! get_provider("openai")
//!   ├── cache hit  → Arc clone
//!   └── cache miss → settings 조회 (tag 우선, 다음 vendor 이름)
//!                   → factory table (tag → Vendor)
//!                   → Vendor::create() → cache 저장
//! ```
//!
//! 실패(미설정, 생성 실패)는 로그만 남기고 `None` 을 돌려준다.

use crate::r#trait::VendorAdapter;
use crate::vendor::Vendor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tars_foundation::{Error, PluginSettings, ProviderSettings, Result};
use tracing::{debug, info, warn};

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// 생성한 어댑터를 재사용
    pub enable_cache: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { enable_cache: true }
    }
}

impl RegistryConfig {
    pub fn with_cache(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }
}

struct CachedAdapter {
    tag: String,
    adapter: Arc<dyn VendorAdapter>,
}

/// Lazily constructed vendor adapters keyed by tag or vendor name
pub struct ProviderRegistry {
    config: RegistryConfig,
    settings: RwLock<Arc<PluginSettings>>,
    cache: RwLock<HashMap<String, CachedAdapter>>,
    /// tag → vendor
    factories: RwLock<HashMap<String, Vendor>>,
}

impl ProviderRegistry {
    pub fn new(settings: PluginSettings) -> Self {
        Self::with_config(settings, RegistryConfig::default())
    }

    pub fn with_config(settings: PluginSettings, config: RegistryConfig) -> Self {
        let factories = build_factory_table(&settings);
        Self {
            config,
            settings: RwLock::new(Arc::new(settings)),
            cache: RwLock::new(HashMap::new()),
            factories: RwLock::new(factories),
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// tag 또는 벤더 이름으로 어댑터 조회
    pub fn get_provider(&self, key: &str) -> Option<Arc<dyn VendorAdapter>> {
        if self.config.enable_cache {
            if let Some(hit) = self.cache.read().get(key) {
                debug!(key, tag = %hit.tag, "Provider cache hit");
                return Some(Arc::clone(&hit.adapter));
            }
        }

        debug!(key, "Provider cache miss");

        let (tag, adapter) = match self.create_provider(key) {
            Ok(created) => created,
            Err(e) => {
                warn!(key, "Provider unavailable: {}", e);
                return None;
            }
        };

        if !self.config.enable_cache {
            return Some(adapter);
        }

        // 동시에 만들어졌다면 먼저 저장된 것을 쓴다
        let mut cache = self.cache.write();
        let entry = cache
            .entry(key.to_string())
            .or_insert(CachedAdapter { tag, adapter });
        Some(Arc::clone(&entry.adapter))
    }

    fn create_provider(&self, key: &str) -> Result<(String, Arc<dyn VendorAdapter>)> {
        let settings = self.settings();
        let provider = settings
            .find_provider(key)
            .or_else(|| settings.find_provider_by_vendor(key))
            .ok_or_else(|| Error::ProviderNotFound(key.to_string()))?;

        let vendor = self.resolve_vendor(provider)?;
        let adapter = vendor
            .create(provider)
            .map_err(|e| Error::provider_creation(&provider.tag, e.to_string()))?;

        info!(tag = %provider.tag, vendor = %vendor, "Created provider");
        Ok((provider.tag.clone(), adapter))
    }

    fn resolve_vendor(&self, provider: &ProviderSettings) -> Result<Vendor> {
        if let Some(vendor) = self.factories.read().get(&provider.tag) {
            return Ok(*vendor);
        }

        let vendor = Vendor::from_name(&provider.vendor).ok_or_else(|| {
            Error::provider_creation(
                &provider.tag,
                format!("unknown vendor '{}'", provider.vendor),
            )
        })?;
        self.factories.write().insert(provider.tag.clone(), vendor);
        Ok(vendor)
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// 해당 tag 로 만들어진 캐시 항목 제거 (다음 조회 때 재생성)
    pub fn update_provider(&self, tag: &str) {
        let evicted = self.evict(tag);
        debug!(tag, evicted, "Provider invalidated");
    }

    /// 캐시 제거 + factory table 에서 삭제
    pub fn remove_provider(&self, tag: &str) {
        let evicted = self.evict(tag);
        self.factories.write().remove(tag);
        info!(tag, evicted, "Provider removed");
    }

    /// 설정 교체. 캐시 전체를 비운다.
    pub fn update_settings(&self, settings: PluginSettings) {
        let factories = build_factory_table(&settings);
        *self.settings.write() = Arc::new(settings);
        *self.factories.write() = factories;

        let cleared = {
            let mut cache = self.cache.write();
            let n = cache.len();
            cache.clear();
            n
        };
        info!(cleared, "Provider settings updated");
    }

    fn evict(&self, tag: &str) -> usize {
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|key, cached| key != tag && cached.tag != tag);
        before - cache.len()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn settings(&self) -> Arc<PluginSettings> {
        Arc::clone(&self.settings.read())
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }

    pub fn list_tags(&self) -> Vec<String> {
        self.settings
            .read()
            .providers
            .iter()
            .map(|p| p.tag.clone())
            .collect()
    }

    pub fn available_vendors(&self) -> Vec<&'static str> {
        Vendor::ALL.iter().map(|v| v.name()).collect()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

/// tag → vendor (tag 중복 시 첫 항목, 알 수 없는 벤더는 제외)
fn build_factory_table(settings: &PluginSettings) -> HashMap<String, Vendor> {
    let mut table = HashMap::new();
    for provider in &settings.providers {
        if let Some(vendor) = Vendor::from_name(&provider.vendor) {
            table.entry(provider.tag.clone()).or_insert(vendor);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(providers: Vec<ProviderSettings>) -> PluginSettings {
        PluginSettings {
            providers,
            ..Default::default()
        }
    }

    fn openai(key: &str) -> ProviderSettings {
        ProviderSettings::new("openai", "OpenAI").api_key(key)
    }

    #[test]
    fn test_same_adapter_is_returned() {
        let registry = ProviderRegistry::new(settings_with(vec![openai("k1")]));

        let first = registry.get_provider("openai").unwrap();
        let second = registry.get_provider("openai").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached_count(), 1);
    }

    #[test]
    fn test_update_settings_reflects_new_key() {
        let registry = ProviderRegistry::new(settings_with(vec![openai("k1")]));
        let before = registry.get_provider("openai").unwrap();
        assert_eq!(before.options().api_key, "k1");

        registry.update_settings(settings_with(vec![openai("k2")]));
        assert_eq!(registry.cached_count(), 0);

        let after = registry.get_provider("openai").unwrap();
        assert_eq!(after.options().api_key, "k2");
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_lookup_by_vendor_name() {
        let registry = ProviderRegistry::new(settings_with(vec![
            ProviderSettings::new("my-ds", "DeepSeek").api_key("k"),
        ]));

        let adapter = registry.get_provider("deepseek").unwrap();
        assert_eq!(adapter.tag(), "my-ds");
        assert_eq!(adapter.vendor(), Vendor::DeepSeek);
    }

    #[test]
    fn test_tag_wins_over_vendor_name() {
        let registry = ProviderRegistry::new(settings_with(vec![
            ProviderSettings::new("a", "Claude"),
            ProviderSettings::new("claude", "OpenAI"),
        ]));

        let adapter = registry.get_provider("claude").unwrap();
        assert_eq!(adapter.tag(), "claude");
        assert_eq!(adapter.vendor(), Vendor::OpenAI);
    }

    #[test]
    fn test_failures_become_none() {
        let registry = ProviderRegistry::new(settings_with(vec![
            ProviderSettings::new("mystery", "Azure"),
            ProviderSettings::new("broken", "OpenAI").base_url("::nope::"),
        ]));

        assert!(registry.get_provider("missing").is_none());
        assert!(registry.get_provider("mystery").is_none());
        assert!(registry.get_provider("broken").is_none());
        assert_eq!(registry.cached_count(), 0);
    }

    #[test]
    fn test_update_provider_evicts_every_key_for_tag() {
        let registry = ProviderRegistry::new(settings_with(vec![openai("k1")]));
        registry.get_provider("openai").unwrap();
        registry.get_provider("OPENAI").unwrap(); // 벤더 이름 경로
        assert_eq!(registry.cached_count(), 2);

        registry.update_provider("openai");
        assert_eq!(registry.cached_count(), 0);
        assert!(registry.get_provider("openai").is_some());
    }

    #[test]
    fn test_remove_provider_drops_factory() {
        let registry = ProviderRegistry::new(settings_with(vec![openai("k1")]));
        registry.get_provider("openai").unwrap();

        registry.remove_provider("openai");
        assert_eq!(registry.cached_count(), 0);
        assert!(!registry.factories.read().contains_key("openai"));
    }

    #[test]
    fn test_cache_disabled() {
        let registry = ProviderRegistry::with_config(
            settings_with(vec![openai("k1")]),
            RegistryConfig::default().with_cache(false),
        );

        let first = registry.get_provider("openai").unwrap();
        let second = registry.get_provider("openai").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached_count(), 0);
    }

    #[test]
    fn test_queries() {
        let registry = ProviderRegistry::new(settings_with(vec![
            openai("k1"),
            ProviderSettings::new("local", "Ollama"),
        ]));

        assert_eq!(registry.list_tags(), vec!["openai", "local"]);
        assert_eq!(registry.available_vendors().len(), Vendor::ALL.len());
        assert!(registry.available_vendors().contains(&"SiliconFlow"));
        assert_eq!(registry.settings().providers.len(), 2);
    }
}
