//! Typed injection tokens

use std::fmt;
use std::marker::PhantomData;

/// 바인딩 키
///
/// 이름이 곧 식별자이고, 타입 매개변수는 resolve 결과 타입을 고정한다.
pub struct Token<T: ?Sized> {
    name: &'static str,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> Token<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: ?Sized> Clone for Token<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Token<T> {}

impl<T: ?Sized> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&self.name).finish()
    }
}

impl<T: ?Sized> fmt::Display for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 기본 바인딩
pub mod tokens {
    use super::Token;
    use crate::binding::ConfigBindingService;
    use crate::facade::SettingsFacade;
    use crate::host::HostApp;
    use crate::notifier::SettingsChangeNotifier;
    use crate::validation::SettingsValidator;
    use tars_foundation::PluginSettings;
    use tars_provider::ProviderRegistry;

    pub const APP: Token<dyn HostApp> = Token::new("App");
    /// 초기화 시점 스냅샷
    pub const SETTINGS: Token<PluginSettings> = Token::new("Settings");
    pub const NOTIFIER: Token<SettingsChangeNotifier> = Token::new("SettingsChangeNotifier");
    pub const REGISTRY: Token<ProviderRegistry> = Token::new("ProviderRegistry");
    pub const VALIDATOR: Token<SettingsValidator> = Token::new("SettingsValidator");
    pub const BINDING: Token<ConfigBindingService> = Token::new("ConfigBindingService");
    pub const FACADE: Token<SettingsFacade> = Token::new("SettingsFacade");
}
