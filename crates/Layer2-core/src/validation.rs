//! Settings validation
//!
//! 바인딩 서비스가 변경을 반영하기 전에 전체 설정을 검사한다.
//! 실패 시 모든 문제를 모아 `Error::ValidationFailed` 로 돌려준다.

use std::collections::HashSet;
use tars_foundation::{Error, PluginSettings, ProviderSettings, Result, ValidationIssue};
use tars_provider::Vendor;
use url::Url;

/// Settings validator
#[derive(Debug, Clone, Default)]
pub struct SettingsValidator;

impl SettingsValidator {
    pub fn new() -> Self {
        Self
    }

    /// 전체 검사
    pub fn validate(&self, settings: &PluginSettings) -> Result<()> {
        let issues = self.issues(settings);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(issues))
        }
    }

    /// 발견된 모든 문제
    pub fn issues(&self, settings: &PluginSettings) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut seen_tags = HashSet::new();

        for (index, provider) in settings.providers.iter().enumerate() {
            issues.extend(self.provider_issues(index, provider));

            let tag = provider.tag.trim();
            if !tag.is_empty() && !seen_tags.insert(tag) {
                issues.push(ValidationIssue::new(
                    format!("providers[{}].tag", index),
                    format!("duplicate tag '{}'", tag),
                ));
            }
        }

        for (field, tags) in [
            ("systemTags", &settings.system_tags),
            ("userTags", &settings.user_tags),
            ("newChatTags", &settings.new_chat_tags),
        ] {
            for (index, tag) in tags.iter().enumerate() {
                if tag.trim().is_empty() {
                    issues.push(ValidationIssue::new(
                        format!("{}[{}]", field, index),
                        "tag must not be blank",
                    ));
                }
            }
        }

        if settings.mcp_concurrent_limit < 1 {
            issues.push(ValidationIssue::new(
                "mcpConcurrentLimit",
                "must be at least 1",
            ));
        }
        if settings.mcp_session_limit < 1 {
            issues.push(ValidationIssue::new("mcpSessionLimit", "must be at least 1"));
        }

        issues
    }

    /// 프로바이더 한 개 검사
    pub fn provider_issues(&self, index: usize, provider: &ProviderSettings) -> Vec<ValidationIssue> {
        let path = |field: &str| format!("providers[{}].{}", index, field);
        let mut issues = Vec::new();

        if provider.tag.trim().is_empty() {
            issues.push(ValidationIssue::new(path("tag"), "tag must not be blank"));
        }

        if provider.vendor.trim().is_empty() {
            issues.push(ValidationIssue::new(path("vendor"), "vendor must not be blank"));
        } else if Vendor::from_name(&provider.vendor).is_none() {
            issues.push(ValidationIssue::new(
                path("vendor"),
                format!("unknown vendor '{}'", provider.vendor),
            ));
        }

        let base_url = provider.options.base_url.trim();
        if !base_url.is_empty() {
            match Url::parse(base_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => issues.push(ValidationIssue::new(
                    path("options.baseURL"),
                    format!("unsupported scheme '{}'", url.scheme()),
                )),
                Err(e) => issues.push(ValidationIssue::new(
                    path("options.baseURL"),
                    format!("invalid URL: {}", e),
                )),
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_providers(providers: Vec<ProviderSettings>) -> PluginSettings {
        PluginSettings {
            providers,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(SettingsValidator::new()
            .validate(&PluginSettings::default())
            .is_ok());
    }

    #[test]
    fn test_valid_providers() {
        let settings = with_providers(vec![
            ProviderSettings::new("openai", "OpenAI").api_key("k"),
            ProviderSettings::new("local", "ollama").base_url("http://localhost:11434"),
        ]);
        assert!(SettingsValidator::new().validate(&settings).is_ok());
    }

    #[test]
    fn test_collects_every_issue() {
        let mut settings = with_providers(vec![
            ProviderSettings::new(" ", "OpenAI"),
            ProviderSettings::new("x", "Azure").base_url("ftp://host"),
            ProviderSettings::new("x", "").base_url("not a url"),
        ]);
        settings.user_tags.push(String::new());
        settings.mcp_session_limit = 0;

        let err = SettingsValidator::new().validate(&settings).unwrap_err();
        let Error::ValidationFailed { issues } = err else {
            panic!("expected validation error");
        };

        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "providers[0].tag",
                "providers[1].vendor",
                "providers[1].options.baseURL",
                "providers[2].vendor",
                "providers[2].options.baseURL",
                "providers[2].tag",
                "userTags[2]",
                "mcpSessionLimit",
            ]
        );
        assert!(issues[5].message.contains("duplicate"));
    }
}
