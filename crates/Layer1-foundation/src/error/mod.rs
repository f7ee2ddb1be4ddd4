//! Error types for Tars
//!
//! 설정 파이프라인, DI 컨테이너, 프로바이더 레지스트리의 에러를 중앙에서 관리

use std::fmt;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// 필드 단위 검증 실패 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// 문제가 된 필드 경로 (예: "providers[0].tag")
    pub path: String,

    /// 사람이 읽을 수 있는 설명
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Tars 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 라이프사이클 관련
    // ========================================================================
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    // ========================================================================
    // DI 관련
    // ========================================================================
    #[error("Failed to resolve '{token}': {source}")]
    ResolutionFailed {
        token: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Validation failed: {}", join_issues(.issues))]
    ValidationFailed { issues: Vec<ValidationIssue> },

    #[error("Change detection failed: {0}")]
    ChangeDetection(String),

    #[error("Propagation of change {change_id} failed: {message}")]
    Propagation { change_id: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Provider 관련
    // ========================================================================
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider creation failed: {tag} - {message}")]
    ProviderCreationFailed { tag: String, message: String },

    #[error("Provider error: {0}")]
    Provider(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::ValidationFailed { .. } | Error::ProviderNotFound(_) | Error::Config(_)
        )
    }

    /// 검증 에러 생성 헬퍼
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Error::ValidationFailed { issues }
    }

    /// Resolution 에러 생성 헬퍼
    pub fn resolution(token: impl Into<String>, source: Error) -> Self {
        Error::ResolutionFailed {
            token: token.into(),
            source: Box::new(source),
        }
    }

    /// Provider 생성 에러 생성 헬퍼
    pub fn provider_creation(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ProviderCreationFailed {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// 래핑된 원인까지 포함해 가장 안쪽 에러를 반환
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::ResolutionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_issue() {
        let err = Error::validation(vec![
            ValidationIssue::new("providers[0].tag", "must not be empty"),
            ValidationIssue::new("providers[1].vendor", "unknown vendor 'Foo'"),
        ]);

        let msg = err.to_string();
        assert!(msg.contains("providers[0].tag: must not be empty"));
        assert!(msg.contains("providers[1].vendor: unknown vendor 'Foo'"));
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_root_cause_unwraps_resolution() {
        let err = Error::resolution(
            "registry",
            Error::CircularDependency {
                path: vec!["a".into(), "b".into(), "a".into()],
            },
        );

        assert!(matches!(err.root_cause(), Error::CircularDependency { .. }));
        assert_eq!(
            err.root_cause().to_string(),
            "Circular dependency detected: a -> b -> a"
        );
    }
}
