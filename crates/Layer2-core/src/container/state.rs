//! Container lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ContainerState - 단방향 생명주기
// ============================================================================

/// 컨테이너 상태
///
/// `Uninitialized → Configured → Ready → Disposed`, 역방향 전이 없음
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// 생성 직후
    Uninitialized,

    /// 바인딩 등록 중
    Configured,

    /// resolve 가능
    Ready,

    /// 종료됨 (재초기화 불가)
    Disposed,
}

impl ContainerState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ContainerState::Ready)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContainerState::Disposed)
    }

    /// 허용되는 전이인지
    pub fn can_transition_to(&self, next: ContainerState) -> bool {
        matches!(
            (self, next),
            (ContainerState::Uninitialized, ContainerState::Configured)
                | (ContainerState::Configured, ContainerState::Ready)
                | (ContainerState::Configured, ContainerState::Uninitialized) // 초기화 실패 롤백
                | (ContainerState::Configured, ContainerState::Disposed)
                | (ContainerState::Ready, ContainerState::Disposed)
        )
    }
}

impl Default for ContainerState {
    fn default() -> Self {
        ContainerState::Uninitialized
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerState::Uninitialized => write!(f, "Uninitialized"),
            ContainerState::Configured => write!(f, "Configured"),
            ContainerState::Ready => write!(f, "Ready"),
            ContainerState::Disposed => write!(f, "Disposed"),
        }
    }
}

// ============================================================================
// StateTransition
// ============================================================================

/// 상태 전이 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ContainerState,
    pub to: ContainerState,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(from: ContainerState, to: ContainerState) -> Self {
        Self {
            from,
            to,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_way_lifecycle() {
        use ContainerState::*;

        assert!(Uninitialized.can_transition_to(Configured));
        assert!(Configured.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Disposed));

        assert!(!Ready.can_transition_to(Uninitialized));
        assert!(!Disposed.can_transition_to(Uninitialized));
        assert!(!Disposed.can_transition_to(Ready));
        assert!(Disposed.is_terminal());
        assert_eq!(Ready.to_string(), "Ready");
    }
}
