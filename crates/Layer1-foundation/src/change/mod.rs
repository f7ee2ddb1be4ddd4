//! Change Detection - 두 설정 스냅샷 사이의 구조적 diff
//!
//! 순수 함수만 존재한다. 이벤트 발행/이력 관리는 상위 레이어(notifier)의 몫.
//!
//! ## 경로 규칙
//!
//! ```text
//! providers[0]                 ← 프로바이더 전체
//! providers[0].options         ← 여러 옵션 필드가 함께 바뀐 경우
//! providers[0].options.apiKey  ← 단일 필드
//! answerDelayInMilliseconds    ← 일반 필드
//! ```
//!
//! `modified` 변경의 `path` 는 모든 필드 변경이 공유하는 가장 깊은 경로이고,
//! `oldValue` / `newValue` 는 그 경로의 값이다. 전체 분해는 `fieldChanges` 에 있다.

use crate::settings::{PluginSettings, ProviderSettings};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 프로바이더 단위로 독립 비교하는 필드 (상대 경로)
pub const PROVIDER_FIELDS: &[&str] = &[
    "tag",
    "vendor",
    "options.apiKey",
    "options.baseURL",
    "options.model",
    "options.parameters",
];

// ============================================================================
// Types
// ============================================================================

/// 변경 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// 필드 하나의 변경
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    /// 절대 경로 (예: "providers[0].options.apiKey")
    pub path: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// 프로바이더 변경
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ProviderChange {
    Added {
        path: String,
        tag: String,
        new_value: ProviderSettings,
    },
    Removed {
        path: String,
        tag: String,
        old_value: ProviderSettings,
    },
    Modified {
        path: String,
        tag: String,
        old_value: Value,
        new_value: Value,
        field_changes: Vec<FieldChange>,
    },
}

impl ProviderChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Added,
            Self::Removed { .. } => ChangeKind::Removed,
            Self::Modified { .. } => ChangeKind::Modified,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Added { tag, .. } | Self::Removed { tag, .. } | Self::Modified { tag, .. } => {
                tag
            }
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. }
            | Self::Removed { path, .. }
            | Self::Modified { path, .. } => path,
        }
    }

    /// 필드 분해 (modified 가 아니면 빈 슬라이스)
    pub fn field_changes(&self) -> &[FieldChange] {
        match self {
            Self::Modified { field_changes, .. } => field_changes,
            _ => &[],
        }
    }
}

/// 일반 필드 변경 (항상 modified)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettingChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// 필드명 (JSON 키)
    pub path: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// 변경 집합
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsChanges {
    pub providers: Vec<ProviderChange>,
    pub general: Vec<GeneralSettingChange>,
}

impl SettingsChanges {
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty() && self.general.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len() + self.general.len()
    }

    /// 종류별 프로바이더 변경
    pub fn providers_of(&self, kind: ChangeKind) -> impl Iterator<Item = &ProviderChange> {
        self.providers.iter().filter(move |c| c.kind() == kind)
    }

    /// 일반 필드가 바뀌었는지
    pub fn general_changed(&self, field: &str) -> bool {
        self.general.iter().any(|c| c.path == field)
    }
}

// ============================================================================
// Detection
// ============================================================================

/// 두 스냅샷을 비교해 변경 집합을 만든다
pub fn detect_changes(
    new_settings: &PluginSettings,
    previous_settings: &PluginSettings,
) -> Result<SettingsChanges> {
    Ok(SettingsChanges {
        providers: detect_provider_changes(&new_settings.providers, &previous_settings.providers)?,
        general: detect_general_changes(new_settings, previous_settings)?,
    })
}

/// tag → (index, provider) - 중복 tag 는 첫 번째가 이긴다
fn index_by_tag(providers: &[ProviderSettings]) -> HashMap<&str, (usize, &ProviderSettings)> {
    let mut map = HashMap::with_capacity(providers.len());
    for (index, provider) in providers.iter().enumerate() {
        map.entry(provider.tag.as_str()).or_insert((index, provider));
    }
    map
}

fn detect_provider_changes(
    new_providers: &[ProviderSettings],
    old_providers: &[ProviderSettings],
) -> Result<Vec<ProviderChange>> {
    let new_map = index_by_tag(new_providers);
    let old_map = index_by_tag(old_providers);
    let mut changes = Vec::new();

    for (index, provider) in new_providers.iter().enumerate() {
        // 가려진 중복 항목은 건너뜀
        if new_map.get(provider.tag.as_str()).map(|(i, _)| *i) != Some(index) {
            continue;
        }

        match old_map.get(provider.tag.as_str()) {
            None => changes.push(ProviderChange::Added {
                path: provider_path(index),
                tag: provider.tag.clone(),
                new_value: provider.clone(),
            }),
            Some((_, old)) => {
                let old_value = to_json(old)?;
                let new_value = to_json(provider)?;
                if old_value != new_value {
                    changes.push(modified_change(index, &provider.tag, &old_value, &new_value));
                }
            }
        }
    }

    for (index, provider) in old_providers.iter().enumerate() {
        if old_map.get(provider.tag.as_str()).map(|(i, _)| *i) != Some(index) {
            continue;
        }
        if !new_map.contains_key(provider.tag.as_str()) {
            changes.push(ProviderChange::Removed {
                path: provider_path(index),
                tag: provider.tag.clone(),
                old_value: provider.clone(),
            });
        }
    }

    Ok(changes)
}

fn modified_change(index: usize, tag: &str, old_value: &Value, new_value: &Value) -> ProviderChange {
    let base = provider_path(index);

    let differing: Vec<&str> = PROVIDER_FIELDS
        .iter()
        .copied()
        .filter(|field| {
            let pointer = to_pointer(field);
            old_value.pointer(&pointer) != new_value.pointer(&pointer)
        })
        .collect();

    let field_changes = differing
        .iter()
        .map(|field| {
            let pointer = to_pointer(field);
            FieldChange {
                path: format!("{}.{}", base, field),
                old_value: old_value.pointer(&pointer).cloned().unwrap_or(Value::Null),
                new_value: new_value.pointer(&pointer).cloned().unwrap_or(Value::Null),
            }
        })
        .collect();

    let common = common_prefix(&differing);
    let (path, pointer) = if common.is_empty() {
        (base, String::new())
    } else {
        (format!("{}.{}", base, common), to_pointer(&common))
    };

    ProviderChange::Modified {
        path,
        tag: tag.to_string(),
        old_value: old_value.pointer(&pointer).cloned().unwrap_or(Value::Null),
        new_value: new_value.pointer(&pointer).cloned().unwrap_or(Value::Null),
        field_changes,
    }
}

fn detect_general_changes(
    new_settings: &PluginSettings,
    previous_settings: &PluginSettings,
) -> Result<Vec<GeneralSettingChange>> {
    let new_values = new_settings
        .general_values()
        .map_err(|e| Error::ChangeDetection(e.to_string()))?;
    let old_values = previous_settings
        .general_values()
        .map_err(|e| Error::ChangeDetection(e.to_string()))?;

    Ok(new_values
        .into_iter()
        .zip(old_values)
        .filter(|((_, new_value), (_, old_value))| new_value != old_value)
        .map(|((field, new_value), (_, old_value))| GeneralSettingChange {
            kind: ChangeKind::Modified,
            path: field.to_string(),
            old_value,
            new_value,
        })
        .collect())
}

// ============================================================================
// Round-trip
// ============================================================================

/// `fieldChanges` 를 이전 프로바이더에 적용해 새 프로바이더를 재구성
pub fn apply_field_changes(
    old: &ProviderSettings,
    field_changes: &[FieldChange],
) -> Result<ProviderSettings> {
    let mut value = to_json(old)?;

    for change in field_changes {
        let relative = relative_path(&change.path).ok_or_else(|| {
            Error::ChangeDetection(format!("not a provider field path: {}", change.path))
        })?;
        let slot = value.pointer_mut(&to_pointer(relative)).ok_or_else(|| {
            Error::ChangeDetection(format!("unknown provider field: {}", change.path))
        })?;
        *slot = change.new_value.clone();
    }

    serde_json::from_value(value).map_err(|e| Error::ChangeDetection(e.to_string()))
}

// ============================================================================
// Path helpers
// ============================================================================

fn provider_path(index: usize) -> String {
    format!("providers[{}]", index)
}

/// "providers[3].options.apiKey" → "options.apiKey"
fn relative_path(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("providers[")?;
    let close = rest.find(']')?;
    rest[close + 1..].strip_prefix('.')
}

/// "options.apiKey" → "/options/apiKey"
fn to_pointer(relative: &str) -> String {
    relative.split('.').fold(String::new(), |mut acc, segment| {
        acc.push('/');
        acc.push_str(segment);
        acc
    })
}

fn common_prefix(fields: &[&str]) -> String {
    let Some((first, rest)) = fields.split_first() else {
        return String::new();
    };

    let mut prefix: Vec<&str> = first.split('.').collect();
    for field in rest {
        let segments: Vec<&str> = field.split('.').collect();
        let shared = prefix
            .iter()
            .zip(&segments)
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(shared);
    }
    prefix.join(".")
}

fn to_json(provider: &ProviderSettings) -> Result<Value> {
    serde_json::to_value(provider).map_err(|e| Error::ChangeDetection(e.to_string()))
}
