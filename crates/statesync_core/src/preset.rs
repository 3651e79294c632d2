use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ScopeKey, StateData, ValidationError};

pub const MAX_PRESET_NAME_LEN: usize = 64;

pub type PresetId = i64;

/// Named, shareable snapshot of one scope's state, as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedStatePreset {
    pub id: PresetId,
    #[serde(flatten)]
    pub scope: ScopeKey,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data: StateData,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_name: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPreset {
    #[serde(flatten)]
    pub scope: ScopeKey,
    pub name: String,
    pub description: String,
    pub data: StateData,
}

/// Partial update; only fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresetPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StateData>,
}

impl PresetPatch {
    pub fn data(data: StateData) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.data.is_none()
    }
}

/// Checks a preset name for emptiness and length. Returns the trimmed name.
pub fn validate_preset_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let len = trimmed.chars().count();
    if len > MAX_PRESET_NAME_LEN {
        return Err(ValidationError::NameTooLong { len });
    }
    Ok(trimmed.to_string())
}

/// Full create-time check: shape plus uniqueness among `existing` presets of the scope.
pub fn validate_new_preset_name(
    name: &str,
    existing: &[SavedStatePreset],
) -> Result<String, ValidationError> {
    let name = validate_preset_name(name)?;
    if existing.iter().any(|preset| preset.name.trim() == name) {
        return Err(ValidationError::DuplicateName(name));
    }
    Ok(name)
}
