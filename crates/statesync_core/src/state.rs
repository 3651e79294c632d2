use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PresetId, PresetStateError, SavedStatePreset, ScopeKey};

/// Open map of independent state fragments (columns, filters, sort, ...).
pub type StateData = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentStateRecord {
    pub scope: ScopeKey,
    pub data: StateData,
    pub updated_at: DateTime<Utc>,
}

impl CurrentStateRecord {
    pub fn new(scope: ScopeKey, data: StateData) -> Self {
        Self {
            scope,
            data,
            updated_at: Utc::now(),
        }
    }

    pub fn fragment(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivePresetPointer {
    pub preset_id: Option<PresetId>,
    pub is_modified: bool,
}

/// Fragment-wise comparison: same fragment keys, each fragment equal.
pub fn fragments_diverge(current: &StateData, preset: &StateData) -> bool {
    current.len() != preset.len()
        || current
            .iter()
            .any(|(key, value)| preset.get(key) != Some(value))
}

/// In-memory state of one scope: the live record plus the preset it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeState {
    record: CurrentStateRecord,
    loaded: Option<SavedStatePreset>,
    modified: bool,
}

impl ScopeState {
    pub fn new(record: CurrentStateRecord) -> Self {
        Self {
            record,
            loaded: None,
            modified: false,
        }
    }

    pub fn record(&self) -> &CurrentStateRecord {
        &self.record
    }

    pub fn loaded_preset(&self) -> Option<&SavedStatePreset> {
        self.loaded.as_ref()
    }

    pub fn pointer(&self) -> ActivePresetPointer {
        ActivePresetPointer {
            preset_id: self.loaded.as_ref().map(|preset| preset.id),
            is_modified: self.modified,
        }
    }

    /// Merges one fragment; every other fragment, known or not, is kept.
    pub fn set_fragment(&mut self, key: impl Into<String>, value: Value, now: DateTime<Utc>) {
        self.record.data.insert(key.into(), value);
        self.record.updated_at = now;
        self.recompute_modified();
    }

    /// Replaces the data wholesale and makes `preset` the loaded preset.
    pub fn load_preset(&mut self, preset: SavedStatePreset, now: DateTime<Utc>) {
        self.record.data = preset.data.clone();
        self.record.updated_at = now;
        self.loaded = Some(preset);
        self.modified = false;
    }

    /// Re-applies the loaded preset's data. Only valid while modified.
    pub fn revert(&mut self, now: DateTime<Utc>) -> Result<(), PresetStateError> {
        let preset = self.modified_preset()?;
        let data = preset.data.clone();
        self.record.data = data;
        self.record.updated_at = now;
        self.modified = false;
        Ok(())
    }

    /// The loaded preset, provided the current data diverges from it.
    pub fn modified_preset(&self) -> Result<&SavedStatePreset, PresetStateError> {
        let preset = self
            .loaded
            .as_ref()
            .ok_or(PresetStateError::NoActivePreset)?;
        if !self.modified {
            return Err(PresetStateError::NotModified);
        }
        Ok(preset)
    }

    /// Records a server-confirmed copy of the loaded preset without touching the live data.
    pub fn accept_saved(&mut self, preset: SavedStatePreset) {
        self.loaded = Some(preset);
        self.recompute_modified();
    }

    pub fn forget_preset(&mut self, id: PresetId) -> bool {
        if self.loaded.as_ref().map(|preset| preset.id) == Some(id) {
            self.loaded = None;
            self.modified = false;
            true
        } else {
            false
        }
    }

    fn recompute_modified(&mut self) {
        self.modified = match &self.loaded {
            Some(preset) => fragments_diverge(&self.record.data, &preset.data),
            None => false,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> StateData {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn preset(id: PresetId, value: Value) -> SavedStatePreset {
        SavedStatePreset {
            id,
            scope: ScopeKey::table("measurements"),
            name: format!("preset {id}"),
            description: String::new(),
            data: data(value),
            is_active: false,
            factory_name: None,
            updated_at: Utc::now(),
        }
    }

    fn empty_state() -> ScopeState {
        ScopeState::new(CurrentStateRecord::new(
            ScopeKey::table("measurements"),
            StateData::new(),
        ))
    }

    #[test]
    fn divergence_is_fragment_wise() {
        let a = data(json!({"sort": "asc", "filters": {"site": 3}}));
        let b = data(json!({"filters": {"site": 3}, "sort": "asc"}));
        assert!(!fragments_diverge(&a, &b));
        let c = data(json!({"sort": "asc"}));
        assert!(fragments_diverge(&a, &c));
        assert!(fragments_diverge(&c, &a));
        let d = data(json!({"sort": "desc", "filters": {"site": 3}}));
        assert!(fragments_diverge(&a, &d));
    }

    #[test]
    fn set_fragment_keeps_unknown_fragments() {
        let mut state = empty_state();
        state.set_fragment("columns", json!(["a", "b"]), Utc::now());
        state.set_fragment("sort", json!("asc"), Utc::now());
        assert_eq!(state.record().fragment("columns"), Some(&json!(["a", "b"])));
        assert_eq!(state.record().fragment("sort"), Some(&json!("asc")));
        assert_eq!(state.pointer(), ActivePresetPointer::default());
    }

    #[test]
    fn modification_tracks_loaded_preset() {
        let mut state = empty_state();
        state.load_preset(preset(4, json!({"sort": "asc"})), Utc::now());
        assert_eq!(
            state.pointer(),
            ActivePresetPointer {
                preset_id: Some(4),
                is_modified: false
            }
        );

        state.set_fragment("sort", json!("desc"), Utc::now());
        assert!(state.pointer().is_modified);

        state.set_fragment("sort", json!("asc"), Utc::now());
        assert!(!state.pointer().is_modified);
    }

    #[test]
    fn revert_requires_loaded_and_modified() {
        let mut state = empty_state();
        assert_eq!(state.revert(Utc::now()), Err(PresetStateError::NoActivePreset));

        state.load_preset(preset(1, json!({"sort": "asc"})), Utc::now());
        assert_eq!(state.revert(Utc::now()), Err(PresetStateError::NotModified));

        state.set_fragment("page", json!(3), Utc::now());
        state.revert(Utc::now()).unwrap();
        assert_eq!(state.record().data, data(json!({"sort": "asc"})));
        assert!(!state.pointer().is_modified);
    }

    #[test]
    fn forgetting_loaded_preset_clears_pointer() {
        let mut state = empty_state();
        state.load_preset(preset(2, json!({})), Utc::now());
        assert!(!state.forget_preset(3));
        assert!(state.forget_preset(2));
        assert_eq!(state.pointer().preset_id, None);
    }
}
