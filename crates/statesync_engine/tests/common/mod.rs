#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use statesync_core::{
    validate_new_preset_name, validate_preset_name, JobId, Notification, PresetId, PresetPatch,
    SavedStatePreset, ScopeKey, StateData,
};
use statesync_engine::{NotificationSink, PresetError, PresetService, RemoteError};

pub fn init_logging() {
    statesync_logging::initialize_for_tests();
}

pub fn data(value: Value) -> StateData {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// In-memory backend that enforces "one active preset per scope" the way the server does.
#[derive(Default)]
pub struct FakePresetBackend {
    state: Mutex<FakeState>,
    fail_remote: AtomicBool,
}

#[derive(Default)]
struct FakeState {
    next_id: PresetId,
    presets: Vec<SavedStatePreset>,
    calls: Vec<String>,
}

impl FakePresetBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn fail_remote(&self, fail: bool) {
        self.fail_remote.store(fail, Ordering::SeqCst);
    }

    pub fn stored(&self, id: PresetId) -> Option<SavedStatePreset> {
        let state = self.state.lock().unwrap();
        state.presets.iter().find(|p| p.id == id).cloned()
    }

    fn record(&self, call: String) -> Result<(), PresetError> {
        self.state.lock().unwrap().calls.push(call);
        if self.fail_remote.load(Ordering::SeqCst) {
            return Err(PresetError::Remote(RemoteError::Network(
                "connection refused".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PresetService for FakePresetBackend {
    async fn list(&self, scope: &ScopeKey) -> Result<Vec<SavedStatePreset>, PresetError> {
        self.record(format!("list {scope}"))?;
        let state = self.state.lock().unwrap();
        Ok(state
            .presets
            .iter()
            .filter(|p| p.scope == *scope)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        scope: &ScopeKey,
        name: &str,
        description: &str,
        data: StateData,
    ) -> Result<SavedStatePreset, PresetError> {
        self.record(format!("create {scope} {name}"))?;
        let mut state = self.state.lock().unwrap();
        let existing: Vec<_> = state
            .presets
            .iter()
            .filter(|p| p.scope == *scope)
            .cloned()
            .collect();
        let name = validate_new_preset_name(name, &existing)?;
        state.next_id += 1;
        let preset = SavedStatePreset {
            id: state.next_id,
            scope: scope.clone(),
            name,
            description: description.to_string(),
            data,
            is_active: false,
            factory_name: None,
            updated_at: Utc::now(),
        };
        state.presets.push(preset.clone());
        Ok(preset)
    }

    async fn update(
        &self,
        id: PresetId,
        patch: PresetPatch,
    ) -> Result<SavedStatePreset, PresetError> {
        self.record(format!("update {id}"))?;
        let mut state = self.state.lock().unwrap();
        let preset = state
            .presets
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found(id))?;
        if let Some(name) = patch.name {
            preset.name = validate_preset_name(&name)?;
        }
        if let Some(description) = patch.description {
            preset.description = description;
        }
        if let Some(data) = patch.data {
            preset.data = data;
        }
        preset.updated_at = Utc::now();
        Ok(preset.clone())
    }

    async fn delete(&self, id: PresetId) -> Result<(), PresetError> {
        self.record(format!("delete {id}"))?;
        let mut state = self.state.lock().unwrap();
        let before = state.presets.len();
        state.presets.retain(|p| p.id != id);
        if state.presets.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn set_active(&self, id: PresetId) -> Result<(), PresetError> {
        self.record(format!("set_active {id}"))?;
        let mut state = self.state.lock().unwrap();
        let scope = state
            .presets
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.scope.clone())
            .ok_or_else(|| not_found(id))?;
        for preset in state.presets.iter_mut().filter(|p| p.scope == scope) {
            preset.is_active = preset.id == id;
        }
        Ok(())
    }

    async fn start_factory(
        &self,
        scope: &ScopeKey,
        factory_name: &str,
        _name: &str,
    ) -> Result<JobId, PresetError> {
        self.record(format!("factory {scope} {factory_name}"))?;
        Ok(format!("factory-{factory_name}"))
    }
}

fn not_found(id: PresetId) -> PresetError {
    PresetError::Remote(RemoteError::HttpStatus {
        status: 404,
        body: format!("preset {id} not found"),
    })
}

#[derive(Default)]
pub struct RecordingSink {
    notes: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notes(&self) -> Vec<Notification> {
        self.notes.lock().unwrap().clone()
    }

    pub fn notes_for(&self, job_id: &str) -> Vec<Notification> {
        self.notes()
            .into_iter()
            .filter(|n| n.job_id == job_id)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, notification: Notification) {
        self.notes.lock().unwrap().push(notification);
    }
}
