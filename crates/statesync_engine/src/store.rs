use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use statesync_core::{
    ActivePresetPointer, CurrentStateRecord, Deferred, PresetId, PresetPatch, PresetStateError,
    SavedStatePreset, ScopeKey, ScopeState, StateData, SubscriberRegistry, SubscriptionId,
    ValidationError,
};
use statesync_logging::{sync_debug, sync_info, sync_warn};
use thiserror::Error;

use crate::cache::LocalCache;
use crate::http::RemoteError;
use crate::presets::{PresetError, PresetService};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("no preset is loaded for this scope")]
    NoActivePreset,
    #[error("current state does not differ from the loaded preset")]
    NotModified,
    #[error("preset {0} is not listed for this scope")]
    UnknownPreset(PresetId),
}

impl From<PresetError> for StoreError {
    fn from(err: PresetError) -> Self {
        match err {
            PresetError::Validation(err) => StoreError::Validation(err),
            PresetError::Remote(err) => StoreError::Remote(err),
        }
    }
}

impl From<PresetStateError> for StoreError {
    fn from(err: PresetStateError) -> Self {
        match err {
            PresetStateError::NoActivePreset => StoreError::NoActivePreset,
            PresetStateError::NotModified => StoreError::NotModified,
        }
    }
}

/// Single entry point for scoped UI state: fast local state backed by the
/// [`LocalCache`], durable shareable presets through a [`PresetService`].
///
/// Local mutations are never rolled back when a remote call fails.
pub struct StateStore {
    cache: LocalCache,
    presets: Arc<dyn PresetService>,
    scopes: HashMap<ScopeKey, ScopeState>,
    defaults: HashMap<ScopeKey, StateData>,
    subscribers: SubscriberRegistry,
    deferred: Deferred,
}

impl StateStore {
    pub fn new(cache: LocalCache, presets: Arc<dyn PresetService>) -> Self {
        Self {
            cache,
            presets,
            scopes: HashMap::new(),
            defaults: HashMap::new(),
            subscribers: SubscriberRegistry::new(),
            deferred: Deferred::default(),
        }
    }

    pub fn preset_service(&self) -> Arc<dyn PresetService> {
        self.presets.clone()
    }

    /// Data returned for `scope` when neither memory nor storage has a record.
    pub fn register_defaults(&mut self, scope: &ScopeKey, data: StateData) {
        self.defaults.insert(scope.clone(), data);
    }

    pub fn get_current(&mut self, scope: &ScopeKey) -> CurrentStateRecord {
        self.scope_state(scope).record().clone()
    }

    pub fn get_current_or(&mut self, scope: &ScopeKey, default: StateData) -> CurrentStateRecord {
        self.defaults.entry(scope.clone()).or_insert(default);
        self.get_current(scope)
    }

    pub fn active_pointer(&mut self, scope: &ScopeKey) -> ActivePresetPointer {
        self.scope_state(scope).pointer()
    }

    pub fn loaded_preset(&mut self, scope: &ScopeKey) -> Option<SavedStatePreset> {
        self.scope_state(scope).loaded_preset().cloned()
    }

    pub fn subscribe<F>(&mut self, scope: &ScopeKey, subscriber: F) -> SubscriptionId
    where
        F: FnMut(&CurrentStateRecord, &mut Deferred) + Send + 'static,
    {
        self.subscribers.subscribe(scope, subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Merges one fragment. The new value is readable immediately; the durable
    /// write is debounced and subscribers are notified before this returns.
    pub fn set_fragment(&mut self, scope: &ScopeKey, key: impl Into<String>, value: Value) {
        self.apply_fragment(scope, key.into(), value);
        self.drain_deferred();
    }

    /// Replaces the scope's data with the preset's and makes it the loaded preset.
    pub fn load_preset(&mut self, preset: SavedStatePreset) {
        let scope = preset.scope.clone();
        sync_debug!("Loading preset {} into {}", preset.id, scope);
        self.scope_state(&scope).load_preset(preset, Utc::now());
        self.publish(&scope);
        self.drain_deferred();
    }

    /// Re-applies the loaded preset's data locally, without a remote call.
    pub fn revert_to_active_preset(&mut self, scope: &ScopeKey) -> Result<(), StoreError> {
        self.scope_state(scope).revert(Utc::now())?;
        self.publish(scope);
        self.drain_deferred();
        Ok(())
    }

    /// Saves the current data as a new preset, which then becomes the loaded one.
    pub async fn save_as_new_preset(
        &mut self,
        scope: &ScopeKey,
        name: &str,
        description: &str,
    ) -> Result<SavedStatePreset, StoreError> {
        let data = self.scope_state(scope).record().data.clone();
        let created = self.presets.create(scope, name, description, data).await?;
        self.scope_state(scope).accept_saved(created.clone());
        Ok(created)
    }

    /// Writes the current data into the loaded preset. Requires local modifications.
    pub async fn save_modification_to_active_preset(
        &mut self,
        scope: &ScopeKey,
    ) -> Result<SavedStatePreset, StoreError> {
        let state = self.scope_state(scope);
        let id = state.modified_preset()?.id;
        let data = state.record().data.clone();
        let updated = self.presets.update(id, PresetPatch::data(data)).await?;
        self.scope_state(scope).accept_saved(updated.clone());
        sync_info!("Saved modifications of {} into preset {}", scope, id);
        Ok(updated)
    }

    /// Makes `id` the active preset on the server, then re-fetches the scope's
    /// list and loads the server's copy. Returns the fresh list.
    pub async fn activate_preset(
        &mut self,
        scope: &ScopeKey,
        id: PresetId,
    ) -> Result<Vec<SavedStatePreset>, StoreError> {
        self.presets.set_active(id).await?;
        let fresh = self.presets.list(scope).await?;
        let preset = fresh
            .iter()
            .find(|preset| preset.id == id)
            .cloned()
            .ok_or(StoreError::UnknownPreset(id))?;
        if !preset.is_active {
            sync_warn!("Server did not report preset {} as active after set-active", id);
        }
        self.load_preset(preset);
        Ok(fresh)
    }

    /// Loads whichever preset the server marks active for `scope`, if any.
    pub async fn restore_active_preset(
        &mut self,
        scope: &ScopeKey,
    ) -> Result<Option<SavedStatePreset>, StoreError> {
        let presets = self.presets.list(scope).await?;
        let active = presets.into_iter().find(|preset| preset.is_active);
        if let Some(preset) = &active {
            self.load_preset(preset.clone());
        }
        Ok(active)
    }

    pub async fn list_presets(
        &self,
        scope: &ScopeKey,
    ) -> Result<Vec<SavedStatePreset>, StoreError> {
        Ok(self.presets.list(scope).await?)
    }

    pub async fn delete_preset(&mut self, scope: &ScopeKey, id: PresetId) -> Result<(), StoreError> {
        self.presets.delete(id).await?;
        if self.scope_state(scope).forget_preset(id) {
            sync_debug!("Deleted preset {} was loaded in {}; pointer cleared", id, scope);
        }
        Ok(())
    }

    /// Forces every pending debounced write to storage.
    pub fn flush(&mut self) {
        self.cache.flush();
    }

    fn scope_state(&mut self, scope: &ScopeKey) -> &mut ScopeState {
        let cache = &mut self.cache;
        let defaults = &self.defaults;
        self.scopes.entry(scope.clone()).or_insert_with(|| {
            let default = defaults.get(scope).cloned().unwrap_or_default();
            ScopeState::new(cache.read(scope, move || default))
        })
    }

    fn apply_fragment(&mut self, scope: &ScopeKey, key: String, value: Value) {
        self.scope_state(scope).set_fragment(key, value, Utc::now());
        self.publish(scope);
    }

    fn publish(&mut self, scope: &ScopeKey) {
        let record = self.scope_state(scope).record().clone();
        self.cache.write(record.clone());
        self.subscribers.notify(&record, &mut self.deferred);
    }

    fn drain_deferred(&mut self) {
        while let Some(mutation) = self.deferred.pop() {
            self.apply_fragment(&mutation.scope, mutation.key, mutation.value);
        }
    }
}
