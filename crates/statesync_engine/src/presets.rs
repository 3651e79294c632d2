use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use statesync_core::{
    validate_new_preset_name, validate_preset_name, JobId, NewPreset, PresetId, PresetPatch,
    SavedStatePreset, ScopeKey, StateData, ValidationError,
};
use statesync_logging::{sync_debug, sync_info};
use thiserror::Error;

use crate::http::{is_validation_status, ApiClient, RemoteError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresetError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Remote CRUD over saved-state presets. The backend owns the
/// "one active preset per scope" rule.
#[async_trait::async_trait]
pub trait PresetService: Send + Sync {
    async fn list(&self, scope: &ScopeKey) -> Result<Vec<SavedStatePreset>, PresetError>;

    async fn create(
        &self,
        scope: &ScopeKey,
        name: &str,
        description: &str,
        data: StateData,
    ) -> Result<SavedStatePreset, PresetError>;

    async fn update(
        &self,
        id: PresetId,
        patch: PresetPatch,
    ) -> Result<SavedStatePreset, PresetError>;

    async fn delete(&self, id: PresetId) -> Result<(), PresetError>;

    async fn set_active(&self, id: PresetId) -> Result<(), PresetError>;

    /// Asks the backend to build a preset with a long-running job.
    async fn start_factory(
        &self,
        scope: &ScopeKey,
        factory_name: &str,
        name: &str,
    ) -> Result<JobId, PresetError>;
}

pub struct HttpPresetService {
    api: ApiClient,
    base_path: String,
}

#[derive(Debug, Deserialize)]
struct FactoryStarted {
    job_id: JobId,
}

impl HttpPresetService {
    pub fn new(api: ApiClient, base_path: impl Into<String>) -> Self {
        let mut base_path = base_path.into();
        if !base_path.ends_with('/') {
            base_path.push('/');
        }
        Self { api, base_path }
    }

    fn item_path(&self, id: PresetId) -> String {
        format!("{}{id}/", self.base_path)
    }
}

fn map_remote(err: RemoteError) -> PresetError {
    match err {
        RemoteError::HttpStatus { status, body } if is_validation_status(status) => {
            PresetError::Validation(ValidationError::Rejected(body))
        }
        other => PresetError::Remote(other),
    }
}

#[async_trait::async_trait]
impl PresetService for HttpPresetService {
    async fn list(&self, scope: &ScopeKey) -> Result<Vec<SavedStatePreset>, PresetError> {
        let scope_type = scope.scope_type().as_str();
        let presets: Vec<SavedStatePreset> = self
            .api
            .get_json(
                &self.base_path,
                &[("scope_type", scope_type), ("scope_id", scope.scope_id())],
            )
            .await?;
        // Servers that ignore the filter must not leak other scopes' presets.
        Ok(presets
            .into_iter()
            .filter(|preset| preset.scope == *scope)
            .collect())
    }

    async fn create(
        &self,
        scope: &ScopeKey,
        name: &str,
        description: &str,
        data: StateData,
    ) -> Result<SavedStatePreset, PresetError> {
        validate_preset_name(name)?;
        let existing = self.list(scope).await?;
        let name = validate_new_preset_name(name, &existing)?;
        let body = NewPreset {
            scope: scope.clone(),
            name,
            description: description.to_string(),
            data,
        };
        let created: SavedStatePreset = self
            .api
            .send_mutating_json(Method::POST, &self.base_path, Some(&body))
            .await
            .map_err(map_remote)?;
        sync_info!("Created preset {} ({}) for {}", created.id, created.name, scope);
        Ok(created)
    }

    async fn update(
        &self,
        id: PresetId,
        mut patch: PresetPatch,
    ) -> Result<SavedStatePreset, PresetError> {
        if let Some(name) = patch.name.as_deref() {
            patch.name = Some(validate_preset_name(name)?);
        }
        let updated = self
            .api
            .send_mutating_json(Method::PATCH, &self.item_path(id), Some(&patch))
            .await
            .map_err(map_remote)?;
        sync_debug!("Updated preset {}", id);
        Ok(updated)
    }

    async fn delete(&self, id: PresetId) -> Result<(), PresetError> {
        self.api
            .send_mutating::<()>(Method::DELETE, &self.item_path(id), None)
            .await
            .map_err(map_remote)?;
        sync_info!("Deleted preset {}", id);
        Ok(())
    }

    async fn set_active(&self, id: PresetId) -> Result<(), PresetError> {
        let path = format!("{}set-active/", self.item_path(id));
        self.api
            .send_mutating::<()>(Method::POST, &path, None)
            .await
            .map_err(map_remote)?;
        sync_info!("Requested preset {} to become active", id);
        Ok(())
    }

    async fn start_factory(
        &self,
        scope: &ScopeKey,
        factory_name: &str,
        name: &str,
    ) -> Result<JobId, PresetError> {
        let name = validate_preset_name(name)?;
        let body = json!({
            "scope_type": scope.scope_type(),
            "scope_id": scope.scope_id(),
            "factory_name": factory_name,
            "name": name,
        });
        let path = format!("{}factory/", self.base_path);
        let started: FactoryStarted = self
            .api
            .send_mutating_json(Method::POST, &path, Some(&body))
            .await
            .map_err(map_remote)?;
        sync_info!(
            "Preset factory {} started job {} for {}",
            factory_name,
            started.job_id,
            scope
        );
        Ok(started.job_id)
    }
}
