use thiserror::Error;

use crate::preset::MAX_PRESET_NAME_LEN;

/// Rejected preset input. Surfaced to the user as-is; state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("preset name must not be empty")]
    EmptyName,
    #[error("preset name is {len} characters long (max {MAX_PRESET_NAME_LEN})")]
    NameTooLong { len: usize },
    #[error("a preset named {0:?} already exists in this scope")]
    DuplicateName(String),
    #[error("server rejected the preset: {0}")]
    Rejected(String),
}

/// Durable storage failure. Callers of the cache and registry never see this;
/// it is logged and the affected value falls back to its default.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("progress stream connection failed: {0}")]
    Connection(String),
    #[error("unreadable progress payload: {0}")]
    Payload(String),
    #[error("no job id given and no active job to resume")]
    NoActiveJob,
}

/// Precondition failures for operations that need a loaded, modified preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PresetStateError {
    #[error("no preset is loaded for this scope")]
    NoActivePreset,
    #[error("current state does not differ from the loaded preset")]
    NotModified,
}
