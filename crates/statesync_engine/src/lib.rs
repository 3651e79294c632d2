//! Statesync engine: storage, HTTP, debounced persistence and progress streaming.
mod cache;
mod config;
mod delayed;
mod http;
mod presets;
mod progress;
mod registry;
mod sse;
mod storage;
mod store;

pub use cache::{LocalCache, DEFAULT_DEBOUNCE};
pub use config::{ClientConfig, DEFAULT_STORAGE_DIR};
pub use delayed::DelayedTask;
pub use http::{ApiClient, RemoteError};
pub use presets::{HttpPresetService, PresetError, PresetService};
pub use progress::{
    ByteStream, HttpProgressTransport, JobStatus, LogNotificationSink, NotificationSink,
    ProgressClient, ProgressHandle, ProgressTransport,
};
pub use registry::{JobRegistry, JOB_REGISTRY_KEY};
pub use sse::{SseDecoder, SseEvent};
pub use storage::{storage_filename, DurableStorage, FileStorage, MemoryStorage};
pub use store::{StateStore, StoreError};

use std::sync::Arc;

/// Storage selected by the configuration: files under `storage_dir`, or memory.
pub fn storage_from_config(config: &ClientConfig) -> Arc<dyn DurableStorage> {
    match &config.storage_dir {
        Some(dir) => Arc::new(FileStorage::new(dir.clone())),
        None => Arc::new(MemoryStorage::new()),
    }
}
