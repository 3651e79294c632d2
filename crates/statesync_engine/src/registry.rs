use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use statesync_core::{JobRecord, StorageError};
use statesync_logging::{sync_debug, sync_info, sync_warn};

use crate::storage::DurableStorage;

pub const JOB_REGISTRY_KEY: &str = "statesync:jobs";

/// Durable list of in-flight jobs, shared by every scope.
///
/// Each operation re-reads the stored list so that a fresh process sees jobs
/// registered before a reload.
pub struct JobRegistry {
    storage: Arc<dyn DurableStorage>,
    guard: Mutex<()>,
}

impl JobRegistry {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            storage,
            guard: Mutex::new(()),
        }
    }

    /// Adds the job unless it is already listed; an existing entry keeps its `started_at`.
    pub fn register(&self, job_id: &str, title: Option<&str>) {
        self.modify(|jobs| {
            if jobs.iter().any(|job| job.job_id == job_id) {
                sync_debug!("Job {} already registered", job_id);
                return false;
            }
            jobs.push(JobRecord {
                job_id: job_id.to_string(),
                title: title.map(str::to_string),
                started_at: Utc::now(),
            });
            sync_info!("Registered job {}", job_id);
            true
        });
    }

    pub fn unregister(&self, job_id: &str) {
        self.modify(|jobs| {
            let before = jobs.len();
            jobs.retain(|job| job.job_id != job_id);
            let removed = jobs.len() != before;
            if removed {
                sync_info!("Unregistered job {}", job_id);
            }
            removed
        });
    }

    pub fn list_active(&self) -> Vec<JobRecord> {
        let _guard = self.lock();
        self.load()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.list_active().iter().any(|job| job.job_id == job_id)
    }

    /// Latest-started job; on equal timestamps the later registration wins.
    pub fn most_recent(&self) -> Option<JobRecord> {
        self.list_active()
            .into_iter()
            .enumerate()
            .max_by_key(|(position, job)| (job.started_at, *position))
            .map(|(_, job)| job)
    }

    /// The stored list is rewritten whole, so a panic mid-change leaves nothing to repair.
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modify(&self, change: impl FnOnce(&mut Vec<JobRecord>) -> bool) {
        let _guard = self.lock();
        let mut jobs = self.load();
        if change(&mut jobs) {
            if let Err(err) = self.store(&jobs) {
                sync_warn!("Failed to persist job registry: {}", err);
            }
        }
    }

    fn load(&self) -> Vec<JobRecord> {
        let text = match self.storage.get(JOB_REGISTRY_KEY) {
            Ok(Some(text)) => text,
            Ok(None) => return Vec::new(),
            Err(err) => {
                sync_warn!("Failed to read job registry: {}", err);
                return Vec::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(jobs) => jobs,
            Err(err) => {
                sync_warn!("Failed to parse job registry, starting empty: {}", err);
                Vec::new()
            }
        }
    }

    fn store(&self, jobs: &[JobRecord]) -> Result<(), StorageError> {
        let text = serde_json::to_string(jobs)?;
        self.storage.set(JOB_REGISTRY_KEY, &text)
    }
}
