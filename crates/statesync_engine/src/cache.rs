use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use statesync_core::{CurrentStateRecord, ScopeKey, StateData};
use statesync_logging::{sync_debug, sync_error, sync_warn};

use crate::delayed::DelayedTask;
use crate::storage::DurableStorage;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

type PendingWrites = Arc<Mutex<HashMap<ScopeKey, CurrentStateRecord>>>;

/// Per-scope record cache: synchronous reads from memory, debounced durable writes.
pub struct LocalCache {
    storage: Arc<dyn DurableStorage>,
    debounce: Duration,
    entries: HashMap<ScopeKey, CurrentStateRecord>,
    pending: PendingWrites,
    timers: HashMap<ScopeKey, DelayedTask>,
}

impl LocalCache {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self::with_debounce(storage, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(storage: Arc<dyn DurableStorage>, debounce: Duration) -> Self {
        Self {
            storage,
            debounce,
            entries: HashMap::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            timers: HashMap::new(),
        }
    }

    /// Returns the cached record, loading it from storage on first access.
    /// Missing or unreadable records fall back to `default` and seed the cache.
    pub fn read(
        &mut self,
        scope: &ScopeKey,
        default: impl FnOnce() -> StateData,
    ) -> CurrentStateRecord {
        if let Some(record) = self.entries.get(scope) {
            return record.clone();
        }
        let record = self
            .load(scope)
            .unwrap_or_else(|| CurrentStateRecord::new(scope.clone(), default()));
        self.entries.insert(scope.clone(), record.clone());
        record
    }

    pub fn contains(&mut self, scope: &ScopeKey) -> bool {
        if self.entries.contains_key(scope) {
            return true;
        }
        match self.load(scope) {
            Some(record) => {
                self.entries.insert(scope.clone(), record);
                true
            }
            None => false,
        }
    }

    /// Updates memory now and schedules the durable write. Writes for the same
    /// scope inside the debounce window collapse into one carrying the latest record.
    pub fn write(&mut self, record: CurrentStateRecord) {
        let scope = record.scope.clone();
        self.entries.insert(scope.clone(), record.clone());
        match self.pending.lock() {
            Ok(mut pending) => {
                pending.insert(scope.clone(), record);
            }
            Err(_) => {
                sync_error!("pending write queue poisoned; writing {} directly", scope);
                persist(self.storage.as_ref(), &record);
                return;
            }
        }

        if tokio::runtime::Handle::try_current().is_err() {
            flush_scope(self.storage.as_ref(), &self.pending, &scope);
            return;
        }

        let storage = self.storage.clone();
        let pending = self.pending.clone();
        let target = scope.clone();
        self.timers.entry(scope).or_default().schedule(self.debounce, async move {
            flush_scope(storage.as_ref(), &pending, &target);
        });
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    /// Writes every pending record immediately.
    pub fn flush(&mut self) {
        for timer in self.timers.values_mut() {
            timer.cancel();
        }
        let drained: Vec<CurrentStateRecord> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().map(|(_, record)| record).collect(),
            Err(_) => return,
        };
        for record in drained {
            persist(self.storage.as_ref(), &record);
        }
    }

    fn load(&self, scope: &ScopeKey) -> Option<CurrentStateRecord> {
        let key = scope.storage_key();
        let text = match self.storage.get(&key) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(err) => {
                sync_warn!("Failed to read cached state for {}: {}", key, err);
                return None;
            }
        };
        match serde_json::from_str::<CurrentStateRecord>(&text) {
            Ok(record) if record.scope == *scope => {
                sync_debug!("Restored cached state for {}", key);
                Some(record)
            }
            Ok(record) => {
                sync_warn!(
                    "Cached state under {} belongs to {}; ignoring it",
                    key,
                    record.scope
                );
                None
            }
            Err(err) => {
                sync_warn!("Failed to parse cached state for {}: {}", key, err);
                None
            }
        }
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        self.flush();
    }
}

fn flush_scope(
    storage: &dyn DurableStorage,
    pending: &Mutex<HashMap<ScopeKey, CurrentStateRecord>>,
    scope: &ScopeKey,
) {
    let record = match pending.lock() {
        Ok(mut pending) => pending.remove(scope),
        Err(_) => None,
    };
    if let Some(record) = record {
        persist(storage, &record);
    }
}

fn persist(storage: &dyn DurableStorage, record: &CurrentStateRecord) {
    let key = record.scope.storage_key();
    let text = match serde_json::to_string(record) {
        Ok(text) => text,
        Err(err) => {
            sync_error!("Failed to serialize state for {}: {}", key, err);
            return;
        }
    };
    if let Err(err) = storage.set(&key, &text) {
        sync_error!("Failed to persist state for {}: {}", key, err);
    }
}
