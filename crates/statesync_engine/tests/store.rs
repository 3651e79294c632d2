mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use statesync_core::{ActivePresetPointer, ScopeKey, ValidationError};
use statesync_engine::{
    LocalCache, MemoryStorage, PresetService, RemoteError, StateStore, StoreError,
};

use common::{data, init_logging, FakePresetBackend};

fn orders() -> ScopeKey {
    ScopeKey::table("orders")
}

fn store_with(backend: &Arc<FakePresetBackend>) -> (StateStore, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let cache = LocalCache::with_debounce(storage.clone(), Duration::from_millis(300));
    (StateStore::new(cache, backend.clone()), storage)
}

#[tokio::test]
async fn fragment_is_readable_immediately() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);

    store.set_fragment(&orders(), "filter", json!({ "status": "open" }));
    store.set_fragment(&orders(), "sort", json!("total"));

    let current = store.get_current(&orders());
    assert_eq!(
        current.data,
        data(json!({ "filter": { "status": "open" }, "sort": "total" }))
    );
}

#[tokio::test]
async fn registered_defaults_seed_unknown_scopes() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    store.register_defaults(&orders(), data(json!({ "page_size": 25 })));

    assert_eq!(store.get_current(&orders()).data, data(json!({ "page_size": 25 })));
    assert_eq!(
        store.get_current_or(&ScopeKey::global("theme"), data(json!({ "mode": "dark" }))).data,
        data(json!({ "mode": "dark" }))
    );
}

#[tokio::test(start_paused = true)]
async fn rapid_changes_reach_storage_once() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, storage) = store_with(&backend);

    for width in [100, 120, 140, 160] {
        store.set_fragment(&orders(), "width", json!(width));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    let writes = storage.writes_for("table:orders");
    assert_eq!(writes.len(), 1);
    let persisted: Value = serde_json::from_str(&writes[0]).unwrap();
    assert_eq!(persisted["data"]["width"], json!(160));
}

#[tokio::test]
async fn load_then_revert_changes_nothing() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    let preset = backend
        .create(&orders(), "Compact", "", data(json!({ "density": "compact" })))
        .await
        .unwrap();

    store.load_preset(preset.clone());
    let err = store.revert_to_active_preset(&orders()).unwrap_err();

    assert_eq!(err, StoreError::NotModified);
    assert_eq!(store.get_current(&orders()).data, preset.data);
    assert_eq!(
        store.active_pointer(&orders()),
        ActivePresetPointer {
            preset_id: Some(preset.id),
            is_modified: false
        }
    );
}

#[tokio::test]
async fn modify_then_revert_restores_preset_locally() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    let preset = backend
        .create(&orders(), "Compact", "", data(json!({ "density": "compact" })))
        .await
        .unwrap();
    store.load_preset(preset.clone());
    let calls_before = backend.calls();

    store.set_fragment(&orders(), "density", json!("roomy"));
    assert!(store.active_pointer(&orders()).is_modified);

    store.revert_to_active_preset(&orders()).unwrap();

    assert_eq!(store.get_current(&orders()).data, preset.data);
    assert!(!store.active_pointer(&orders()).is_modified);
    assert_eq!(backend.calls(), calls_before);
}

#[tokio::test]
async fn setting_a_fragment_back_clears_the_modified_flag() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    let preset = backend
        .create(&orders(), "Compact", "", data(json!({ "density": "compact" })))
        .await
        .unwrap();
    store.load_preset(preset);

    store.set_fragment(&orders(), "density", json!("roomy"));
    store.set_fragment(&orders(), "density", json!("compact"));

    assert!(!store.active_pointer(&orders()).is_modified);
}

#[tokio::test]
async fn revert_without_loaded_preset_fails() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    store.set_fragment(&orders(), "sort", json!("id"));

    assert_eq!(
        store.revert_to_active_preset(&orders()),
        Err(StoreError::NoActivePreset)
    );
    assert_eq!(
        store.save_modification_to_active_preset(&orders()).await,
        Err(StoreError::NoActivePreset)
    );
}

#[tokio::test]
async fn morning_run_save_modify_and_save_again() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    store.set_fragment(&orders(), "sort", json!("date"));

    let created = store
        .save_as_new_preset(&orders(), "Morning Run", "daily view")
        .await
        .unwrap();
    assert_eq!(
        store.active_pointer(&orders()),
        ActivePresetPointer {
            preset_id: Some(created.id),
            is_modified: false
        }
    );

    store.set_fragment(&orders(), "sort", json!("total"));
    assert!(store.active_pointer(&orders()).is_modified);

    let saved = store.save_modification_to_active_preset(&orders()).await.unwrap();

    assert_eq!(saved.data, data(json!({ "sort": "total" })));
    assert_eq!(backend.stored(created.id).unwrap().data, data(json!({ "sort": "total" })));
    assert!(!store.active_pointer(&orders()).is_modified);
    assert_eq!(
        store.save_modification_to_active_preset(&orders()).await,
        Err(StoreError::NotModified)
    );
}

#[tokio::test]
async fn duplicate_name_is_a_validation_error() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    store.save_as_new_preset(&orders(), "Morning Run", "").await.unwrap();

    let err = store
        .save_as_new_preset(&orders(), "Morning Run", "")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        StoreError::Validation(ValidationError::DuplicateName("Morning Run".to_string()))
    );
}

#[tokio::test]
async fn activation_is_exclusive_and_loads_server_copy() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    let first = backend
        .create(&orders(), "First", "", data(json!({ "sort": "id" })))
        .await
        .unwrap();
    let second = backend
        .create(&orders(), "Second", "", data(json!({ "sort": "name" })))
        .await
        .unwrap();

    store.activate_preset(&orders(), first.id).await.unwrap();
    let fresh = store.activate_preset(&orders(), second.id).await.unwrap();

    let active: Vec<_> = fresh.iter().filter(|p| p.is_active).map(|p| p.id).collect();
    assert_eq!(active, vec![second.id]);
    assert_eq!(store.get_current(&orders()).data, data(json!({ "sort": "name" })));
    let loaded = store.loaded_preset(&orders()).unwrap();
    assert!(loaded.is_active);
    assert_eq!(loaded.id, second.id);
}

#[tokio::test]
async fn activating_unlisted_preset_fails_without_touching_state() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    let other_scope = backend
        .create(&ScopeKey::page("orders"), "Elsewhere", "", data(json!({ "x": 1 })))
        .await
        .unwrap();
    store.set_fragment(&orders(), "sort", json!("id"));

    let err = store.activate_preset(&orders(), other_scope.id).await.unwrap_err();

    assert_eq!(err, StoreError::UnknownPreset(other_scope.id));
    assert_eq!(store.get_current(&orders()).data, data(json!({ "sort": "id" })));
}

#[tokio::test]
async fn remote_failure_keeps_local_changes() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    store.set_fragment(&orders(), "sort", json!("total"));
    backend.fail_remote(true);

    let err = store
        .save_as_new_preset(&orders(), "Offline", "")
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Remote(RemoteError::Network(_))));
    assert_eq!(store.get_current(&orders()).data, data(json!({ "sort": "total" })));
    assert_eq!(store.active_pointer(&orders()).preset_id, None);
}

#[tokio::test]
async fn restore_loads_the_server_active_preset() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    assert_eq!(store.restore_active_preset(&orders()).await.unwrap(), None);

    let preset = backend
        .create(&orders(), "Shared", "", data(json!({ "columns": ["id"] })))
        .await
        .unwrap();
    backend.set_active(preset.id).await.unwrap();

    let restored = store.restore_active_preset(&orders()).await.unwrap().unwrap();

    assert_eq!(restored.id, preset.id);
    assert_eq!(store.get_current(&orders()).data, preset.data);
}

#[tokio::test]
async fn deleting_the_loaded_preset_clears_the_pointer() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    store.set_fragment(&orders(), "sort", json!("id"));
    let preset = store.save_as_new_preset(&orders(), "Temp", "").await.unwrap();

    store.delete_preset(&orders(), preset.id).await.unwrap();

    assert_eq!(store.active_pointer(&orders()), ActivePresetPointer::default());
    assert_eq!(store.get_current(&orders()).data, data(json!({ "sort": "id" })));
    assert!(store.list_presets(&orders()).await.unwrap().is_empty());
}

#[tokio::test]
async fn scopes_with_same_id_stay_independent() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    let table = ScopeKey::table("orders");
    let page = ScopeKey::page("orders");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe(&page, move |record, _| sink.lock().unwrap().push(record.data.clone()));

    store.set_fragment(&table, "sort", json!("id"));

    assert!(store.get_current(&page).data.is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn subscribers_run_in_order_and_defer_their_own_mutations() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = log.clone();
    store.subscribe(&orders(), move |record, deferred| {
        first
            .lock()
            .unwrap()
            .push(format!("first {}", Value::Object(record.data.clone())));
        if record.fragment("filter").is_some() && record.fragment("page").is_none() {
            deferred.set_fragment(&record.scope, "page", json!(1));
        }
    });
    let second = log.clone();
    store.subscribe(&orders(), move |record, _| {
        second
            .lock()
            .unwrap()
            .push(format!("second {}", Value::Object(record.data.clone())));
    });

    store.set_fragment(&orders(), "filter", json!("open"));

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            r#"first {"filter":"open"}"#.to_string(),
            r#"second {"filter":"open"}"#.to_string(),
            r#"first {"filter":"open","page":1}"#.to_string(),
            r#"second {"filter":"open","page":1}"#.to_string(),
        ]
    );
    assert_eq!(
        store.get_current(&orders()).data,
        data(json!({ "filter": "open", "page": 1 }))
    );
}

#[tokio::test]
async fn unsubscribed_callbacks_stop_firing() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    let count = Arc::new(Mutex::new(0));
    let counter = count.clone();
    let id = store.subscribe(&orders(), move |_, _| *counter.lock().unwrap() += 1);

    store.set_fragment(&orders(), "a", json!(1));
    assert!(store.unsubscribe(id));
    store.set_fragment(&orders(), "a", json!(2));

    assert_eq!(*count.lock().unwrap(), 1);
    assert!(!store.unsubscribe(id));
}

#[tokio::test]
async fn state_survives_a_new_store_over_the_same_storage() {
    init_logging();
    let backend = FakePresetBackend::new();
    let storage = Arc::new(MemoryStorage::new());
    {
        let cache = LocalCache::new(storage.clone());
        let mut store = StateStore::new(cache, backend.clone());
        store.set_fragment(&orders(), "sort", json!("total"));
    }

    let mut reopened = StateStore::new(LocalCache::new(storage), backend.clone());
    assert_eq!(reopened.get_current(&orders()).data, data(json!({ "sort": "total" })));
}

#[tokio::test]
async fn morning_run_activation_scenario() {
    init_logging();
    let backend = FakePresetBackend::new();
    let (mut store, _) = store_with(&backend);
    let scope = ScopeKey::table("measurements");
    let previous = backend
        .create(&scope, "Evening Run", "", data(json!({ "sort": "desc" })))
        .await
        .unwrap();
    backend.set_active(previous.id).await.unwrap();

    store.set_fragment(&scope, "sort", json!("asc"));
    let created = store.save_as_new_preset(&scope, "Morning Run", "").await.unwrap();

    let listed = store.list_presets(&scope).await.unwrap();
    let morning: Vec<_> = listed.iter().filter(|p| p.name == "Morning Run").collect();
    assert_eq!(morning.len(), 1);
    assert!(!morning[0].is_active);

    store.activate_preset(&scope, created.id).await.unwrap();

    let listed = store.list_presets(&scope).await.unwrap();
    let states: Vec<_> = listed.iter().map(|p| (p.name.as_str(), p.is_active)).collect();
    assert_eq!(states, vec![("Evening Run", false), ("Morning Run", true)]);
    assert_eq!(store.get_current(&scope).data, data(json!({ "sort": "asc" })));
}
