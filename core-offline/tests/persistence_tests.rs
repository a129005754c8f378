//! Persisting required operations and restoring them in a later session.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{Harness, ScriptedOp};
use core_offline::{
    operation_fn, IgnoreResult, InMemoryOperationStore, OfflineError, OperationDescriptor,
    OperationError, OperationId, OperationRecord, OperationRegistry, OperationStore,
    SqliteOperationStore,
};
use core_runtime::config::OfflineConfig;
use mockall::mock;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Upload {
    file: String,
}

fn upload_descriptor(file: &str) -> OperationDescriptor {
    OperationDescriptor::new(
        "upload",
        &Upload {
            file: file.to_string(),
        },
    )
    .unwrap()
}

async fn sqlite_store() -> Arc<SqliteOperationStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteOperationStore::new(pool);
    store.initialize().await.unwrap();
    Arc::new(store)
}

async fn submit_upload(h: &Harness, key: &str, file: &str, required: bool) {
    let op = operation_fn(|| async { Err::<(), _>(OperationError::new("unreachable host")) })
        .with_descriptor(upload_descriptor(file));
    h.wrapper
        .execute_with_offline_support(key, op, required, IgnoreResult)
        .await;
}

fn recording_registry() -> (OperationRegistry, Arc<Mutex<Vec<String>>>) {
    let uploaded = Arc::new(Mutex::new(Vec::new()));
    let sink = uploaded.clone();
    let mut registry = OperationRegistry::new();
    registry.register("upload", move |upload: Upload| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(upload.file);
            Ok(())
        }
    });
    (registry, uploaded)
}

#[tokio::test(start_paused = true)]
async fn test_required_operations_survive_restart_in_order() {
    let store = sqlite_store().await;

    let first = Harness::with(false, OfflineConfig::default(), Some(store.clone())).await;
    submit_upload(&first, "upload-a", "a.png", true).await;
    submit_upload(&first, "upload-b", "b.png", true).await;
    submit_upload(&first, "upload-c", "c.png", true).await;
    // Optional and descriptor-less operations stay in memory only
    submit_upload(&first, "upload-optional", "opt.png", false).await;
    first
        .wrapper
        .execute_with_offline_support("ping", ScriptedOp::succeeding("ping"), true, IgnoreResult)
        .await;
    // Replacing a key moves it to the tail
    submit_upload(&first, "upload-a", "a2.png", true).await;

    assert_eq!(first.wrapper.pending_operations_count().await, 5);
    let stored: Vec<_> = store
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.key)
        .collect();
    assert_eq!(stored, vec!["upload-b", "upload-c", "upload-a"]);
    first.wrapper.cleanup();
    drop(first);

    let second = Harness::with(false, OfflineConfig::default(), Some(store.clone())).await;
    let (registry, uploaded) = recording_registry();

    assert_eq!(second.wrapper.restore(&registry).await.unwrap(), 3);
    assert_eq!(
        second.wrapper.pending_keys().await,
        vec!["upload-b", "upload-c", "upload-a"]
    );
    assert!(second.wrapper.has_pending_operations());

    second.go_online().await;
    second.wait_until_drained().await;

    assert_eq!(*uploaded.lock().unwrap(), vec!["b.png", "c.png", "a2.png"]);
    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restore_skips_unknown_kinds() {
    let store = Arc::new(InMemoryOperationStore::new());
    let record = OperationRecord {
        id: OperationId::new(),
        key: "export-report".to_string(),
        descriptor: OperationDescriptor::new("export", &42).unwrap(),
        is_required: true,
        attempts: 2,
        created_at: chrono::Utc::now(),
    };
    store.save(&record).await.unwrap();
    store
        .save(&OperationRecord {
            id: OperationId::new(),
            key: "upload-x".to_string(),
            descriptor: upload_descriptor("x.png"),
            is_required: true,
            attempts: 0,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let h = Harness::with(false, OfflineConfig::default(), Some(store.clone())).await;
    let (registry, _) = recording_registry();

    assert_eq!(h.wrapper.restore(&registry).await.unwrap(), 1);
    assert_eq!(h.wrapper.pending_keys().await, vec!["upload-x"]);
    // Left for a later session that knows the kind
    assert_eq!(store.load_all().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_restore_keeps_attempt_count() {
    let store = Arc::new(InMemoryOperationStore::new());
    store
        .save(&OperationRecord {
            id: OperationId::new(),
            key: "upload-y".to_string(),
            descriptor: upload_descriptor("y.png"),
            is_required: true,
            attempts: 4,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let h = Harness::with(false, OfflineConfig::default(), Some(store)).await;
    let (registry, _) = recording_registry();
    h.wrapper.restore(&registry).await.unwrap();

    let pending = h.wrapper.pending_operations().await;
    assert_eq!(pending[0].attempts, 4);
    assert!(pending[0].is_required);
}

#[tokio::test(start_paused = true)]
async fn test_clear_also_clears_store() {
    let store = Arc::new(InMemoryOperationStore::new());
    let h = Harness::with(false, OfflineConfig::default(), Some(store.clone())).await;
    submit_upload(&h, "upload-1", "1.png", true).await;
    submit_upload(&h, "upload-2", "2.png", true).await;
    assert_eq!(store.load_all().await.unwrap().len(), 2);

    assert_eq!(h.wrapper.clear_pending_operations().await, 2);
    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_persistence_disabled_by_config() {
    let store = Arc::new(InMemoryOperationStore::new());
    let config = OfflineConfig::default().with_persistence(false);
    let h = Harness::with(false, config, Some(store.clone())).await;

    submit_upload(&h, "upload-1", "1.png", true).await;

    assert_eq!(h.wrapper.pending_operations_count().await, 1);
    assert!(store.load_all().await.unwrap().is_empty());
    let (registry, _) = recording_registry();
    assert_eq!(h.wrapper.restore(&registry).await.unwrap(), 0);
}

mock! {
    pub Store {}

    #[async_trait]
    impl OperationStore for Store {
        async fn save(&self, record: &OperationRecord) -> core_offline::Result<()>;
        async fn remove(&self, id: OperationId) -> core_offline::Result<()>;
        async fn remove_key(&self, key: &str) -> core_offline::Result<()>;
        async fn record_attempt(&self, id: OperationId, attempts: u32) -> core_offline::Result<()>;
        async fn clear(&self) -> core_offline::Result<u64>;
        async fn load_all(&self) -> core_offline::Result<Vec<OperationRecord>>;
    }
}

#[tokio::test(start_paused = true)]
async fn test_store_failures_do_not_lose_operations() {
    let mut store = MockStore::new();
    store
        .expect_save()
        .times(1)
        .returning(|_| Err(OfflineError::Store("disk full".to_string())));
    store
        .expect_remove()
        .returning(|_| Err(OfflineError::Store("disk full".to_string())));
    store.expect_load_all().returning(|| {
        Err(OfflineError::Store("database is locked".to_string()))
    });

    let h = Harness::with(false, OfflineConfig::default(), Some(Arc::new(store))).await;
    submit_upload(&h, "upload-1", "1.png", true).await;
    assert_eq!(h.wrapper.pending_operations_count().await, 1);

    let (registry, _) = recording_registry();
    let err = h.wrapper.restore(&registry).await.unwrap_err();
    assert!(matches!(err, OfflineError::Store(_)));
    assert_eq!(h.wrapper.pending_operations_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unpersisted_replacement_drops_stored_record() {
    let store = Arc::new(InMemoryOperationStore::new());
    store
        .save(&OperationRecord {
            id: OperationId::new(),
            key: "upload-a".to_string(),
            descriptor: upload_descriptor("a.png"),
            is_required: true,
            attempts: 1,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let h = Harness::with(false, OfflineConfig::default(), Some(store.clone())).await;
    let op = ScriptedOp::succeeding("a-in-memory");
    h.wrapper
        .execute_with_offline_support("upload-a", op.clone(), true, IgnoreResult)
        .await;
    assert!(store.load_all().await.unwrap().is_empty());

    let (registry, uploaded) = recording_registry();
    assert_eq!(h.wrapper.restore(&registry).await.unwrap(), 0);

    h.go_online().await;
    h.wait_until_drained().await;

    assert_eq!(op.calls(), 1);
    assert!(uploaded.lock().unwrap().is_empty());
    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restore_drops_record_superseded_this_session() {
    let store = Arc::new(InMemoryOperationStore::new());
    let h = Harness::with(false, OfflineConfig::default(), Some(store.clone())).await;
    let op = ScriptedOp::succeeding("b-in-memory");
    h.wrapper
        .execute_with_offline_support("upload-b", op.clone(), true, IgnoreResult)
        .await;

    // Written by another session after this one queued the key
    store
        .save(&OperationRecord {
            id: OperationId::new(),
            key: "upload-b".to_string(),
            descriptor: upload_descriptor("b.png"),
            is_required: true,
            attempts: 0,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let (registry, _) = recording_registry();
    assert_eq!(h.wrapper.restore(&registry).await.unwrap(), 0);
    assert_eq!(h.wrapper.pending_keys().await, vec!["upload-b"]);
    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restore_keeps_record_of_queued_operation() {
    let store = Arc::new(InMemoryOperationStore::new());
    let h = Harness::with(false, OfflineConfig::default(), Some(store.clone())).await;
    submit_upload(&h, "upload-c", "c.png", true).await;

    let (registry, _) = recording_registry();
    assert_eq!(h.wrapper.restore(&registry).await.unwrap(), 0);
    assert_eq!(h.wrapper.pending_operations_count().await, 1);
    assert_eq!(store.load_all().await.unwrap().len(), 1);
}
