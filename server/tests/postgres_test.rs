//! PostgreSQL adapter tests.
//!
//! Each test skips unless DATABASE_URL is set. They share one database, so
//! they take a common lock: pruning in one test would otherwise cut the
//! history another test is asserting on.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tandem_engine::{
    ChangeOperation, ConflictDetection, Record, StorageAdapter, Timestamp,
};
use tandem_server::db::{connect, lock_record_ids, PgAdapter, Pool};
use tokio::sync::Mutex;

static DB: Mutex<()> = Mutex::const_new(());

async fn pool() -> Option<Pool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    Some(connect(&url, 16).await.unwrap())
}

fn unique_id() -> String {
    format!("pg-{}", uuid::Uuid::new_v4())
}

fn item(id: &str, value: i64) -> Record {
    Record::new(id, "item", json!({ "value": value })).updated_at(tandem_engine::now())
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_writes_create_once() {
    let _guard = DB.lock().await;
    let Some(pool) = pool().await else { return };
    let adapter = Arc::new(
        PgAdapter::new(pool).with_conflict_detection(ConflictDetection::VersionVector),
    );
    let id = unique_id();

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let adapter = Arc::clone(&adapter);
            let id = id.clone();
            tokio::spawn(async move {
                adapter
                    .apply_records(vec![item(&id, i)], &format!("dev-{i}"))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = adapter.change_history(&id).await.unwrap();
    assert_eq!(history.len(), 10);
    assert_eq!(history[0].operation, ChangeOperation::Create);
    let creates = history
        .iter()
        .filter(|e| e.operation == ChangeOperation::Create)
        .count();
    assert_eq!(creates, 1);

    let stored = adapter
        .get_all_records()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.id == id)
        .unwrap();
    let vector = stored.version_vector();
    assert_eq!(vector.len(), 10);
    assert!(vector.iter().all(|(_, counter)| *counter == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn write_blocked_behind_a_read_stays_visible() {
    let _guard = DB.lock().await;
    let Some(pool) = pool().await else { return };
    let adapter = Arc::new(PgAdapter::new(pool.clone()));
    let id = unique_id();

    // Another transaction holds the record lock, so the write stalls.
    let mut blocker = pool.begin().await.unwrap();
    lock_record_ids(&mut blocker, &[id.clone()]).await.unwrap();

    let writer = {
        let adapter = Arc::clone(&adapter);
        let record = item(&id, 1);
        tokio::spawn(async move { adapter.apply_records(vec![record], "device-b").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let checkpoint = tandem_engine::now();
    let seen = adapter.changes_since(checkpoint, "device-a").await.unwrap();
    assert!(seen.iter().all(|r| r.id != id));

    blocker.rollback().await.unwrap();
    writer.await.unwrap().unwrap();

    let next = adapter.changes_since(checkpoint, "device-a").await.unwrap();
    assert!(next.iter().any(|r| r.id == id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_batches_on_shared_ids_do_not_deadlock() {
    let _guard = DB.lock().await;
    let Some(pool) = pool().await else { return };
    let adapter = Arc::new(PgAdapter::new(pool));
    let ids: Vec<String> = (0..5).map(|_| unique_id()).collect();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let adapter = Arc::clone(&adapter);
            let mut batch: Vec<Record> = ids.iter().map(|id| item(id, i)).collect();
            if i % 2 == 1 {
                batch.reverse();
            }
            tokio::spawn(async move { adapter.apply_records(batch, &format!("dev-{i}")).await })
        })
        .collect();

    let joined = tokio::time::timeout(Duration::from_secs(30), async {
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    })
    .await;
    assert!(joined.is_ok(), "batches did not finish");

    for id in &ids {
        let history = adapter.change_history(id).await.unwrap();
        assert_eq!(history.len(), 6);
        assert_eq!(history[0].operation, ChangeOperation::Create);
    }
}

// ============================================================================
// Change log
// ============================================================================

#[tokio::test]
async fn pruning_keeps_latest_entry() {
    let _guard = DB.lock().await;
    let Some(pool) = pool().await else { return };
    let adapter = PgAdapter::new(pool).with_change_log_buffer(5);
    let id = unique_id();

    for i in 0..20 {
        adapter
            .apply_records(vec![item(&id, i)], "device-a")
            .await
            .unwrap();
    }

    let history = adapter.change_history(&id).await.unwrap();
    assert!(!history.is_empty());
    assert!(history.len() <= 5);
    assert_eq!(history.last().unwrap().operation, ChangeOperation::Update);

    let stored = adapter
        .get_all_records()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.id == id)
        .unwrap();
    assert_eq!(stored.data["value"], 19);
}

#[tokio::test]
async fn resync_of_nanosecond_timestamps_is_a_noop() {
    let _guard = DB.lock().await;
    let Some(pool) = pool().await else { return };
    let adapter = PgAdapter::new(pool);
    let id = unique_id();
    let at: Timestamp = "2024-01-01T00:00:00.123456789Z".parse().unwrap();
    let record = Record::new(&id, "item", json!({ "value": 1 })).updated_at(at);

    adapter
        .apply_records(vec![record.clone()], "device-a")
        .await
        .unwrap();
    adapter.apply_records(vec![record], "device-a").await.unwrap();

    let history = adapter.change_history(&id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].operation, ChangeOperation::Create);
}

#[tokio::test]
async fn delete_is_logged_after_create() {
    let _guard = DB.lock().await;
    let Some(pool) = pool().await else { return };
    let adapter = PgAdapter::new(pool);
    let id = unique_id();

    adapter
        .apply_records(vec![item(&id, 1)], "device-a")
        .await
        .unwrap();
    adapter.delete_record(&id, "device-a").await.unwrap();

    let ops: Vec<ChangeOperation> = adapter
        .change_history(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.operation)
        .collect();
    assert_eq!(ops, vec![ChangeOperation::Create, ChangeOperation::Delete]);
    assert!(adapter.delete_record(&id, "device-a").await.is_err());
}
