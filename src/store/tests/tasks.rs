//! Shared tests for TaskRepo implementations.

use chrono::{Duration, Utc};

use super::harness::sqlite_store;
use crate::{
    models::TaskStatus,
    store::StorePool,
};

async fn named_enqueue_is_idempotent(store: &StorePool) {
    let first = store
        .tasks()
        .enqueue("retry", Some("retry"), serde_json::json!({}), Utc::now())
        .await
        .unwrap();
    let second = store
        .tasks()
        .enqueue("retry", Some("retry"), serde_json::json!({}), Utc::now())
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(store.tasks().count_active("retry").await.unwrap(), 1);
}

async fn unnamed_enqueues_stack_up(store: &StorePool) {
    for _ in 0..3 {
        store
            .tasks()
            .enqueue("delete", None, serde_json::json!({}), Utc::now())
            .await
            .unwrap();
    }
    assert_eq!(store.tasks().count_active("delete").await.unwrap(), 3);
}

async fn claim_is_exclusive_and_respects_available_at(store: &StorePool) {
    let due = store
        .tasks()
        .enqueue("a", None, serde_json::json!({}), Utc::now() - Duration::seconds(1))
        .await
        .unwrap();
    let _future = store
        .tasks()
        .enqueue("b", None, serde_json::json!({}), Utc::now() + Duration::hours(1))
        .await
        .unwrap();

    let claimed = store.tasks().claim(10, Utc::now()).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, due);
    assert_eq!(claimed[0].status, TaskStatus::Processing);
    assert!(claimed[0].processing_at.is_some());

    // Already claimed: a second claim sees nothing.
    assert!(store.tasks().claim(10, Utc::now()).await.unwrap().is_empty());
}

async fn fail_rearms_with_backoff(store: &StorePool) {
    let id = store
        .tasks()
        .enqueue("a", None, serde_json::json!({}), Utc::now())
        .await
        .unwrap();
    let claimed = store.tasks().claim(1, Utc::now()).await.unwrap();
    assert_eq!(claimed.len(), 1);

    store
        .tasks()
        .fail(id, Utc::now() + Duration::minutes(10))
        .await
        .unwrap();
    let task = store.tasks().get_by_id(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempts, 1);
    assert!(task.processing_at.is_none());

    // Not yet due.
    assert!(store.tasks().claim(1, Utc::now()).await.unwrap().is_empty());
    // Due once the backoff elapses.
    let later = Utc::now() + Duration::minutes(11);
    assert_eq!(store.tasks().claim(1, later).await.unwrap().len(), 1);
}

async fn complete_removes_and_dead_is_terminal(store: &StorePool) {
    let done = store
        .tasks()
        .enqueue("a", None, serde_json::json!({}), Utc::now())
        .await
        .unwrap();
    let dead = store
        .tasks()
        .enqueue("a", None, serde_json::json!({}), Utc::now())
        .await
        .unwrap();
    store.tasks().claim(10, Utc::now()).await.unwrap();

    store.tasks().complete(done).await.unwrap();
    assert!(store.tasks().get_by_id(done).await.unwrap().is_none());

    store.tasks().mark_dead(dead).await.unwrap();
    let task = store.tasks().get_by_id(dead).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(store.tasks().count_active("a").await.unwrap(), 0);
}

async fn dead_singleton_frees_the_name(store: &StorePool) {
    let first = store
        .tasks()
        .enqueue("retry", Some("retry"), serde_json::json!({}), Utc::now())
        .await
        .unwrap();
    store.tasks().claim(1, Utc::now()).await.unwrap();
    store.tasks().mark_dead(first).await.unwrap();

    let second = store
        .tasks()
        .enqueue("retry", Some("retry"), serde_json::json!({}), Utc::now())
        .await
        .unwrap();
    assert_ne!(first, second);
}

async fn reaper_resets_stuck_processing(store: &StorePool) {
    let id = store
        .tasks()
        .enqueue("a", None, serde_json::json!({}), Utc::now())
        .await
        .unwrap();
    store.tasks().claim(1, Utc::now()).await.unwrap();

    // Not stuck yet.
    assert_eq!(
        store
            .tasks()
            .reap_stuck(Utc::now() - Duration::minutes(15))
            .await
            .unwrap(),
        0
    );
    // Stuck relative to a future cutoff.
    assert_eq!(
        store
            .tasks()
            .reap_stuck(Utc::now() + Duration::seconds(1))
            .await
            .unwrap(),
        1
    );
    let task = store.tasks().get_by_id(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
}

#[tokio::test]
async fn sqlite_named_enqueue_is_idempotent() {
    named_enqueue_is_idempotent(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_unnamed_enqueues_stack_up() {
    unnamed_enqueues_stack_up(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_claim_is_exclusive_and_respects_available_at() {
    claim_is_exclusive_and_respects_available_at(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_fail_rearms_with_backoff() {
    fail_rearms_with_backoff(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_complete_removes_and_dead_is_terminal() {
    complete_removes_and_dead_is_terminal(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_dead_singleton_frees_the_name() {
    dead_singleton_frees_the_name(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_reaper_resets_stuck_processing() {
    reaper_resets_stuck_processing(&sqlite_store().await).await;
}

// ==================== PostgreSQL (requires Docker) ====================

#[cfg(feature = "database-postgres")]
#[tokio::test]
#[ignore]
async fn postgres_named_enqueue_is_idempotent() {
    let (store, _container) = super::harness::postgres::postgres_store().await;
    named_enqueue_is_idempotent(&store).await;
}

#[cfg(feature = "database-postgres")]
#[tokio::test]
#[ignore]
async fn postgres_claim_is_exclusive_and_respects_available_at() {
    let (store, _container) = super::harness::postgres::postgres_store().await;
    claim_is_exclusive_and_respects_available_at(&store).await;
}
