//! Shared tests for GroupRepo implementations.

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::harness::{seed_conversation, seed_entry, seed_group, sqlite_store};
use crate::{
    models::{AdminGroupFilter, TASK_VECTOR_STORE_DELETE},
    store::{ListParams, StoreError, StorePool, truncate_to_millis},
};

async fn soft_delete_hides_group_and_cascades(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    let conversation_id = seed_conversation(store, group_id).await;

    store
        .groups()
        .soft_delete(group_id, truncate_to_millis(Utc::now()))
        .await
        .expect("soft delete");

    let group = store.groups().get_by_id(group_id).await.unwrap().unwrap();
    assert!(group.deleted_at.is_some());

    let conversation = store
        .conversations()
        .get_by_id(conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(conversation.deleted_at.is_some());

    // Memberships are hard-deleted alongside.
    assert!(
        store
            .memberships()
            .get(group_id, "alice")
            .await
            .unwrap()
            .is_none()
    );
}

async fn soft_delete_twice_is_not_found(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    store
        .groups()
        .soft_delete(group_id, Utc::now())
        .await
        .unwrap();
    assert!(matches!(
        store.groups().soft_delete(group_id, Utc::now()).await,
        Err(StoreError::NotFound)
    ));
}

async fn restore_requires_deleted_state(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    let conversation_id = seed_conversation(store, group_id).await;

    // Restoring an active group conflicts.
    assert!(matches!(
        store.groups().restore(group_id).await,
        Err(StoreError::Conflict(_))
    ));

    store
        .groups()
        .soft_delete(group_id, Utc::now())
        .await
        .unwrap();
    store.groups().restore(group_id).await.unwrap();

    let group = store.groups().get_by_id(group_id).await.unwrap().unwrap();
    assert!(group.deleted_at.is_none());
    let conversation = store
        .conversations()
        .get_by_id(conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(conversation.deleted_at.is_none());
}

async fn evict_batch_enqueues_cleanup_then_deletes(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    let conversation_id = seed_conversation(store, group_id).await;
    seed_entry(store, group_id, conversation_id, 0).await;

    let old = truncate_to_millis(Utc::now() - Duration::days(100));
    store.groups().soft_delete(group_id, old).await.unwrap();

    let cutoff = Utc::now() - Duration::days(90);
    assert_eq!(store.groups().count_evictable(cutoff).await.unwrap(), 1);

    let deleted = store.groups().evict_batch(cutoff, 10).await.unwrap();
    assert_eq!(deleted, vec![group_id]);

    // Everything is gone.
    assert!(store.groups().get_by_id(group_id).await.unwrap().is_none());
    assert!(
        store
            .conversations()
            .get_by_id(conversation_id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .entries()
            .list_by_group(group_id)
            .await
            .unwrap()
            .is_empty()
    );

    // One vector cleanup task exists for the group.
    assert_eq!(
        store
            .tasks()
            .count_active(TASK_VECTOR_STORE_DELETE)
            .await
            .unwrap(),
        1
    );

    // A second pass finds nothing.
    assert!(store.groups().evict_batch(cutoff, 10).await.unwrap().is_empty());
}

async fn eviction_ignores_recent_and_live_rows(store: &StorePool) {
    let live = seed_group(store, "alice").await;
    let recent = seed_group(store, "bob").await;
    store
        .groups()
        .soft_delete(recent, truncate_to_millis(Utc::now()))
        .await
        .unwrap();

    let cutoff = Utc::now() - Duration::days(90);
    assert_eq!(store.groups().count_evictable(cutoff).await.unwrap(), 0);
    assert!(store.groups().evict_batch(cutoff, 10).await.unwrap().is_empty());
    assert!(store.groups().get_by_id(live).await.unwrap().is_some());
    assert!(store.groups().get_by_id(recent).await.unwrap().is_some());
}

async fn admin_list_filters_deleted_window(store: &StorePool) {
    let active = seed_group(store, "alice").await;
    let deleted_old = seed_group(store, "alice").await;
    let deleted_new = seed_group(store, "alice").await;

    let t_old = truncate_to_millis(Utc::now() - Duration::days(30));
    let t_new = truncate_to_millis(Utc::now() - Duration::days(1));
    store.groups().soft_delete(deleted_old, t_old).await.unwrap();
    store.groups().soft_delete(deleted_new, t_new).await.unwrap();

    // Default: only live groups.
    let filter = AdminGroupFilter::default();
    let page = store
        .groups()
        .list_admin(&filter, &ListParams::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, active);

    // onlyDeleted with an inclusive-start / exclusive-end window.
    let filter = AdminGroupFilter {
        only_deleted: true,
        deleted_after: Some(t_old),
        deleted_before: Some(t_new),
        ..Default::default()
    };
    let page = store
        .groups()
        .list_admin(&filter, &ListParams::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, deleted_old);
}

async fn set_title_if_unset_is_first_writer_wins(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    assert!(
        store
            .groups()
            .set_title_if_unset(group_id, b"first")
            .await
            .unwrap()
    );
    assert!(
        !store
            .groups()
            .set_title_if_unset(group_id, b"second")
            .await
            .unwrap()
    );
    let group = store.groups().get_by_id(group_id).await.unwrap().unwrap();
    assert_eq!(group.title.as_deref(), Some(&b"first"[..]));
}

async fn update_missing_group_is_not_found(store: &StorePool) {
    assert!(matches!(
        store.groups().update(Uuid::new_v4(), Some(b"t"), None).await,
        Err(StoreError::NotFound)
    ));
}

// ==================== SQLite ====================

#[tokio::test]
async fn sqlite_soft_delete_hides_group_and_cascades() {
    soft_delete_hides_group_and_cascades(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_soft_delete_twice_is_not_found() {
    soft_delete_twice_is_not_found(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_restore_requires_deleted_state() {
    restore_requires_deleted_state(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_evict_batch_enqueues_cleanup_then_deletes() {
    evict_batch_enqueues_cleanup_then_deletes(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_eviction_ignores_recent_and_live_rows() {
    eviction_ignores_recent_and_live_rows(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_admin_list_filters_deleted_window() {
    admin_list_filters_deleted_window(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_set_title_if_unset_is_first_writer_wins() {
    set_title_if_unset_is_first_writer_wins(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_update_missing_group_is_not_found() {
    update_missing_group_is_not_found(&sqlite_store().await).await;
}

// ==================== PostgreSQL (requires Docker) ====================

#[cfg(feature = "database-postgres")]
#[tokio::test]
#[ignore]
async fn postgres_soft_delete_hides_group_and_cascades() {
    let (store, _container) = super::harness::postgres::postgres_store().await;
    soft_delete_hides_group_and_cascades(&store).await;
}

#[cfg(feature = "database-postgres")]
#[tokio::test]
#[ignore]
async fn postgres_evict_batch_enqueues_cleanup_then_deletes() {
    let (store, _container) = super::harness::postgres::postgres_store().await;
    evict_batch_enqueues_cleanup_then_deletes(&store).await;
}
