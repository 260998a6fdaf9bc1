//! Shared tests for MembershipRepo implementations.

use chrono::{Duration, Utc};

use super::harness::{seed_group, sqlite_store};
use crate::{
    models::AccessLevel,
    store::{StorePool, truncate_to_millis},
};

async fn upsert_revoke_and_revive(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    let now = truncate_to_millis(Utc::now());

    store
        .memberships()
        .upsert(group_id, "bob", AccessLevel::Reader, now)
        .await
        .unwrap();
    let bob = store.memberships().get(group_id, "bob").await.unwrap().unwrap();
    assert_eq!(bob.access_level, AccessLevel::Reader);

    // Upgrade in place.
    store
        .memberships()
        .upsert(group_id, "bob", AccessLevel::Writer, now)
        .await
        .unwrap();
    let bob = store.memberships().get(group_id, "bob").await.unwrap().unwrap();
    assert_eq!(bob.access_level, AccessLevel::Writer);

    // Revoke hides the row from access checks.
    assert!(store.memberships().revoke(group_id, "bob", now).await.unwrap());
    assert!(store.memberships().get(group_id, "bob").await.unwrap().is_none());
    assert!(!store.memberships().revoke(group_id, "bob", now).await.unwrap());

    // Re-granting revives the revoked row.
    store
        .memberships()
        .upsert(group_id, "bob", AccessLevel::Manager, now)
        .await
        .unwrap();
    let bob = store.memberships().get(group_id, "bob").await.unwrap().unwrap();
    assert_eq!(bob.access_level, AccessLevel::Manager);
}

async fn accessible_groups_exclude_deleted(store: &StorePool) {
    let visible = seed_group(store, "alice").await;
    let deleted = seed_group(store, "alice").await;
    store
        .groups()
        .soft_delete(deleted, truncate_to_millis(Utc::now()))
        .await
        .unwrap();

    let groups = store.memberships().accessible_group_ids("alice").await.unwrap();
    assert_eq!(groups, vec![visible]);
}

async fn revoked_memberships_evict_after_cutoff(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    let old = truncate_to_millis(Utc::now() - Duration::days(100));

    store
        .memberships()
        .upsert(group_id, "bob", AccessLevel::Reader, old)
        .await
        .unwrap();
    store.memberships().revoke(group_id, "bob", old).await.unwrap();

    let cutoff = Utc::now() - Duration::days(90);
    assert_eq!(store.memberships().count_evictable(cutoff).await.unwrap(), 1);
    assert_eq!(store.memberships().evict_batch(cutoff, 10).await.unwrap(), 1);
    assert_eq!(store.memberships().count_evictable(cutoff).await.unwrap(), 0);

    // The live owner membership is untouched.
    assert!(store.memberships().get(group_id, "alice").await.unwrap().is_some());
}

#[tokio::test]
async fn sqlite_upsert_revoke_and_revive() {
    upsert_revoke_and_revive(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_accessible_groups_exclude_deleted() {
    accessible_groups_exclude_deleted(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_revoked_memberships_evict_after_cutoff() {
    revoked_memberships_evict_after_cutoff(&sqlite_store().await).await;
}
