//! Shared tests for EntryRepo implementations.

use chrono::Utc;
use uuid::Uuid;

use super::harness::{seed_conversation, seed_entry, seed_group, sqlite_store};
use crate::store::{EntryRow, ListParams, StorePool, truncate_to_millis};

async fn listing_orders_by_created_at_then_id(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    let conversation_id = seed_conversation(store, group_id).await;

    let e1 = seed_entry(store, group_id, conversation_id, 0).await;
    let e2 = seed_entry(store, group_id, conversation_id, 10).await;
    let e3 = seed_entry(store, group_id, conversation_id, 20).await;

    let rows = store
        .entries()
        .list_by_conversation(group_id, conversation_id)
        .await
        .unwrap();
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![e1.id, e2.id, e3.id]);
}

async fn memory_listing_scopes_by_client(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    let conversation_id = seed_conversation(store, group_id).await;
    let now = truncate_to_millis(Utc::now());

    for (client, epoch) in [("agent-1", 1), ("agent-1", 2), ("agent-2", 1)] {
        let row = EntryRow {
            id: Uuid::new_v4(),
            conversation_id,
            conversation_group_id: group_id,
            channel: "MEMORY".to_string(),
            client_id: Some(client.to_string()),
            content_type: "application/json".to_string(),
            content: b"x".to_vec(),
            indexed_content: None,
            indexed_at: None,
            epoch,
            created_at: now,
        };
        store.entries().insert(&row).await.unwrap();
    }

    let rows = store
        .entries()
        .list_memory(group_id, conversation_id, "agent-1")
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.client_id.as_deref() == Some("agent-1")));
    assert_eq!(rows[0].epoch, 1);
    assert_eq!(rows[1].epoch, 2);
}

async fn index_lifecycle_round_trip(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    let conversation_id = seed_conversation(store, group_id).await;

    let mut row = seed_entry(store, group_id, conversation_id, 0).await;
    row.id = Uuid::new_v4();
    row.indexed_content = Some("searchable text".to_string());
    row.created_at += chrono::Duration::milliseconds(5);
    store.entries().insert(&row).await.unwrap();

    // The entry with indexed_content but no indexed_at awaits indexing.
    let pending = store.entries().list_pending_index(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, row.id);

    store
        .entries()
        .set_indexed_at(group_id, row.id, Utc::now())
        .await
        .unwrap();
    assert!(store.entries().list_pending_index(10).await.unwrap().is_empty());

    // Backfilling indexed_content re-arms indexing.
    store
        .entries()
        .set_indexed_content(group_id, row.id, "revised text")
        .await
        .unwrap();
    let pending = store.entries().list_pending_index(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].indexed_content.as_deref(), Some("revised text"));
}

async fn unindexed_discovery_paginates(store: &StorePool) {
    let group_id = seed_group(store, "alice").await;
    let conversation_id = seed_conversation(store, group_id).await;
    for i in 0..5 {
        seed_entry(store, group_id, conversation_id, i * 10).await;
    }

    let first = store
        .entries()
        .list_missing_indexed_content(&ListParams {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    assert!(first.has_more);

    let second = store
        .entries()
        .list_missing_indexed_content(&ListParams {
            limit: Some(10),
            after: first.next.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.items.len(), 3);
    assert!(!second.has_more);

    // No overlap between pages.
    let first_ids: Vec<Uuid> = first.items.iter().map(|e| e.id).collect();
    assert!(second.items.iter().all(|e| !first_ids.contains(&e.id)));
}

// ==================== SQLite ====================

#[tokio::test]
async fn sqlite_listing_orders_by_created_at_then_id() {
    listing_orders_by_created_at_then_id(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_memory_listing_scopes_by_client() {
    memory_listing_scopes_by_client(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_index_lifecycle_round_trip() {
    index_lifecycle_round_trip(&sqlite_store().await).await;
}

#[tokio::test]
async fn sqlite_unindexed_discovery_paginates() {
    unindexed_discovery_paginates(&sqlite_store().await).await;
}

// ==================== PostgreSQL (requires Docker) ====================

#[cfg(feature = "database-postgres")]
#[tokio::test]
#[ignore]
async fn postgres_listing_orders_by_created_at_then_id() {
    let (store, _container) = super::harness::postgres::postgres_store().await;
    listing_orders_by_created_at_then_id(&store).await;
}
