use chrono::Utc;
use uuid::Uuid;

use crate::{
    models::AccessLevel,
    store::{ConversationRow, EntryRow, GroupRow, StorePool, truncate_to_millis},
};

/// Create a StorePool over an in-memory SQLite database with real
/// migrations applied.
pub async fn sqlite_store() -> StorePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    sqlx::migrate!("./migrations_sqlx/sqlite")
        .run(&pool)
        .await
        .expect("Failed to run SQLite migrations");
    StorePool::from_sqlite(pool)
}

/// Insert a group owned by `owner` with its owner membership; returns
/// the group id.
pub async fn seed_group(store: &StorePool, owner: &str) -> Uuid {
    let now = truncate_to_millis(Utc::now());
    let group = GroupRow {
        id: Uuid::new_v4(),
        owner_user_id: owner.to_string(),
        title: None,
        metadata: serde_json::Map::new(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    store.groups().create(&group).await.expect("create group");
    store
        .memberships()
        .upsert(group.id, owner, AccessLevel::Owner, now)
        .await
        .expect("owner membership");
    group.id
}

/// Insert a conversation into the group; returns the conversation id.
pub async fn seed_conversation(store: &StorePool, group_id: Uuid) -> Uuid {
    let now = truncate_to_millis(Utc::now());
    let conversation = ConversationRow {
        id: Uuid::new_v4(),
        conversation_group_id: group_id,
        forked_at_conversation_id: None,
        forked_at_entry_id: None,
        metadata: serde_json::Map::new(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    store
        .conversations()
        .create(&conversation)
        .await
        .expect("create conversation");
    conversation.id
}

/// Insert a plain HISTORY entry; returns the row.
pub async fn seed_entry(
    store: &StorePool,
    group_id: Uuid,
    conversation_id: Uuid,
    offset_ms: i64,
) -> EntryRow {
    let created_at = truncate_to_millis(Utc::now()) + chrono::Duration::milliseconds(offset_ms);
    let row = EntryRow {
        id: Uuid::new_v4(),
        conversation_id,
        conversation_group_id: group_id,
        channel: "HISTORY".to_string(),
        client_id: None,
        content_type: "text/plain".to_string(),
        content: b"opaque".to_vec(),
        indexed_content: None,
        indexed_at: None,
        epoch: 0,
        created_at,
    };
    store.entries().insert(&row).await.expect("insert entry");
    row
}

/// PostgreSQL test harness using testcontainers.
#[cfg(feature = "database-postgres")]
pub mod postgres {
    use testcontainers_modules::{
        postgres::Postgres,
        testcontainers::{ContainerAsync, runners::AsyncRunner},
    };

    use crate::store::StorePool;

    /// Start a dedicated container and return a migrated StorePool.
    /// The container handle keeps the database alive for the test.
    pub async fn postgres_store() -> (StorePool, ContainerAsync<Postgres>) {
        let container = Postgres::default()
            .start()
            .await
            .expect("Failed to start PostgreSQL container");
        let host = container.get_host().await.expect("host");
        let port = container.get_host_port_ipv4(5432).await.expect("port");
        let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .expect("connect postgres");
        sqlx::migrate!("./migrations_sqlx/postgres")
            .run(&pool)
            .await
            .expect("run postgres migrations");
        (StorePool::from_postgres(pool), container)
    }
}
