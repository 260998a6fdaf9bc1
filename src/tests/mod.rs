//! End-to-end scenario tests over the full service stack: in-memory
//! SQLite store, in-process vector backend, hashing embedder, memory
//! recorder.

mod scenarios;

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::{
    auth::Identity,
    blob::MemoryBlobStore,
    config::{EncryptionConfig, ServiceConfig},
    crypto::DekProvider,
    eviction::EvictionEngine,
    models::{AppendEntry, Channel, ContentBlock, Entry},
    search::{SearchCoordinator, embedding::HashEmbedder, vector::test::TestVectorStore},
    services::Services,
    store::{StorePool, tests::harness::sqlite_store},
    tasks::TaskHandlers,
};

pub(crate) struct TestApp {
    pub store: Arc<StorePool>,
    pub services: Services,
    pub search: Arc<SearchCoordinator>,
    pub vector: Arc<TestVectorStore>,
    pub handlers: TaskHandlers,
    pub eviction: Arc<EvictionEngine>,
}

fn test_config() -> ServiceConfig {
    let toml = format!(
        r#"
        [encryption]
        key = "{}"

        [eviction]
        batch_size = 10
        batch_delay_ms = 0
        "#,
        STANDARD.encode([42u8; 32])
    );
    ServiceConfig::from_toml(&toml).expect("test config")
}

pub(crate) async fn test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(sqlite_store().await);
    let crypto = DekProvider::from_config(&EncryptionConfig {
        key: STANDARD.encode([42u8; 32]),
    })
    .expect("test key");

    let vector = Arc::new(TestVectorStore::new());
    let embedder = Arc::new(HashEmbedder::new(64));
    let search = Arc::new(SearchCoordinator::new(
        Arc::clone(&store),
        Some(vector.clone() as Arc<dyn crate::search::VectorStore>),
        Some(embedder as Arc<dyn crate::search::Embedder>),
        crypto.clone(),
        Some(Arc::new(crate::cache::MemoryCache::new(256)) as Arc<dyn crate::cache::Cache>),
        config.tasks.clone(),
    ));

    let services = Services::new(
        Arc::clone(&store),
        crypto,
        Arc::clone(&search),
        Arc::new(MemoryBlobStore::new()),
        &config,
        reqwest::Client::new(),
    );

    let handlers = TaskHandlers::new(
        Arc::clone(&store),
        Some(vector.clone() as Arc<dyn crate::search::VectorStore>),
        Arc::clone(&search),
    );
    let eviction = Arc::new(EvictionEngine::new(
        Arc::clone(&store),
        config.eviction.clone(),
    ));

    TestApp {
        store,
        services,
        search,
        vector,
        handlers,
        eviction,
    }
}

impl TestApp {
    /// Append a user HISTORY entry, pausing briefly so creation
    /// timestamps stay strictly ordered at millisecond precision.
    pub(crate) async fn append_history(
        &self,
        identity: &Identity,
        conversation_id: uuid::Uuid,
        text: &str,
    ) -> Entry {
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        self.services
            .entries
            .append(
                identity,
                conversation_id,
                AppendEntry {
                    channel: Channel::History,
                    content_type: "text/plain".to_string(),
                    content: vec![ContentBlock::text("user", text)],
                    indexed_content: None,
                },
            )
            .await
            .expect("append history entry")
    }

    /// Append an indexed HISTORY entry.
    pub(crate) async fn append_indexed(
        &self,
        identity: &Identity,
        conversation_id: uuid::Uuid,
        text: &str,
    ) -> Entry {
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        self.services
            .entries
            .append(
                identity,
                conversation_id,
                AppendEntry {
                    channel: Channel::History,
                    content_type: "text/plain".to_string(),
                    content: vec![ContentBlock::text("user", text)],
                    indexed_content: Some(text.to_string()),
                },
            )
            .await
            .expect("append indexed entry")
    }

    /// Drain the task queue until no claimable work remains.
    pub(crate) async fn drain_tasks(&self) {
        loop {
            let claimed = self
                .store
                .tasks()
                .claim(10, chrono::Utc::now())
                .await
                .expect("claim tasks");
            if claimed.is_empty() {
                break;
            }
            for task in &claimed {
                let outcome = self.handlers.dispatch(task).await;
                match outcome {
                    crate::models::TaskOutcome::Done => {
                        self.store.tasks().complete(task.id).await.expect("complete");
                    }
                    other => panic!("task {} did not complete: {:?}", task.task_type, other),
                }
            }
        }
    }
}
