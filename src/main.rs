use std::sync::Arc;

use clap::Parser;
use engram::{
    AppState,
    auth::Authenticator,
    blob::{BlobStore, FsBlobStore},
    config::{RecorderConfig, ServiceConfig, VectorConfig},
    crypto::DekProvider,
    eviction::EvictionEngine,
    middleware::AuthLayer,
    recorder::{MemoryRecorder, NoopRecorder, ResponseRecorder},
    routes,
    search::{Embedder, OpenAiEmbedder, SearchCoordinator, VectorStore},
    services::{Services, start_attachment_cleanup_worker},
    store::StorePool,
    tasks::{TaskHandlers, start_task_workers},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "engram", about = "Multi-tenant conversation-memory service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "engram.toml")]
    config: String,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log_json);

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(ServiceConfig::from_file(&args.config)?);

    let crypto = DekProvider::from_config(&config.encryption)?;

    let store = Arc::new(StorePool::from_config(&config.database).await?);
    store.run_migrations().await?;

    let http = reqwest::Client::new();

    // Vector backend shares the primary Postgres pool.
    let vector: Option<Arc<dyn VectorStore>> = match &config.vector {
        VectorConfig::Disabled => None,
        #[cfg(feature = "database-postgres")]
        VectorConfig::Pgvector(cfg) => {
            let pool = store.pg_pool().ok_or(
                "vector.type = pgvector requires database.type = postgres",
            )?;
            let backend = engram::search::vector::PgvectorStore::new(
                pool.clone(),
                cfg.table_name.clone(),
                cfg.dimensions,
            );
            backend.ensure_schema().await?;
            Some(Arc::new(backend))
        }
    };

    let embedder: Option<Arc<dyn Embedder>> = match &config.embedding {
        engram::config::EmbeddingConfig::Disabled => None,
        engram::config::EmbeddingConfig::Openai(cfg) => {
            let dimensions = match &config.vector {
                #[cfg(feature = "database-postgres")]
                VectorConfig::Pgvector(v) => v.dimensions,
                _ => 1536,
            };
            Some(Arc::new(OpenAiEmbedder::new(
                http.clone(),
                cfg.clone(),
                dimensions,
            )))
        }
    };

    let cache = engram::cache::from_config(&config.cache).await?;

    let search = Arc::new(SearchCoordinator::new(
        Arc::clone(&store),
        vector.clone(),
        embedder,
        crypto.clone(),
        cache,
        config.tasks.clone(),
    ));

    let blobs: Arc<dyn BlobStore> =
        Arc::new(FsBlobStore::new(config.attachments.blob_dir.clone()).await?);

    let services = Services::new(
        Arc::clone(&store),
        crypto,
        Arc::clone(&search),
        Arc::clone(&blobs),
        &config,
        http.clone(),
    );

    let recorder: Arc<dyn ResponseRecorder> = match &config.recorder {
        RecorderConfig::None => Arc::new(NoopRecorder::new()),
        RecorderConfig::Memory => Arc::new(MemoryRecorder::new()),
        #[cfg(feature = "redis")]
        RecorderConfig::Redis(cfg) => Arc::new(engram::recorder::RedisRecorder::connect(cfg).await?),
    };

    let eviction = Arc::new(EvictionEngine::new(
        Arc::clone(&store),
        config.eviction.clone(),
    ));

    // Background workers.
    let shutdown = CancellationToken::new();
    let task_tracker = TaskTracker::new();

    let handlers = Arc::new(TaskHandlers::new(
        Arc::clone(&store),
        vector,
        Arc::clone(&search),
    ));
    start_task_workers(
        handlers,
        Arc::clone(&store),
        config.tasks.clone(),
        shutdown.clone(),
        &task_tracker,
    );

    {
        let cleanup = services.attachments.clone();
        let interval = config.attachments.cleanup_interval_secs;
        let shutdown = shutdown.clone();
        task_tracker.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = start_attachment_cleanup_worker(cleanup, interval) => {}
            }
        });
    }

    let state = AppState {
        config: Arc::clone(&config),
        store,
        services,
        search,
        recorder,
        eviction,
        blobs,
        task_tracker: task_tracker.clone(),
    };

    let auth = AuthLayer {
        authenticator: Arc::new(Authenticator::new(
            config.auth.clone(),
            config.roles.clone(),
        )),
    };
    let app = routes::router(state, auth);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    // Teardown order: drain in-flight HTTP first, then stop background
    // workers, then drop the DB pool.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP drained, stopping background workers");
    shutdown.cancel();
    task_tracker.close();
    if tokio::time::timeout(
        std::time::Duration::from_secs(config.server.shutdown_grace_secs),
        task_tracker.wait(),
    )
    .await
    .is_err()
    {
        tracing::warn!("background workers did not drain within grace window");
    }

    Ok(())
}

/// Wait for SIGINT/SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining");
}
