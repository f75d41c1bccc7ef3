//! docshelf API server.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use docshelf_api::{router, AppConfig, AppState, Backend, IngestionOrchestrator, SearchQueryService};
use docshelf_cache::{CacheConfig, CacheCoordinator};
use docshelf_core::defaults::SWEEP_BATCH_LIMIT;
use docshelf_core::{BlobStore, DocumentRepository, SearchIndex, TaskQueue};
use docshelf_db::{
    create_pool_with_config, log_pool_metrics, Database, FilesystemBlobStore, MemoryBlobStore,
    MemoryDocumentRepository, MemoryTaskQueue, PoolConfig,
};
use docshelf_jobs::{ContentExtractor, DocumentProcessor, JobWorker, WorkerConfig};
use docshelf_search::{IndexProjector, MemorySearchIndex, PgSearchIndex, ProjectorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables daily rolling file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors
    //   RUST_LOG    - standard env filter (default: "docshelf_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "docshelf_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("docshelf-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = AppConfig::from_env()?;
    info!(
        storage_backend = %config.storage_backend,
        search_backend = %config.search_backend,
        max_upload_bytes = config.max_upload_bytes,
        "Configuration loaded"
    );

    let pool = if config.needs_database() {
        info!("Connecting to database...");
        let pool = create_pool_with_config(&config.database_url, PoolConfig::from_env()).await?;
        info!("Database connected");

        info!("Running database migrations...");
        Database::new(pool.clone()).migrate().await?;
        info!("Database migrations complete");
        Some(pool)
    } else {
        None
    };

    let (documents, queue, blobs): (
        Arc<dyn DocumentRepository>,
        Arc<dyn TaskQueue>,
        Arc<dyn BlobStore>,
    ) = match (&config.storage_backend, &pool) {
        (Backend::Postgres, Some(pool)) => {
            let db = Database::new(pool.clone());
            let store = FilesystemBlobStore::new(&config.file_storage_path);
            if let Err(e) = store.validate().await {
                anyhow::bail!("File storage unusable: {e}");
            }
            info!(path = %config.file_storage_path.display(), "File storage initialized");
            (
                Arc::new(db.documents) as Arc<dyn DocumentRepository>,
                Arc::new(db.tasks) as Arc<dyn TaskQueue>,
                Arc::new(store) as Arc<dyn BlobStore>,
            )
        }
        _ => {
            warn!("Using in-process record store and queue; data is lost on restart");
            (
                Arc::new(MemoryDocumentRepository::new()) as Arc<dyn DocumentRepository>,
                Arc::new(MemoryTaskQueue::new()) as Arc<dyn TaskQueue>,
                Arc::new(MemoryBlobStore::new()) as Arc<dyn BlobStore>,
            )
        }
    };

    let index: Arc<dyn SearchIndex> = match (&config.search_backend, &pool) {
        (Backend::Postgres, Some(pool)) => Arc::new(PgSearchIndex::new(pool.clone())),
        _ => {
            warn!("Using in-process search index; it is rebuilt only by reprocessing");
            Arc::new(MemorySearchIndex::new())
        }
    };
    let projector = IndexProjector::with_config(index, ProjectorConfig::from_env());
    if !projector.health_check().await {
        warn!("Search index unreachable at startup; uploads continue and indexing degrades");
    }

    let cache = CacheCoordinator::from_config(CacheConfig::from_env()).await;

    let orchestrator = Arc::new(
        IngestionOrchestrator::new(
            documents.clone(),
            queue.clone(),
            blobs.clone(),
            projector.clone(),
            cache.clone(),
        )
        .with_max_upload_bytes(config.max_upload_bytes),
    );
    let query = Arc::new(SearchQueryService::new(
        documents.clone(),
        projector.clone(),
        cache.clone(),
    ));

    let extractor = Arc::new(ContentExtractor::from_env());
    for (strategy, available) in extractor.health_check_all().await {
        if available {
            info!(strategy = ?strategy, "Extraction adapter ready");
        } else {
            warn!(strategy = ?strategy, "Extraction tool unavailable, affected formats index without text");
        }
    }

    let processor = DocumentProcessor::new(
        documents.clone(),
        blobs.clone(),
        extractor.clone(),
        projector.clone(),
        orchestrator.clone(),
    );
    let worker_config = WorkerConfig::from_env();
    info!(
        enabled = worker_config.enabled,
        max_concurrent = worker_config.max_concurrent,
        "Starting job worker"
    );
    let worker = JobWorker::new(queue.clone(), processor, worker_config).start();

    let sweeper = orchestrator.clone();
    let sweep_interval = config.sweep_interval;
    let stale_after = config.sweep_stale_after;
    let sweep_pool = pool.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(pool) = &sweep_pool {
                log_pool_metrics(pool);
            }
            if let Err(e) = sweeper.sweep(stale_after, SWEEP_BATCH_LIMIT).await {
                error!(subsystem = "ingest", component = "sweep", error = %e, "Sweep failed");
            }
        }
    });

    let state = AppState {
        orchestrator,
        query,
        extractor,
        projector,
        blobs,
        queue,
        cache,
    };
    let app = router(state);

    let addr = config.bind_addr();
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining worker");
    if let Err(e) = worker.shutdown().await {
        warn!(error = %e, "Worker already stopped");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
