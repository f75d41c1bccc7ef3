//! Shared harness: the full pipeline wired over in-process backends.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use docshelf_api::{
    AppState, IngestionOrchestrator, SearchQueryService, UploadReceipt, UploadRequest,
};
use docshelf_cache::{CacheConfig, CacheCoordinator, MemoryCacheStore};
use docshelf_core::{
    Category, DocumentRepository, IndexDocument, ProcessingStatus, Result, SearchIndex, TaskQueue,
};
use docshelf_db::{MemoryBlobStore, MemoryDocumentRepository, MemoryTaskQueue};
use docshelf_jobs::{ContentExtractor, DocumentProcessor};
use docshelf_search::{IndexProjector, MemorySearchIndex, ProjectorConfig};

pub struct Pipeline {
    pub documents: Arc<MemoryDocumentRepository>,
    pub queue: Arc<MemoryTaskQueue>,
    pub blobs: Arc<MemoryBlobStore>,
    pub index: Arc<MemorySearchIndex>,
    pub cache_store: Arc<MemoryCacheStore>,
    pub cache: CacheCoordinator,
    pub extractor: Arc<ContentExtractor>,
    pub projector: IndexProjector,
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub query: Arc<SearchQueryService>,
    pub processor: DocumentProcessor,
    pub owner: Uuid,
}

/// Cache config with the fast path off, so every read reflects the latest
/// invalidation.
pub fn strict_cache_config() -> CacheConfig {
    CacheConfig {
        redis_enabled: false,
        fast_path_ttl: Duration::ZERO,
        ..Default::default()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_cache_config(strict_cache_config())
    }

    pub fn with_cache_config(config: CacheConfig) -> Self {
        let documents = Arc::new(MemoryDocumentRepository::new());
        let queue = Arc::new(MemoryTaskQueue::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        let cache_store = Arc::new(MemoryCacheStore::new(config.memory_capacity));
        let cache = CacheCoordinator::new(cache_store.clone(), config);
        let projector = IndexProjector::with_config(
            index.clone(),
            ProjectorConfig {
                upsert_attempts: 2,
                retry_backoff: Duration::from_millis(1),
            },
        );
        let extractor = Arc::new(ContentExtractor::default());

        let orchestrator = Arc::new(IngestionOrchestrator::new(
            documents.clone(),
            queue.clone(),
            blobs.clone(),
            projector.clone(),
            cache.clone(),
        ));
        let query = Arc::new(SearchQueryService::new(
            documents.clone(),
            projector.clone(),
            cache.clone(),
        ));
        let processor = DocumentProcessor::new(
            documents.clone(),
            blobs.clone(),
            extractor.clone(),
            projector.clone(),
            orchestrator.clone(),
        );

        Self {
            documents,
            queue,
            blobs,
            index,
            cache_store,
            cache,
            extractor,
            projector,
            orchestrator,
            query,
            processor,
            owner: Uuid::new_v4(),
        }
    }

    /// Rebuild the orchestrator with a smaller upload ceiling.
    pub fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.orchestrator = Arc::new(
            IngestionOrchestrator::new(
                self.documents.clone(),
                self.queue.clone(),
                self.blobs.clone(),
                self.projector.clone(),
                self.cache.clone(),
            )
            .with_max_upload_bytes(max),
        );
        self
    }

    pub fn state(&self) -> AppState {
        AppState {
            orchestrator: self.orchestrator.clone(),
            query: self.query.clone(),
            extractor: self.extractor.clone(),
            projector: self.projector.clone(),
            blobs: self.blobs.clone(),
            queue: self.queue.clone(),
            cache: self.cache.clone(),
        }
    }

    pub async fn upload(
        &self,
        filename: &str,
        subject: &str,
        category: Category,
        data: &[u8],
    ) -> Result<UploadReceipt> {
        self.orchestrator
            .upload(UploadRequest {
                owner_id: self.owner,
                filename: filename.to_string(),
                subject: subject.to_string(),
                category,
                data: data.to_vec(),
            })
            .await
    }

    /// Process every visible delivery the way the worker does, acking on
    /// success and nacking on error, until the queue has nothing visible.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            let deliveries = self.queue.claim_batch(16).await.unwrap();
            if deliveries.is_empty() {
                return processed;
            }
            for delivery in deliveries {
                match self.processor.process(&delivery.task).await {
                    Ok(_) => self.queue.ack(delivery.delivery_id).await.unwrap(),
                    Err(e) => self
                        .queue
                        .nack(delivery.delivery_id, &e.to_string())
                        .await
                        .unwrap(),
                }
                processed += 1;
            }
        }
    }

    pub async fn status(&self, id: Uuid) -> ProcessingStatus {
        self.documents.get(id).await.unwrap().unwrap().status
    }

    pub async fn indexed(&self, id: Uuid) -> Option<IndexDocument> {
        self.index.get(id).await.unwrap()
    }
}
