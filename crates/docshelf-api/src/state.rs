//! Shared handler state.

use std::sync::Arc;

use docshelf_cache::CacheCoordinator;
use docshelf_core::{BlobStore, TaskQueue};
use docshelf_jobs::ContentExtractor;
use docshelf_search::IndexProjector;

use crate::services::{IngestionOrchestrator, SearchQueryService};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub query: Arc<SearchQueryService>,
    pub extractor: Arc<ContentExtractor>,
    pub projector: IndexProjector,
    pub blobs: Arc<dyn BlobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub cache: CacheCoordinator,
}
