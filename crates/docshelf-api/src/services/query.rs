//! Cached read paths: search, listings, subjects, statistics and status.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use docshelf_cache::{CacheCoordinator, CacheKey, CacheTag};
use docshelf_core::{
    DocumentFilter, DocumentPage, DocumentRepository, Error, ErrorKind, FacetCount, IndexField,
    LibraryStats, Page, Result, SearchQuery, SearchResults, StatusView,
};
use docshelf_search::IndexProjector;

const LISTING_TAGS: [CacheTag; 2] = [CacheTag::Files, CacheTag::Subjects];

pub struct SearchQueryService {
    documents: Arc<dyn DocumentRepository>,
    projector: IndexProjector,
    cache: CacheCoordinator,
}

impl SearchQueryService {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        projector: IndexProjector,
        cache: CacheCoordinator,
    ) -> Self {
        Self {
            documents,
            projector,
            cache,
        }
    }

    /// Tagged read-through, or a plain compute for the bypass identity.
    async fn cached<T, F, Fut>(
        &self,
        requester: Uuid,
        key: &CacheKey,
        tags: &[CacheTag],
        ttl: Duration,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.cache.is_bypass_user(requester) {
            self.cache.bypass(key, compute).await
        } else {
            self.cache.read_through(key, tags, ttl, compute).await
        }
    }

    /// Ranked full-text search. An unavailable index yields an empty page,
    /// which is not cached.
    pub async fn search(&self, requester: Uuid, query: SearchQuery) -> Result<SearchResults> {
        let start = Instant::now();
        let query = query.normalized();
        let key = CacheKey::new("search")
            .param("q", &query.text)
            .param_opt("subject", query.subject.as_deref())
            .param_opt("category", query.category)
            .param_opt("format", query.format)
            .param("limit", query.limit)
            .param("offset", query.offset);

        let ttl = self.cache.config().default_ttl;
        let result = self
            .cached(requester, &key, &LISTING_TAGS, ttl, || {
                self.projector.search(&query)
            })
            .await;

        match result {
            Ok(results) => {
                debug!(
                    subsystem = "search",
                    op = "search",
                    result_count = results.hits.len(),
                    total = results.total,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Search complete"
                );
                Ok(results)
            }
            Err(e) if e.kind() == ErrorKind::Index => {
                warn!(
                    subsystem = "search",
                    op = "search",
                    error = %e,
                    "Search index unavailable, returning empty results"
                );
                Ok(SearchResults::empty())
            }
            Err(e) => Err(e),
        }
    }

    /// Listing from the system of record.
    pub async fn list_documents(
        &self,
        requester: Uuid,
        filter: DocumentFilter,
        page: Page,
    ) -> Result<DocumentPage> {
        let key = CacheKey::new("documents")
            .param_opt("subject", filter.subject.as_deref())
            .param_opt("category", filter.category)
            .param_opt("format", filter.format)
            .param_opt("owner", filter.owner_id)
            .param("limit", page.limit)
            .param("offset", page.offset);

        let ttl = self.cache.config().default_ttl;
        self.cached(requester, &key, &LISTING_TAGS, ttl, || {
            self.documents.list(&filter, page)
        })
        .await
    }

    /// Subjects with document counts. Served from an untagged fast-path key
    /// in front of the tagged entry, so it may lag a change by up to the
    /// fast-path TTL.
    pub async fn list_subjects(&self, requester: Uuid) -> Result<Vec<FacetCount>> {
        let key = CacheKey::new("subjects");
        let compute = || self.projector.aggregate_by(IndexField::Subject);

        let result = if self.cache.is_bypass_user(requester) {
            self.cache.bypass(&key, compute).await
        } else {
            let fast_key = CacheKey::new("subjects").param("path", "fast");
            let config = self.cache.config();
            self.cache
                .fast_path(&fast_key, config.fast_path_ttl, || {
                    self.cache
                        .read_through(&key, &LISTING_TAGS, config.default_ttl, compute)
                })
                .await
        };

        match result {
            Ok(subjects) => Ok(subjects),
            Err(e) if e.kind() == ErrorKind::Index => {
                warn!(
                    subsystem = "search",
                    op = "list_subjects",
                    error = %e,
                    "Search index unavailable, returning no subjects"
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Library totals by category and format.
    pub async fn stats(&self, requester: Uuid) -> Result<LibraryStats> {
        let key = CacheKey::new("stats");
        let ttl = self.cache.config().stats_ttl;
        let result = self
            .cached(requester, &key, &[CacheTag::Stats], ttl, || async {
                let by_category = self.projector.aggregate_by(IndexField::Category).await?;
                let by_format = self.projector.aggregate_by(IndexField::Format).await?;
                let subjects = self.projector.aggregate_by(IndexField::Subject).await?;
                Ok::<_, Error>(LibraryStats {
                    total_documents: by_category.iter().map(|f| f.count).sum(),
                    subject_count: subjects.len() as u64,
                    by_category,
                    by_format,
                })
            })
            .await;

        match result {
            Ok(stats) => Ok(stats),
            Err(e) if e.kind() == ErrorKind::Index => {
                warn!(
                    subsystem = "search",
                    op = "stats",
                    error = %e,
                    "Search index unavailable, returning empty statistics"
                );
                Ok(LibraryStats::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Processing status, visible only to the owner. Anyone else gets
    /// `DocumentNotFound`. Never cached.
    pub async fn status(&self, id: Uuid, requester: Uuid) -> Result<StatusView> {
        match self.documents.get(id).await? {
            Some(record) if record.owner_id == requester => Ok(record.status_view()),
            _ => Err(Error::DocumentNotFound(id)),
        }
    }
}
