//! Index projector: keeps the search index a derived view of the system of
//! record.
//!
//! `project` reports failure after bounded retries so the worker can record
//! it. Removal and rename log and degrade. Reads propagate index errors to the
//! query service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use docshelf_core::{
    defaults, DocumentRecord, Error, FacetCount, IndexDocument, IndexField, Result, SearchIndex,
    SearchQuery, SearchResults,
};

/// Retry settings for index upserts.
#[derive(Debug, Clone, Copy)]
pub struct ProjectorConfig {
    /// Attempts per upsert, including the first.
    pub upsert_attempts: u32,
    /// Backoff before the second attempt; doubled for each later one.
    pub retry_backoff: Duration,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            upsert_attempts: defaults::INDEX_UPSERT_ATTEMPTS,
            retry_backoff: Duration::from_millis(defaults::INDEX_RETRY_BACKOFF_MS),
        }
    }
}

impl ProjectorConfig {
    /// Read `INDEX_UPSERT_ATTEMPTS` and `INDEX_RETRY_BACKOFF_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = std::env::var("INDEX_UPSERT_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.upsert_attempts = n.max(1);
        }
        if let Some(ms) = std::env::var("INDEX_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.retry_backoff = Duration::from_millis(ms);
        }
        config
    }

    /// Backoff after failed attempt `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Projects document records into a [`SearchIndex`].
#[derive(Clone)]
pub struct IndexProjector {
    index: Arc<dyn SearchIndex>,
    config: ProjectorConfig,
}

impl IndexProjector {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self::with_config(index, ProjectorConfig::default())
    }

    pub fn with_config(index: Arc<dyn SearchIndex>, config: ProjectorConfig) -> Self {
        Self { index, config }
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    /// Build the index document for `record` and upsert it, retrying with
    /// exponential backoff. Errs only once every attempt has failed.
    pub async fn project(&self, record: &DocumentRecord, content: &str) -> Result<IndexDocument> {
        let doc = IndexDocument::from_record(record, content);
        let attempts = self.config.upsert_attempts.max(1);
        let start = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.index.upsert(&doc).await {
                Ok(()) => {
                    debug!(
                        subsystem = "search",
                        component = "projector",
                        op = "upsert",
                        document_id = %record.id,
                        attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Index document upserted"
                    );
                    return Ok(doc);
                }
                Err(e) => {
                    warn!(
                        subsystem = "search",
                        component = "projector",
                        op = "upsert",
                        document_id = %record.id,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Index upsert failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.backoff_for(attempt)).await;
                    }
                }
            }
        }

        Err(Error::Index(format!(
            "upsert failed after {attempts} attempts: {last_error}"
        )))
    }

    /// Delete the index document. Returns whether the delete succeeded.
    pub async fn remove(&self, id: Uuid) -> bool {
        match self.index.delete(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    subsystem = "search",
                    component = "projector",
                    op = "delete",
                    document_id = %id,
                    error = %e,
                    "Index delete failed"
                );
                false
            }
        }
    }

    /// Rename a subject across the index. `None` when the index failed.
    pub async fn rename_subject(&self, old: &str, new: &str) -> Option<u64> {
        match self
            .index
            .rename_field_value(IndexField::Subject, old, new)
            .await
        {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(
                    subsystem = "search",
                    component = "projector",
                    op = "rename_subject",
                    old_subject = old,
                    new_subject = new,
                    error = %e,
                    "Index subject rename failed"
                );
                None
            }
        }
    }

    /// Search, propagating index failures so the caller picks the fallback.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        self.index.search(query).await
    }

    pub async fn aggregate_by(&self, field: IndexField) -> Result<Vec<FacetCount>> {
        self.index.aggregate_by(field).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<IndexDocument>> {
        self.index.get(id).await
    }

    pub async fn health_check(&self) -> bool {
        self.index.health_check().await.unwrap_or(false)
    }
}
