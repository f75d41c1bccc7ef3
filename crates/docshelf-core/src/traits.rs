//! Core traits for docshelf collaborators.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// SYSTEM OF RECORD
// =============================================================================

/// Durable, transactional store of document records.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a new record in `pending` state.
    async fn insert(&self, doc: NewDocument) -> Result<DocumentRecord>;

    /// Fetch a record by ID.
    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>>;

    /// Check whether a record exists.
    async fn exists(&self, id: Uuid) -> Result<bool>;

    /// List records matching a filter, newest first.
    async fn list(&self, filter: &DocumentFilter, page: Page) -> Result<DocumentPage>;

    /// Atomically move a record from `pending` to `processing`.
    ///
    /// Must be a single conditional update so that concurrent claims of the
    /// same record have exactly one winner.
    async fn claim(&self, id: Uuid) -> Result<ClaimOutcome>;

    /// Write the terminal outcome of a `processing` record.
    ///
    /// Returns `false` when the record is gone or no longer `processing`.
    async fn finish(&self, id: Uuid, outcome: &ProcessingOutcome) -> Result<bool>;

    /// Reset a `completed` or `failed` record to `pending`.
    ///
    /// Returns `false` when the record is gone or not in a terminal state.
    async fn reset_for_reprocess(&self, id: Uuid) -> Result<bool>;

    /// Delete a record, returning it if it existed.
    async fn delete(&self, id: Uuid) -> Result<Option<DocumentRecord>>;

    /// Rename every record with subject `old` to `new` in one transaction.
    async fn rename_subject(&self, old: &str, new: &str) -> Result<u64>;

    /// IDs of records in `status`, optionally last updated before `before`,
    /// oldest first.
    async fn ids_with_status(
        &self,
        status: ProcessingStatus,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Uuid>>;
}

// =============================================================================
// TASK QUEUE
// =============================================================================

/// Durable at-least-once queue of processing tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task, returning its delivery ID.
    async fn enqueue(&self, task: ProcessingTask) -> Result<Uuid>;

    /// Lease up to `max` visible tasks.
    async fn claim_batch(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Acknowledge a delivery, removing the task.
    async fn ack(&self, delivery_id: Uuid) -> Result<()>;

    /// Return a delivery to the queue for a later attempt.
    async fn nack(&self, delivery_id: Uuid, error: &str) -> Result<()>;

    /// Number of tasks waiting for delivery.
    async fn pending_count(&self) -> Result<i64>;

    /// Handle notified whenever a task is enqueued.
    fn notify_handle(&self) -> Arc<Notify>;
}

// =============================================================================
// BLOB STORAGE
// =============================================================================

/// Storage for raw uploaded bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes for a document, returning the storage locator.
    async fn put(&self, id: Uuid, data: &[u8]) -> Result<String>;

    /// Read bytes by storage locator.
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete bytes by storage locator. Missing blobs are not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check that the backend is usable.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// External full-text search service.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace a document. Idempotent, last writer wins.
    async fn upsert(&self, doc: &IndexDocument) -> Result<()>;

    /// Remove a document. Unknown IDs are not an error.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Ranked free-text search with exact-match filters.
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults>;

    /// Count documents per distinct value of `field`.
    async fn aggregate_by(&self, field: IndexField) -> Result<Vec<FacetCount>>;

    /// Replace `old` with `new` in `field` across all documents.
    async fn rename_field_value(&self, field: IndexField, old: &str, new: &str) -> Result<u64>;

    /// Fetch an indexed document by ID.
    async fn get(&self, id: Uuid) -> Result<Option<IndexDocument>>;

    /// Check that the index is reachable.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// CACHE STORE
// =============================================================================

/// Key/value store backing the cache coordinator.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a raw value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw value with a TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove a value.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Current generation counters for `tags`, in order. Unknown tags are 0.
    async fn generations(&self, tags: &[&str]) -> Result<Vec<u64>>;

    /// Increment the generation counter of every tag.
    async fn bump_generations(&self, tags: &[&str]) -> Result<()>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

// =============================================================================
// EXTRACTION ADAPTER TRAIT
// =============================================================================

/// Adapter for extracting text from uploaded content.
///
/// Each adapter handles one extraction strategy (e.g., TextNative, PdfText).
/// Adapters are registered in an `ExtractionRegistry` and dispatched based
/// on the format's `ExtractionStrategy`.
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    /// The extraction strategy this adapter handles.
    fn strategy(&self) -> ExtractionStrategy;

    /// Extract content from raw file data.
    async fn extract(&self, data: &[u8], format: FileFormat) -> Result<ExtractionResult>;

    /// Check if the adapter's external dependencies are available.
    async fn health_check(&self) -> Result<bool>;

    /// Human-readable name of this adapter.
    fn name(&self) -> &str;
}
