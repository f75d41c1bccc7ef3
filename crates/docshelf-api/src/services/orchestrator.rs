//! Ingestion orchestrator: sequences every mutation across the system of
//! record, the task queue, the blob store, the search index and the cache.
//!
//! Ordering is always record first, then index, then cache. Only record and
//! blob writes are fatal; index and cache failures are logged and left for
//! reprocessing or the next invalidation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use docshelf_cache::{CacheCoordinator, CacheTag};
use docshelf_core::defaults;
use docshelf_core::{
    sanitize_filename, BlobStore, Category, DocumentRecord, DocumentRepository, Error, FileFormat,
    NewDocument, ProcessingOutcome, ProcessingStatus, ProcessingTask, Result, TaskQueue,
    TaskReason,
};
use docshelf_db::compute_content_hash;
use docshelf_jobs::StatusReporter;
use docshelf_search::IndexProjector;

/// Tags touched by any change to the document set.
const ALL_TAGS: [CacheTag; 3] = [CacheTag::Files, CacheTag::Subjects, CacheTag::Stats];

/// An upload as received from the caller.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner_id: Uuid,
    pub filename: String,
    pub subject: String,
    pub category: Category,
    pub data: Vec<u8>,
}

/// Furthest synchronous stage an upload reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Received,
    Persisted,
    Enqueued,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Received => "received",
            UploadStage::Persisted => "persisted",
            UploadStage::Enqueued => "enqueued",
        }
    }
}

/// Returned to the caller as soon as the record is durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub id: Uuid,
    pub status: ProcessingStatus,
    pub stage: UploadStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub id: Uuid,
    pub index_removed: bool,
    pub blob_removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    pub old_name: String,
    pub new_name: String,
    pub records_renamed: u64,
    /// `None` when the index rename failed; the index catches up on reprocess.
    pub index_renamed: Option<u64>,
}

/// What one stranded-record sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// `pending` records given a fresh task.
    pub requeued: usize,
    /// `processing` records marked `failed`.
    pub abandoned: usize,
}

/// Validate and normalize a subject name.
pub fn validate_subject(subject: &str) -> Result<String> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(Error::InvalidInput("subject must not be blank".into()));
    }
    if subject.chars().count() > defaults::SUBJECT_MAX_CHARS {
        return Err(Error::InvalidInput(format!(
            "subject exceeds {} characters",
            defaults::SUBJECT_MAX_CHARS
        )));
    }
    Ok(subject.to_string())
}

fn cutoff(older_than: Duration) -> Result<chrono::DateTime<Utc>> {
    let age = chrono::Duration::from_std(older_than)
        .map_err(|e| Error::InvalidInput(format!("invalid age: {e}")))?;
    Ok(Utc::now() - age)
}

pub struct IngestionOrchestrator {
    documents: Arc<dyn DocumentRepository>,
    queue: Arc<dyn TaskQueue>,
    blobs: Arc<dyn BlobStore>,
    projector: IndexProjector,
    cache: CacheCoordinator,
    max_upload_bytes: u64,
}

impl IngestionOrchestrator {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        queue: Arc<dyn TaskQueue>,
        blobs: Arc<dyn BlobStore>,
        projector: IndexProjector,
        cache: CacheCoordinator,
    ) -> Self {
        Self {
            documents,
            queue,
            blobs,
            projector,
            cache,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Accept an upload: validate, persist the bytes and the `pending`
    /// record, invalidate listings and schedule processing.
    ///
    /// Validation failures are rejected before anything is written. A failed
    /// enqueue is not fatal: the receipt reports `persisted` and the sweep
    /// schedules the record later.
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt> {
        let start = Instant::now();
        let filename = sanitize_filename(&request.filename);
        let format = FileFormat::from_filename(&filename).ok_or_else(|| {
            let ext = filename
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_string())
                .unwrap_or_default();
            Error::UnsupportedFormat(if ext.is_empty() { filename.clone() } else { ext })
        })?;
        if request.data.is_empty() {
            return Err(Error::InvalidInput("file is empty".into()));
        }
        let size = request.data.len() as u64;
        if size > self.max_upload_bytes {
            return Err(Error::PayloadTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        let subject = validate_subject(&request.subject)?;

        let id = Uuid::now_v7();
        debug!(
            subsystem = "ingest",
            component = "orchestrator",
            op = "upload",
            document_id = %id,
            stage = UploadStage::Received.as_str(),
            format = %format,
            size_bytes = size,
            "Upload accepted"
        );

        let content_hash = compute_content_hash(&request.data);
        let storage_path = self.blobs.put(id, &request.data).await?;
        drop(request.data);

        let new_doc = NewDocument {
            id,
            owner_id: request.owner_id,
            filename,
            storage_path: storage_path.clone(),
            subject,
            category: request.category,
            size_bytes: size as i64,
            format,
            content_hash,
        };
        if let Err(e) = self.documents.insert(new_doc).await {
            if let Err(cleanup) = self.blobs.delete(&storage_path).await {
                warn!(
                    subsystem = "ingest",
                    component = "orchestrator",
                    document_id = %id,
                    error = %cleanup,
                    "Failed to remove blob after record insert failed"
                );
            }
            return Err(e);
        }
        info!(
            subsystem = "ingest",
            component = "orchestrator",
            op = "upload",
            document_id = %id,
            stage = UploadStage::Persisted.as_str(),
            "Document record persisted"
        );

        self.invalidate(id, &ALL_TAGS).await;

        let stage = match self
            .queue
            .enqueue(ProcessingTask::new(id, TaskReason::Upload))
            .await
        {
            Ok(delivery_id) => {
                info!(
                    subsystem = "ingest",
                    component = "orchestrator",
                    op = "upload",
                    document_id = %id,
                    delivery_id = %delivery_id,
                    stage = UploadStage::Enqueued.as_str(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Processing task enqueued"
                );
                UploadStage::Enqueued
            }
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "orchestrator",
                    op = "upload",
                    document_id = %id,
                    stage = UploadStage::Persisted.as_str(),
                    error = %e,
                    "Failed to enqueue processing task, leaving record for the sweep"
                );
                UploadStage::Persisted
            }
        };

        Ok(UploadReceipt {
            id,
            status: ProcessingStatus::Pending,
            stage,
        })
    }

    /// Fails with `DocumentNotFound` when the record is absent and
    /// `Forbidden` when `requester` does not own it.
    pub async fn ensure_owner(&self, id: Uuid, requester: Uuid) -> Result<DocumentRecord> {
        let record = self
            .documents
            .get(id)
            .await?
            .ok_or(Error::DocumentNotFound(id))?;
        if record.owner_id != requester {
            return Err(Error::Forbidden(format!("document {id} is owned by another user")));
        }
        Ok(record)
    }

    /// Delete a document everywhere. The record goes first so a worker that
    /// is mid-flight sees it missing and does not re-project it.
    pub async fn delete(&self, id: Uuid) -> Result<DeleteReport> {
        let record = self
            .documents
            .delete(id)
            .await?
            .ok_or(Error::DocumentNotFound(id))?;

        let index_removed = self.projector.remove(id).await;

        let blob_removed = match self.blobs.delete(&record.storage_path).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "orchestrator",
                    op = "delete",
                    document_id = %id,
                    error = %e,
                    "Failed to delete blob"
                );
                false
            }
        };

        self.invalidate(id, &ALL_TAGS).await;
        info!(
            subsystem = "ingest",
            component = "orchestrator",
            op = "delete",
            document_id = %id,
            index_removed,
            blob_removed,
            "Document deleted"
        );

        Ok(DeleteReport {
            id,
            index_removed,
            blob_removed,
        })
    }

    /// Rename a subject in the system of record, then in the index, then
    /// invalidate everything derived from subject names.
    pub async fn rename_subject(&self, old: &str, new: &str) -> Result<RenameReport> {
        let old = old.trim();
        if old.is_empty() {
            return Err(Error::InvalidInput("subject must not be blank".into()));
        }
        let new = validate_subject(new)?;
        if old == new {
            return Ok(RenameReport {
                old_name: old.to_string(),
                new_name: new,
                records_renamed: 0,
                index_renamed: Some(0),
            });
        }

        let records_renamed = self.documents.rename_subject(old, &new).await?;
        let index_renamed = self.projector.rename_subject(old, &new).await;
        self.cache.invalidate(&ALL_TAGS).await;

        info!(
            subsystem = "ingest",
            component = "orchestrator",
            op = "rename_subject",
            old_name = old,
            new_name = %new,
            records_renamed,
            index_renamed = ?index_renamed,
            "Subject renamed"
        );

        Ok(RenameReport {
            old_name: old.to_string(),
            new_name: new,
            records_renamed,
            index_renamed,
        })
    }

    /// Reset a `completed` or `failed` record to `pending` and schedule it.
    pub async fn reprocess(&self, id: Uuid) -> Result<UploadReceipt> {
        if !self.documents.reset_for_reprocess(id).await? {
            return match self.documents.get(id).await? {
                None => Err(Error::DocumentNotFound(id)),
                Some(record) => Err(Error::InvalidInput(format!(
                    "document {id} is {} and cannot be reprocessed yet",
                    record.status
                ))),
            };
        }

        self.invalidate(id, &ALL_TAGS).await;

        let stage = match self
            .queue
            .enqueue(ProcessingTask::new(id, TaskReason::Reprocess))
            .await
        {
            Ok(_) => UploadStage::Enqueued,
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "orchestrator",
                    op = "reprocess",
                    document_id = %id,
                    error = %e,
                    "Failed to enqueue reprocess task, leaving record for the sweep"
                );
                UploadStage::Persisted
            }
        };
        info!(
            subsystem = "ingest",
            component = "orchestrator",
            op = "reprocess",
            document_id = %id,
            stage = stage.as_str(),
            "Document scheduled for reprocessing"
        );

        Ok(UploadReceipt {
            id,
            status: ProcessingStatus::Pending,
            stage,
        })
    }

    /// Reprocess up to `limit` failed records. Returns how many were
    /// rescheduled.
    pub async fn reprocess_failed(&self, limit: i64) -> Result<usize> {
        let ids = self
            .documents
            .ids_with_status(ProcessingStatus::Failed, None, limit)
            .await?;
        let mut scheduled = 0;
        for id in ids {
            match self.reprocess(id).await {
                Ok(_) => scheduled += 1,
                Err(e) if e.is_validation() || matches!(e, Error::DocumentNotFound(_)) => {
                    debug!(document_id = %id, error = %e, "Record changed before reprocess, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(scheduled)
    }

    /// Give every `pending` record last touched before `older_than` ago a
    /// fresh task. Covers lost enqueues; duplicate tasks are harmless since
    /// only one claim can win.
    pub async fn requeue_stranded(&self, older_than: Duration, limit: i64) -> Result<usize> {
        let ids = self
            .documents
            .ids_with_status(ProcessingStatus::Pending, Some(cutoff(older_than)?), limit)
            .await?;
        let mut requeued = 0;
        for id in ids {
            match self
                .queue
                .enqueue(ProcessingTask::new(id, TaskReason::Sweep))
                .await
            {
                Ok(_) => requeued += 1,
                Err(e) => {
                    warn!(
                        subsystem = "ingest",
                        component = "sweep",
                        document_id = %id,
                        error = %e,
                        "Failed to requeue stranded record"
                    );
                }
            }
        }
        Ok(requeued)
    }

    /// Mark `failed` every record stuck in `processing` for longer than
    /// `older_than`, making it eligible for reprocessing.
    pub async fn fail_abandoned(&self, older_than: Duration, limit: i64) -> Result<usize> {
        let ids = self
            .documents
            .ids_with_status(ProcessingStatus::Processing, Some(cutoff(older_than)?), limit)
            .await?;
        let outcome = ProcessingOutcome::Failed {
            error: format!(
                "abandoned: processing did not finish within {}s",
                older_than.as_secs()
            ),
        };
        let mut abandoned = 0;
        for id in ids {
            if self.documents.finish(id, &outcome).await? {
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            self.cache.invalidate(&ALL_TAGS).await;
        }
        Ok(abandoned)
    }

    /// One pass of stranded-record recovery.
    pub async fn sweep(&self, older_than: Duration, limit: i64) -> Result<SweepReport> {
        let start = Instant::now();
        let abandoned = self.fail_abandoned(older_than, limit).await?;
        let requeued = self.requeue_stranded(older_than, limit).await?;
        let report = SweepReport {
            requeued,
            abandoned,
        };
        if requeued > 0 || abandoned > 0 {
            info!(
                subsystem = "ingest",
                component = "sweep",
                requeued,
                abandoned,
                duration_ms = start.elapsed().as_millis() as u64,
                "Stranded records recovered"
            );
        } else {
            debug!(subsystem = "ingest", component = "sweep", "No stranded records");
        }
        Ok(report)
    }

    async fn invalidate(&self, id: Uuid, tags: &[CacheTag]) {
        if !self.cache.invalidate(tags).await {
            error!(
                subsystem = "ingest",
                component = "orchestrator",
                document_id = %id,
                "Cache invalidation deferred, reads will bypass the cache until it succeeds"
            );
        }
    }
}

#[async_trait]
impl StatusReporter for IngestionOrchestrator {
    async fn report(&self, id: Uuid, outcome: &ProcessingOutcome) -> Result<bool> {
        let applied = self.documents.finish(id, outcome).await?;
        let stage = match outcome {
            ProcessingOutcome::Completed { .. } => "projected",
            ProcessingOutcome::Failed { .. } => "degraded",
        };
        info!(
            subsystem = "ingest",
            component = "orchestrator",
            document_id = %id,
            stage,
            status = %outcome.status(),
            applied,
            "Processing outcome recorded"
        );
        if applied {
            self.invalidate(id, &ALL_TAGS).await;
            debug!(
                subsystem = "ingest",
                component = "orchestrator",
                document_id = %id,
                stage = "cache_invalidated",
                "Cache invalidated"
            );
        }
        Ok(applied)
    }
}
