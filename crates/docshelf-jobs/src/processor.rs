//! Processing of a single document task: claim, extract, project, report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docshelf_core::defaults::{EXTRACTION_TIMEOUT_SECS, INDEX_PROJECTION_REREADS};
use docshelf_core::{
    BlobStore, ClaimOutcome, DocumentRecord, DocumentRepository, FileFormat, ProcessingOutcome,
    ProcessingStatus, ProcessingTask, Result,
};
use docshelf_search::IndexProjector;

use crate::extraction::ContentExtractor;

/// Receives the terminal outcome of processing a record.
///
/// Implementations write the `processing -> completed | failed` transition
/// and invalidate any cached reads derived from the record.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Returns false when the record was no longer `processing`.
    async fn report(&self, id: Uuid, outcome: &ProcessingOutcome) -> Result<bool>;
}

/// What processing one task did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Indexed and marked `completed`. The text may be empty.
    Completed { char_count: usize },
    /// The index upsert exhausted its retries; marked `failed`.
    Failed { error: String },
    /// The record no longer exists.
    SkippedMissing,
    /// The record was not `pending` (duplicate or stale delivery).
    SkippedNotPending { status: ProcessingStatus },
    /// The record was deleted while its task was being processed. Nothing is
    /// left in the index.
    DeletedDuringProcessing,
}

impl ProcessOutcome {
    pub fn is_skipped(&self) -> bool {
        !matches!(
            self,
            ProcessOutcome::Completed { .. } | ProcessOutcome::Failed { .. }
        )
    }
}

/// State of the index document after a successful write.
enum Settled {
    Current,
    Deleted,
    IndexFailed(String),
}

/// Processes document tasks against the system of record, the blob store and
/// the search index.
pub struct DocumentProcessor {
    documents: Arc<dyn DocumentRepository>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<ContentExtractor>,
    projector: IndexProjector,
    reporter: Arc<dyn StatusReporter>,
    extraction_timeout: Duration,
}

impl DocumentProcessor {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<ContentExtractor>,
        projector: IndexProjector,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            documents,
            blobs,
            extractor,
            projector,
            reporter,
            extraction_timeout: Duration::from_secs(EXTRACTION_TIMEOUT_SECS),
        }
    }

    /// Wall-clock budget for one `extract` call.
    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    /// Process one task.
    ///
    /// Errs only when the system of record fails; the delivery should then be
    /// retried.
    pub async fn process(&self, task: &ProcessingTask) -> Result<ProcessOutcome> {
        let id = task.document_id;
        let start = Instant::now();

        let record = match self.documents.claim(id).await? {
            ClaimOutcome::Claimed(record) => record,
            ClaimOutcome::Missing => {
                debug!(
                    subsystem = "jobs",
                    component = "processor",
                    document_id = %id,
                    "Record no longer exists, skipping"
                );
                return Ok(ProcessOutcome::SkippedMissing);
            }
            ClaimOutcome::NotPending(status) => {
                debug!(
                    subsystem = "jobs",
                    component = "processor",
                    document_id = %id,
                    status = %status,
                    "Record is not pending, skipping duplicate delivery"
                );
                return Ok(ProcessOutcome::SkippedNotPending { status });
            }
        };

        let text = self.extract_text(id, &record.storage_path, record.format).await;

        // Re-read so a rename or delete that happened during extraction wins.
        let Some(current) = self.documents.get(id).await? else {
            info!(
                subsystem = "jobs",
                component = "processor",
                document_id = %id,
                "Record deleted during extraction, skipping index write"
            );
            return Ok(ProcessOutcome::DeletedDuringProcessing);
        };

        let outcome = match self.projector.project(&current, &text).await {
            Ok(_) => match self.settle_projection(current, &text).await? {
                Settled::Current => ProcessingOutcome::Completed {
                    char_count: text.chars().count(),
                },
                Settled::Deleted => return Ok(ProcessOutcome::DeletedDuringProcessing),
                Settled::IndexFailed(error) => ProcessingOutcome::Failed { error },
            },
            Err(e) => ProcessingOutcome::Failed {
                error: format!("index: {e}"),
            },
        };
        drop(text);

        let applied = self.reporter.report(id, &outcome).await?;
        if !applied {
            debug!(
                subsystem = "jobs",
                component = "processor",
                document_id = %id,
                "Record left processing before the outcome was reported"
            );
        }

        info!(
            subsystem = "jobs",
            component = "processor",
            op = "process",
            document_id = %id,
            format = %record.format,
            status = %outcome.status(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Document processed"
        );

        Ok(match outcome {
            ProcessingOutcome::Completed { char_count } => ProcessOutcome::Completed { char_count },
            ProcessingOutcome::Failed { error } => ProcessOutcome::Failed { error },
        })
    }

    /// Re-read the record after an index write and project again until the
    /// index document matches it. A delete that landed during the write
    /// removes the index document.
    async fn settle_projection(&self, mut projected: DocumentRecord, text: &str) -> Result<Settled> {
        let id = projected.id;
        for _ in 0..INDEX_PROJECTION_REREADS {
            let Some(current) = self.documents.get(id).await? else {
                self.projector.remove(id).await;
                info!(
                    subsystem = "jobs",
                    component = "processor",
                    document_id = %id,
                    "Record deleted during index write, removed index document"
                );
                return Ok(Settled::Deleted);
            };
            if current.same_projection(&projected) {
                return Ok(Settled::Current);
            }

            debug!(
                subsystem = "jobs",
                component = "processor",
                document_id = %id,
                subject = %current.subject,
                "Record changed during index write, projecting again"
            );
            if let Err(e) = self.projector.project(&current, text).await {
                return Ok(Settled::IndexFailed(format!("index: {e}")));
            }
            projected = current;
        }

        // Still churning. Any later rename updates the index itself.
        if !self.documents.exists(id).await? {
            self.projector.remove(id).await;
            return Ok(Settled::Deleted);
        }
        warn!(
            subsystem = "jobs",
            component = "processor",
            document_id = %id,
            rereads = INDEX_PROJECTION_REREADS,
            "Record kept changing during index write"
        );
        Ok(Settled::Current)
    }

    /// Read the blob and extract its text. Every failure yields empty text.
    async fn extract_text(&self, id: Uuid, storage_path: &str, format: FileFormat) -> String {
        let bytes = match self.blobs.get(storage_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "processor",
                    document_id = %id,
                    error = %e,
                    "Failed to read blob, indexing without text"
                );
                return String::new();
            }
        };

        match tokio::time::timeout(self.extraction_timeout, self.extractor.extract(&bytes, format))
            .await
        {
            Ok(text) => text,
            Err(_) => {
                warn!(
                    subsystem = "jobs",
                    component = "processor",
                    document_id = %id,
                    format = %format,
                    timeout_secs = self.extraction_timeout.as_secs(),
                    "Extraction timed out, indexing without text"
                );
                String::new()
            }
        }
    }
}
