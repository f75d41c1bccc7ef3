//! End-to-end pipeline tests: orchestrator, processor, index and cache on the
//! in-process backends.
//!
//! Covers:
//! - upload to searchable, including the single-hit Biology/Notes case
//! - cache coherence after uploads, completions, renames and deletes
//! - idempotent processing and corrupt input handling
//! - rejection before persistence, partial-failure recovery and the sweep

mod common;

use std::time::Duration;

use uuid::Uuid;

use common::{strict_cache_config, Pipeline};
use docshelf_api::UploadStage;
use docshelf_cache::CacheConfig;
use docshelf_core::{
    Category, DocumentFilter, DocumentRepository, Error, FileFormat, Page, ProcessingStatus,
    ProcessingTask, SearchQuery, TaskQueue, TaskReason,
};

/// Lets `Utc::now()` move past a record's `updated_at`.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

// ============================================================================
// UPLOAD TO SEARCHABLE
// ============================================================================

#[tokio::test]
async fn test_biology_notes_upload_completes_and_is_single_hit() {
    let p = Pipeline::new();
    p.upload(
        "intro.txt",
        "Chemistry",
        Category::Slides,
        b"Covalent bonds share electrons",
    )
    .await
    .unwrap();

    let receipt = p
        .upload(
            "cell_respiration.txt",
            "Biology",
            Category::Notes,
            b"Mitochondria produce ATP through oxidative phosphorylation zyxquasar",
        )
        .await
        .unwrap();
    assert_eq!(receipt.status, ProcessingStatus::Pending);
    assert_eq!(receipt.stage, UploadStage::Enqueued);

    p.drain().await;
    assert_eq!(p.status(receipt.id).await, ProcessingStatus::Completed);

    let results = p
        .query
        .search(p.owner, SearchQuery::new("zyxquasar"))
        .await
        .unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(results.hits.len(), 1);
    let hit = &results.hits[0];
    assert_eq!(hit.id, receipt.id);
    assert_eq!(hit.subject, "Biology");
    assert_eq!(hit.category, Category::Notes);
    assert_eq!(hit.display_name, "cell respiration");
}

#[tokio::test]
async fn test_token_becomes_searchable_once_completed() {
    let p = Pipeline::new();
    let receipt = p
        .upload("krebs.md", "Biology", Category::Notes, b"# Krebs\nflurbonic cycle")
        .await
        .unwrap();

    // Not yet processed; the empty answer is cached under files+subjects.
    let before = p
        .query
        .search(p.owner, SearchQuery::new("flurbonic"))
        .await
        .unwrap();
    assert_eq!(before.total, 0);

    p.drain().await;

    let after = p
        .query
        .search(p.owner, SearchQuery::new("flurbonic"))
        .await
        .unwrap();
    assert_eq!(after.total, 1);
    assert_eq!(after.hits[0].id, receipt.id);
    assert!(after.hits[0]
        .highlights
        .iter()
        .any(|h| h.contains("<em>flurbonic</em>")));
}

#[tokio::test]
async fn test_listing_is_not_stale_after_upload() {
    let p = Pipeline::new();
    let filter = DocumentFilter::default();

    let empty = p
        .query
        .list_documents(p.owner, filter.clone(), Page::default())
        .await
        .unwrap();
    assert_eq!(empty.total, 0);

    p.upload("a.txt", "Physics", Category::Exam, b"kinematics")
        .await
        .unwrap();
    let one = p
        .query
        .list_documents(p.owner, filter.clone(), Page::default())
        .await
        .unwrap();
    assert_eq!(one.total, 1);

    // Served from cache until the next change.
    let again = p
        .query
        .list_documents(p.owner, filter, Page::default())
        .await
        .unwrap();
    assert_eq!(again, one);
    assert!(p.cache.stats().hits >= 1);
}

#[tokio::test]
async fn test_stats_follow_completed_documents() {
    let p = Pipeline::new();
    assert_eq!(p.query.stats(p.owner).await.unwrap().total_documents, 0);

    p.upload("a.txt", "Biology", Category::Notes, b"alpha")
        .await
        .unwrap();
    p.upload("b.md", "Physics", Category::Exam, b"beta")
        .await
        .unwrap();
    p.drain().await;

    let stats = p.query.stats(p.owner).await.unwrap();
    assert_eq!(stats.total_documents, 2);
    assert_eq!(stats.subject_count, 2);
    let formats: Vec<&str> = stats.by_format.iter().map(|f| f.value.as_str()).collect();
    assert!(formats.contains(&"txt"));
    assert!(formats.contains(&"md"));
}

// ============================================================================
// PROCESSING
// ============================================================================

#[tokio::test]
async fn test_duplicate_deliveries_produce_one_index_document() {
    let p = Pipeline::new();
    let receipt = p
        .upload("notes.txt", "Biology", Category::Notes, b"photosynthesis light reactions")
        .await
        .unwrap();
    p.queue
        .enqueue(ProcessingTask::new(receipt.id, TaskReason::Sweep))
        .await
        .unwrap();

    assert_eq!(p.drain().await, 2);
    assert_eq!(p.index.len().await, 1);
    let first = p.indexed(receipt.id).await.unwrap();

    p.orchestrator.reprocess(receipt.id).await.unwrap();
    p.drain().await;
    let second = p.indexed(receipt.id).await.unwrap();

    assert_eq!(p.index.len().await, 1);
    assert_eq!(second.content, first.content);
    assert_eq!(second.subject, first.subject);
    assert_eq!(second.display_name, first.display_name);
    assert_eq!(second.category, first.category);
}

#[tokio::test]
async fn test_corrupt_inputs_complete_with_empty_text() {
    let p = Pipeline::new();
    let ole_header = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0x00, 0x01];
    let cases: Vec<(&str, Vec<u8>)> = vec![
        ("broken.pdf", b"%PDF-1.4\n1 0 obj <<".to_vec()),
        ("broken.docx", b"PK\x03\x04\x14\x00truncated".to_vec()),
        ("broken.pptx", b"PK\x03\x04\x14\x00truncated".to_vec()),
        ("broken.doc", ole_header.to_vec()),
        ("broken.ppt", ole_header.to_vec()),
        ("broken.txt", b"\x00\x01\x02\x00binary".to_vec()),
        ("broken.md", b"\x00\x00\x00\x00".to_vec()),
    ];

    let mut ids = Vec::new();
    for (filename, data) in &cases {
        let receipt = p
            .upload(filename, "Misc", Category::Other, data)
            .await
            .unwrap();
        ids.push((filename, receipt.id));
    }
    p.drain().await;

    for (filename, id) in ids {
        assert_eq!(p.status(id).await, ProcessingStatus::Completed, "{filename}");
        let doc = p.indexed(id).await.unwrap();
        assert_eq!(doc.content, "", "{filename}");
    }
}

#[tokio::test]
async fn test_index_outage_marks_failed_and_reprocess_recovers() {
    let p = Pipeline::new();
    p.index.set_unavailable(true);

    let receipt = p
        .upload("thermo.txt", "Physics", Category::Notes, b"entropy glorptide")
        .await
        .unwrap();
    p.drain().await;

    let record = p.documents.get(receipt.id).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Failed);
    assert!(record.error_message.unwrap().starts_with("index:"));

    // Degraded search answers empty instead of failing.
    let degraded = p
        .query
        .search(p.owner, SearchQuery::new("glorptide"))
        .await
        .unwrap();
    assert_eq!(degraded.total, 0);

    p.index.set_unavailable(false);
    assert_eq!(p.orchestrator.reprocess_failed(10).await.unwrap(), 1);
    p.drain().await;

    assert_eq!(p.status(receipt.id).await, ProcessingStatus::Completed);
    let results = p
        .query
        .search(p.owner, SearchQuery::new("glorptide"))
        .await
        .unwrap();
    assert_eq!(results.total, 1);
}

#[tokio::test]
async fn test_reprocess_rejects_non_terminal_record() {
    let p = Pipeline::new();
    let receipt = p
        .upload("a.txt", "Biology", Category::Notes, b"alpha")
        .await
        .unwrap();

    let err = p.orchestrator.reprocess(receipt.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = p.orchestrator.reprocess(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound(_)));
}

// ============================================================================
// RENAME
// ============================================================================

#[tokio::test]
async fn test_rename_subject_updates_records_index_and_listings() {
    let p = Pipeline::new();
    let receipt = p
        .upload("genetics.txt", "Bio 101", Category::Notes, b"alleles and loci")
        .await
        .unwrap();
    p.drain().await;

    let subjects = p.query.list_subjects(p.owner).await.unwrap();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].value, "Bio 101");
    let old_hits = p
        .query
        .search(p.owner, SearchQuery::new("alleles").with_subject("Bio 101"))
        .await
        .unwrap();
    assert_eq!(old_hits.total, 1);

    let report = p
        .orchestrator
        .rename_subject("Bio 101", "Biology")
        .await
        .unwrap();
    assert_eq!(report.records_renamed, 1);
    assert_eq!(report.index_renamed, Some(1));

    let record = p.documents.get(receipt.id).await.unwrap().unwrap();
    assert_eq!(record.subject, "Biology");

    let new_hits = p
        .query
        .search(p.owner, SearchQuery::new("alleles").with_subject("Biology"))
        .await
        .unwrap();
    assert_eq!(new_hits.total, 1);
    let old_hits = p
        .query
        .search(p.owner, SearchQuery::new("alleles").with_subject("Bio 101"))
        .await
        .unwrap();
    assert_eq!(old_hits.total, 0);

    let subjects = p.query.list_subjects(p.owner).await.unwrap();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].value, "Biology");
}

#[tokio::test]
async fn test_rename_during_processing_is_not_undone() {
    let p = Pipeline::new();
    let receipt = p
        .upload("genetics.txt", "Bio 101", Category::Notes, b"alleles")
        .await
        .unwrap();

    // The worker re-reads the record after extraction, so a rename that lands
    // before projection is what gets indexed.
    p.orchestrator
        .rename_subject("Bio 101", "Biology")
        .await
        .unwrap();
    p.drain().await;

    assert_eq!(p.indexed(receipt.id).await.unwrap().subject, "Biology");
}

#[tokio::test]
async fn test_rename_validation() {
    let p = Pipeline::new();
    assert!(matches!(
        p.orchestrator.rename_subject("Bio", "  ").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        p.orchestrator.rename_subject(" ", "Biology").await,
        Err(Error::InvalidInput(_))
    ));
    let noop = p.orchestrator.rename_subject("Bio", "Bio").await.unwrap();
    assert_eq!(noop.records_renamed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_subject_listing_fast_path_is_bounded_stale() {
    let p = Pipeline::with_cache_config(CacheConfig {
        fast_path_ttl: Duration::from_secs(5),
        ..strict_cache_config()
    });
    p.upload("a.txt", "Biology", Category::Notes, b"alpha")
        .await
        .unwrap();
    p.drain().await;
    assert_eq!(p.query.list_subjects(p.owner).await.unwrap().len(), 1);

    p.upload("b.txt", "Chemistry", Category::Notes, b"beta")
        .await
        .unwrap();
    p.drain().await;

    // Inside the fast-path window the old answer may still be served.
    assert_eq!(p.query.list_subjects(p.owner).await.unwrap().len(), 1);

    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(p.query.list_subjects(p.owner).await.unwrap().len(), 2);
}

// ============================================================================
// VALIDATION AND PARTIAL FAILURES
// ============================================================================

#[tokio::test]
async fn test_unsupported_format_rejected_before_persist_and_enqueue() {
    let p = Pipeline::new();
    let err = p
        .upload("setup.exe", "Biology", Category::Other, b"MZ\x90\x00")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(ref ext) if ext == "exe"));

    assert!(p.documents.is_empty().await);
    assert!(p.blobs.is_empty().await);
    assert_eq!(p.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_upload_validation_rejects_before_persist() {
    let p = Pipeline::new().with_max_upload_bytes(8);

    assert!(matches!(
        p.upload("a.txt", "Biology", Category::Notes, b"").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        p.upload("a.txt", "Biology", Category::Notes, b"123456789").await,
        Err(Error::PayloadTooLarge { size: 9, limit: 8 })
    ));
    assert!(matches!(
        p.upload("a.txt", "   ", Category::Notes, b"ok").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        p.upload("README", "Biology", Category::Notes, b"ok").await,
        Err(Error::UnsupportedFormat(_))
    ));

    assert!(p.documents.is_empty().await);
    assert!(p.blobs.is_empty().await);
}

#[tokio::test]
async fn test_filename_is_sanitized() {
    let p = Pipeline::new();
    let receipt = p
        .upload("../../etc/lecture<1>.md", "Biology", Category::Notes, b"text")
        .await
        .unwrap();
    let record = p.documents.get(receipt.id).await.unwrap().unwrap();
    assert_eq!(record.filename, "lecture_1_.md");
    assert_eq!(record.format, FileFormat::Md);
}

#[tokio::test]
async fn test_record_failure_removes_blob_and_enqueues_nothing() {
    let p = Pipeline::new();
    p.documents.set_fail_writes(true);

    let err = p
        .upload("a.txt", "Biology", Category::Notes, b"alpha")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), docshelf_core::ErrorKind::Record);

    assert!(p.blobs.is_empty().await);
    assert_eq!(p.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_enqueue_failure_is_recovered_by_sweep() {
    let p = Pipeline::new();
    p.queue.set_fail_enqueue(true);

    let receipt = p
        .upload("a.txt", "Biology", Category::Notes, b"stranded gizmotron")
        .await
        .unwrap();
    assert_eq!(receipt.stage, UploadStage::Persisted);
    assert_eq!(p.status(receipt.id).await, ProcessingStatus::Pending);
    assert_eq!(p.drain().await, 0);

    p.queue.set_fail_enqueue(false);
    tick().await;
    let report = p
        .orchestrator
        .sweep(Duration::ZERO, 100)
        .await
        .unwrap();
    assert_eq!(report.requeued, 1);
    assert_eq!(report.abandoned, 0);

    p.drain().await;
    assert_eq!(p.status(receipt.id).await, ProcessingStatus::Completed);
}

#[tokio::test]
async fn test_sweep_fails_abandoned_processing_records() {
    let p = Pipeline::new();
    let receipt = p
        .upload("a.txt", "Biology", Category::Notes, b"alpha")
        .await
        .unwrap();
    // A worker claimed the record and died.
    p.documents.claim(receipt.id).await.unwrap();
    tick().await;

    let report = p
        .orchestrator
        .sweep(Duration::ZERO, 100)
        .await
        .unwrap();
    assert_eq!(report.abandoned, 1);

    let record = p.documents.get(receipt.id).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Failed);
    assert!(record.error_message.unwrap().starts_with("abandoned:"));

    // The original delivery is now a no-op; reprocessing recovers the record.
    p.drain().await;
    assert_eq!(p.orchestrator.reprocess_failed(10).await.unwrap(), 1);
    p.drain().await;
    assert_eq!(p.status(receipt.id).await, ProcessingStatus::Completed);
}

#[tokio::test]
async fn test_sweep_ignores_fresh_records() {
    let p = Pipeline::new();
    p.queue.set_fail_enqueue(true);
    p.upload("a.txt", "Biology", Category::Notes, b"alpha")
        .await
        .unwrap();
    p.queue.set_fail_enqueue(false);

    let report = p
        .orchestrator
        .sweep(Duration::from_secs(600), 100)
        .await
        .unwrap();
    assert_eq!(report.requeued, 0);
    assert_eq!(report.abandoned, 0);
}

// ============================================================================
// DELETE AND OWNERSHIP
// ============================================================================

#[tokio::test]
async fn test_delete_while_queued_leaves_nothing_in_index() {
    let p = Pipeline::new();
    let receipt = p
        .upload("a.txt", "Biology", Category::Notes, b"ephemeral quoxite")
        .await
        .unwrap();

    let report = p.orchestrator.delete(receipt.id).await.unwrap();
    assert!(report.blob_removed);
    p.drain().await;

    assert!(p.index.is_empty().await);
    assert!(p.documents.is_empty().await);
    assert!(p.blobs.is_empty().await);
    assert_eq!(p.queue.pending_count().await.unwrap(), 0);
    let results = p
        .query
        .search(p.owner, SearchQuery::new("quoxite"))
        .await
        .unwrap();
    assert_eq!(results.total, 0);
}

#[tokio::test]
async fn test_delete_after_completion_removes_hit() {
    let p = Pipeline::new();
    let receipt = p
        .upload("a.txt", "Biology", Category::Notes, b"transient vorpalite")
        .await
        .unwrap();
    p.drain().await;
    let query = SearchQuery::new("vorpalite");
    assert_eq!(p.query.search(p.owner, query.clone()).await.unwrap().total, 1);

    let report = p.orchestrator.delete(receipt.id).await.unwrap();
    assert!(report.index_removed);
    assert_eq!(p.query.search(p.owner, query).await.unwrap().total, 0);

    assert!(matches!(
        p.orchestrator.delete(receipt.id).await,
        Err(Error::DocumentNotFound(_))
    ));
}

#[tokio::test]
async fn test_status_is_owner_only() {
    let p = Pipeline::new();
    let receipt = p
        .upload("a.txt", "Biology", Category::Notes, b"alpha")
        .await
        .unwrap();

    let view = p.query.status(receipt.id, p.owner).await.unwrap();
    assert_eq!(view.status, ProcessingStatus::Pending);

    let stranger = Uuid::new_v4();
    assert!(matches!(
        p.query.status(receipt.id, stranger).await,
        Err(Error::DocumentNotFound(_))
    ));
    assert!(matches!(
        p.orchestrator.ensure_owner(receipt.id, stranger).await,
        Err(Error::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_bypass_user_skips_cache() {
    let diagnostic = Uuid::new_v4();
    let p = Pipeline::with_cache_config(CacheConfig {
        bypass_user: Some(diagnostic),
        ..strict_cache_config()
    });

    p.query
        .search(diagnostic, SearchQuery::new("anything"))
        .await
        .unwrap();
    p.query.list_subjects(diagnostic).await.unwrap();

    let stats = p.cache.stats();
    assert_eq!(stats.bypasses, 2);
    assert_eq!(stats.hits + stats.misses, 0);
    assert!(p.cache_store.is_empty().await);
}
