//! In-process system of record and task queue.
//!
//! Same contracts as the PostgreSQL implementations, for single-node
//! deployments without a database and for pipeline tests. Both carry a
//! failure switch so callers can exercise the write-failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use docshelf_core::{
    ClaimOutcome, Delivery, DocumentFilter, DocumentPage, DocumentRecord, DocumentRepository,
    Error, NewDocument, Page, ProcessingOutcome, ProcessingStatus, ProcessingTask, Result,
    TaskQueue,
};

use crate::tasks::{retry_delay_secs, QueueConfig, LEASE_EXPIRED_ERROR};

// =============================================================================
// DOCUMENT REPOSITORY
// =============================================================================

/// In-memory implementation of DocumentRepository.
#[derive(Default)]
pub struct MemoryDocumentRepository {
    records: RwLock<HashMap<Uuid, DocumentRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every mutating call fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn insert(&self, doc: NewDocument) -> Result<DocumentRecord> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        if records.contains_key(&doc.id) {
            return Err(Error::InvalidInput(format!("duplicate document id {}", doc.id)));
        }
        let record = doc.into_record(Utc::now());
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.read().await.contains_key(&id))
    }

    async fn list(&self, filter: &DocumentFilter, page: Page) -> Result<DocumentPage> {
        let records = self.records.read().await;
        let mut matching: Vec<&DocumentRecord> =
            records.values().filter(|r| filter.matches(r)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .map(DocumentRecord::summary)
            .collect();

        Ok(DocumentPage {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    async fn claim(&self, id: Uuid) -> Result<ClaimOutcome> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&id) else {
            return Ok(ClaimOutcome::Missing);
        };
        if !record.status.can_transition_to(ProcessingStatus::Processing) {
            return Ok(ClaimOutcome::NotPending(record.status));
        }
        record.status = ProcessingStatus::Processing;
        record.updated_at = Utc::now();
        Ok(ClaimOutcome::Claimed(record.clone()))
    }

    async fn finish(&self, id: Uuid, outcome: &ProcessingOutcome) -> Result<bool> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.status.can_transition_to(outcome.status()) => {
                let now = Utc::now();
                record.status = outcome.status();
                record.error_message = outcome.error_message().map(str::to_string);
                record.processed_at = Some(now);
                record.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_for_reprocess(&self, id: Uuid) -> Result<bool> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.status.can_transition_to(ProcessingStatus::Pending) => {
                record.status = ProcessingStatus::Pending;
                record.error_message = None;
                record.processed_at = None;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        self.check_writable()?;
        Ok(self.records.write().await.remove(&id))
    }

    async fn rename_subject(&self, old: &str, new: &str) -> Result<u64> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        let now = Utc::now();
        let mut renamed = 0;
        for record in records.values_mut().filter(|r| r.subject == old) {
            record.subject = new.to_string();
            record.updated_at = now;
            renamed += 1;
        }
        Ok(renamed)
    }

    async fn ids_with_status(
        &self,
        status: ProcessingStatus,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let records = self.records.read().await;
        let mut matching: Vec<&DocumentRecord> = records
            .values()
            .filter(|r| r.status == status)
            .filter(|r| before.map_or(true, |b| r.updated_at < b))
            .collect();
        matching.sort_by_key(|r| r.updated_at);
        Ok(matching
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|r| r.id)
            .collect())
    }
}

// =============================================================================
// TASK QUEUE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Queued,
    Leased,
    Dead,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    id: Uuid,
    task: ProcessingTask,
    state: EntryState,
    attempts: i32,
    visible_at: Instant,
    last_error: Option<String>,
}

/// In-memory implementation of TaskQueue with leases and retry backoff.
pub struct MemoryTaskQueue {
    entries: Mutex<Vec<QueueEntry>>,
    config: QueueConfig,
    notify: Arc<Notify>,
    fail_enqueue: AtomicBool,
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::with_config(QueueConfig::default())
    }
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            config,
            notify: Arc::new(Notify::new()),
            fail_enqueue: AtomicBool::new(false),
        }
    }

    /// Make `enqueue` fail with a queue error.
    pub fn set_fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    /// Tasks that exhausted their attempts, with the last error.
    pub async fn dead_letters(&self) -> Vec<(ProcessingTask, Option<String>)> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.state == EntryState::Dead)
            .map(|e| (e.task, e.last_error.clone()))
            .collect()
    }

    /// Tasks not yet acked or dead-lettered.
    pub async fn in_flight(&self) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.state != EntryState::Dead)
            .count()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: ProcessingTask) -> Result<Uuid> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(Error::Queue("queue unavailable".to_string()));
        }
        let id = Uuid::now_v7();
        self.entries.lock().await.push(QueueEntry {
            id,
            task,
            state: EntryState::Queued,
            attempts: 0,
            visible_at: Instant::now(),
            last_error: None,
        });
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn claim_batch(&self, max: usize) -> Result<Vec<Delivery>> {
        let now = Instant::now();
        let lease = Duration::from_secs(self.config.lease_secs.max(0) as u64);
        let mut entries = self.entries.lock().await;

        for entry in entries.iter_mut().filter(|e| {
            e.state == EntryState::Leased
                && e.visible_at <= now
                && e.attempts >= self.config.max_attempts
        }) {
            entry.state = EntryState::Dead;
            entry
                .last_error
                .get_or_insert_with(|| LEASE_EXPIRED_ERROR.to_string());
        }

        let deliveries = entries
            .iter_mut()
            .filter(|e| e.state != EntryState::Dead)
            .filter(|e| e.visible_at <= now && e.attempts < self.config.max_attempts)
            .take(max)
            .map(|e| {
                e.state = EntryState::Leased;
                e.attempts += 1;
                e.visible_at = now + lease;
                Delivery {
                    delivery_id: e.id,
                    task: e.task,
                    attempt: e.attempts,
                }
            })
            .collect();
        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<()> {
        self.entries.lock().await.retain(|e| e.id != delivery_id);
        Ok(())
    }

    async fn nack(&self, delivery_id: Uuid, error: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == delivery_id) {
            entry.last_error = Some(error.to_string());
            if entry.attempts >= self.config.max_attempts {
                entry.state = EntryState::Dead;
            } else {
                let delay = retry_delay_secs(self.config.retry_base_secs, entry.attempts);
                entry.state = EntryState::Queued;
                entry.visible_at = Instant::now() + Duration::from_secs(delay as u64);
            }
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.state == EntryState::Queued)
            .count() as i64)
    }

    fn notify_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
