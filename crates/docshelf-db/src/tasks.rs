//! Durable processing task queue on PostgreSQL.
//!
//! Tasks are leased with `FOR UPDATE SKIP LOCKED`; a leased task that is
//! neither acked nor nacked becomes visible again when its lease expires,
//! giving at-least-once delivery. A task whose final lease expires is
//! dead-lettered on the next claim.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use docshelf_core::{defaults, Delivery, Error, ProcessingTask, Result, TaskQueue};

/// Upper bound on the nack backoff.
const MAX_RETRY_DELAY_SECS: i64 = 3600;

/// Error recorded on a task whose last lease expired unacknowledged.
pub const LEASE_EXPIRED_ERROR: &str = "lease expired on final attempt";

/// Visibility delay before attempt `attempt + 1`, doubling per attempt.
pub fn retry_delay_secs(base_secs: i64, attempt: i32) -> i64 {
    let exp = attempt.saturating_sub(1).clamp(0, 20) as u32;
    base_secs
        .max(0)
        .saturating_mul(1i64 << exp)
        .min(MAX_RETRY_DELAY_SECS)
}

/// Lease and retry settings for a task queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub lease_secs: i64,
    pub max_attempts: i32,
    pub retry_base_secs: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_secs: defaults::TASK_LEASE_SECS,
            max_attempts: defaults::TASK_MAX_ATTEMPTS,
            retry_base_secs: defaults::TASK_RETRY_BASE_SECS,
        }
    }
}

/// PostgreSQL implementation of TaskQueue.
pub struct PgTaskQueue {
    pool: Pool<Postgres>,
    config: QueueConfig,
    notify: Arc<Notify>,
}

impl PgTaskQueue {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self::with_config(pool, QueueConfig::default())
    }

    pub fn with_config(pool: Pool<Postgres>, config: QueueConfig) -> Self {
        Self {
            pool,
            config,
            notify: Arc::new(Notify::new()),
        }
    }

    async fn dead_letter(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE processing_task SET status = 'dead', last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Dead-letter leased tasks whose final attempt expired without an ack
    /// or nack.
    async fn reap_expired_leases(&self) -> Result<u64> {
        let reaped = sqlx::query(
            "UPDATE processing_task
             SET status = 'dead',
                 last_error = COALESCE(last_error, $1)
             WHERE status = 'leased'
               AND visible_at <= NOW()
               AND attempts >= max_attempts",
        )
        .bind(LEASE_EXPIRED_ERROR)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if reaped > 0 {
            warn!(
                subsystem = "db",
                component = "task_queue",
                op = "reap",
                count = reaped,
                "Leases expired on final attempt, dead-lettered"
            );
        }
        Ok(reaped)
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(&self, task: ProcessingTask) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let payload = serde_json::to_value(task)?;

        sqlx::query(
            "INSERT INTO processing_task (id, payload, max_attempts, visible_at, created_at)
             VALUES ($1, $2, $3, NOW(), NOW())",
        )
        .bind(id)
        .bind(&payload)
        .bind(self.config.max_attempts)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "task_queue",
            op = "enqueue",
            delivery_id = %id,
            document_id = %task.document_id,
            "Task enqueued"
        );
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn claim_batch(&self, max: usize) -> Result<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        self.reap_expired_leases().await?;

        let rows = sqlx::query(
            "UPDATE processing_task
             SET status = 'leased',
                 attempts = attempts + 1,
                 visible_at = NOW() + make_interval(secs => $2)
             WHERE id IN (
                 SELECT id FROM processing_task
                 WHERE status IN ('queued', 'leased')
                   AND visible_at <= NOW()
                   AND attempts < max_attempts
                 ORDER BY created_at ASC
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, payload, attempts",
        )
        .bind(max as i64)
        .bind(self.config.lease_secs as f64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut deliveries = Vec::with_capacity(rows.len());
        for row in rows {
            let delivery_id: Uuid = row.try_get("id")?;
            let payload: JsonValue = row.try_get("payload")?;
            let attempt: i32 = row.try_get("attempts")?;

            match serde_json::from_value::<ProcessingTask>(payload) {
                Ok(task) => deliveries.push(Delivery {
                    delivery_id,
                    task,
                    attempt,
                }),
                Err(e) => {
                    warn!(
                        subsystem = "db",
                        component = "task_queue",
                        delivery_id = %delivery_id,
                        error = %e,
                        "Undecodable task payload, dead-lettering"
                    );
                    self.dead_letter(delivery_id, &format!("payload: {e}"))
                        .await?;
                }
            }
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM processing_task WHERE id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn nack(&self, delivery_id: Uuid, error: &str) -> Result<()> {
        let row = sqlx::query(
            "UPDATE processing_task
             SET status = CASE WHEN attempts >= max_attempts THEN 'dead' ELSE 'queued' END,
                 visible_at = NOW() + make_interval(
                     secs => LEAST($2 * power(2, GREATEST(attempts - 1, 0)), $3)),
                 last_error = $4
             WHERE id = $1
             RETURNING status, attempts",
        )
        .bind(delivery_id)
        .bind(self.config.retry_base_secs as f64)
        .bind(MAX_RETRY_DELAY_SECS as f64)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = row {
            let status: String = row.try_get("status")?;
            if status == "dead" {
                let attempts: i32 = row.try_get("attempts")?;
                warn!(
                    subsystem = "db",
                    component = "task_queue",
                    op = "nack",
                    delivery_id = %delivery_id,
                    attempts,
                    error,
                    "Task exhausted retries, dead-lettered"
                );
            }
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM processing_task WHERE status = 'queued'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }

    fn notify_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
