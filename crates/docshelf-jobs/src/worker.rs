//! Background worker consuming document tasks from the queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use docshelf_core::defaults::{
    EVENT_BUS_CAPACITY, EXTRACTION_TIMEOUT_SECS, WORKER_MAX_CONCURRENT, WORKER_POLL_INTERVAL_MS,
};
use docshelf_core::{Delivery, Error, ProcessingStatus, Result, TaskQueue};

use crate::processor::{DocumentProcessor, ProcessOutcome};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of deliveries processed concurrently.
    pub max_concurrent: usize,
    /// Wall-clock budget for one extraction.
    pub extraction_timeout: Duration,
    /// Whether to process tasks at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: WORKER_POLL_INTERVAL_MS,
            max_concurrent: WORKER_MAX_CONCURRENT,
            extraction_timeout: Duration::from_secs(EXTRACTION_TIMEOUT_SECS),
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ENABLED` | `true` | Enable/disable task processing |
    /// | `WORKER_MAX_CONCURRENT` | `4` | Max concurrent deliveries |
    /// | `WORKER_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `EXTRACTION_TIMEOUT_SECS` | `120` | Wall-clock budget per extraction |
    pub fn from_env() -> Self {
        let enabled = std::env::var("WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent = std::env::var("WORKER_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(WORKER_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(WORKER_POLL_INTERVAL_MS);

        let extraction_timeout = std::env::var("EXTRACTION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(EXTRACTION_TIMEOUT_SECS));

        Self {
            poll_interval_ms,
            max_concurrent,
            extraction_timeout,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A delivery was picked up.
    TaskStarted { document_id: Uuid, attempt: i32 },
    /// The record reached a terminal status.
    TaskCompleted {
        document_id: Uuid,
        status: ProcessingStatus,
    },
    /// Processing hit a system-of-record error; the delivery was nacked.
    TaskFailed { document_id: Uuid, error: String },
    /// Nothing to do for this delivery (missing, duplicate, deleted).
    TaskSkipped {
        document_id: Uuid,
        outcome: ProcessOutcome,
    },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully. In-flight deliveries finish
    /// first.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that claims deliveries from a [`TaskQueue`] and runs them through
/// a [`DocumentProcessor`].
pub struct JobWorker {
    queue: Arc<dyn TaskQueue>,
    processor: Arc<DocumentProcessor>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        processor: DocumentProcessor,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let processor = processor.with_extraction_timeout(config.extraction_timeout);
        Self {
            queue,
            processor: Arc::new(processor),
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Claim up to `max_concurrent` deliveries, process them concurrently,
    /// and only sleep when the queue is empty. An enqueue wakes the sleep
    /// early through the queue's notify handle.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent,
            extraction_timeout_secs = self.config.extraction_timeout.as_secs(),
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let notify = self.queue.notify_handle();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            // Register interest before claiming so an enqueue racing the
            // claim is not missed.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deliveries = match self.queue.claim_batch(self.config.max_concurrent.max(1)).await
            {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    error!(error = %e, "Failed to claim deliveries");
                    Vec::new()
                }
            };

            if deliveries.is_empty() {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = &mut notified => {}
                    _ = sleep(poll_interval) => {}
                }
                continue;
            }

            debug!(claimed = deliveries.len(), "Processing delivery batch");
            let mut tasks = tokio::task::JoinSet::new();
            for delivery in deliveries {
                let runner = DeliveryRunner {
                    queue: self.queue.clone(),
                    processor: self.processor.clone(),
                    event_tx: self.event_tx.clone(),
                };
                tasks.spawn(async move { runner.execute(delivery).await });
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(error = ?e, "Delivery task panicked");
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }
}

/// Everything a spawned task needs to run one delivery.
struct DeliveryRunner {
    queue: Arc<dyn TaskQueue>,
    processor: Arc<DocumentProcessor>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl DeliveryRunner {
    async fn execute(self, delivery: Delivery) {
        let start = Instant::now();
        let document_id = delivery.task.document_id;
        let _ = self.event_tx.send(WorkerEvent::TaskStarted {
            document_id,
            attempt: delivery.attempt,
        });

        match self.processor.process(&delivery.task).await {
            Ok(outcome) => {
                if let Err(e) = self.queue.ack(delivery.delivery_id).await {
                    // The lease expires and the task is redelivered; the
                    // claim makes the repeat a no-op.
                    warn!(
                        subsystem = "jobs",
                        delivery_id = %delivery.delivery_id,
                        error = %e,
                        "Failed to ack delivery"
                    );
                }
                let event = match &outcome {
                    ProcessOutcome::Completed { .. } => WorkerEvent::TaskCompleted {
                        document_id,
                        status: ProcessingStatus::Completed,
                    },
                    ProcessOutcome::Failed { .. } => WorkerEvent::TaskCompleted {
                        document_id,
                        status: ProcessingStatus::Failed,
                    },
                    _ => WorkerEvent::TaskSkipped {
                        document_id,
                        outcome: outcome.clone(),
                    },
                };
                debug!(
                    subsystem = "jobs",
                    document_id = %document_id,
                    delivery_id = %delivery.delivery_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Delivery finished"
                );
                let _ = self.event_tx.send(event);
            }
            Err(e) => {
                let error = e.to_string();
                warn!(
                    subsystem = "jobs",
                    document_id = %document_id,
                    delivery_id = %delivery.delivery_id,
                    attempt = delivery.attempt,
                    error = %error,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Processing failed, returning delivery to the queue"
                );
                if let Err(nack_err) = self.queue.nack(delivery.delivery_id, &error).await {
                    error!(
                        subsystem = "jobs",
                        delivery_id = %delivery.delivery_id,
                        error = %nack_err,
                        "Failed to nack delivery"
                    );
                }
                let _ = self
                    .event_tx
                    .send(WorkerEvent::TaskFailed { document_id, error });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.extraction_timeout, Duration::from_secs(120));
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(1000)
            .with_max_concurrent(8)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.max_concurrent, 8);
        assert!(!config.enabled);
    }

    #[test]
    fn test_worker_event_clone() {
        let document_id = Uuid::new_v4();
        let event = WorkerEvent::TaskCompleted {
            document_id,
            status: ProcessingStatus::Completed,
        };
        assert_eq!(event.clone(), event);
        assert!(format!("{:?}", event).contains("TaskCompleted"));
    }
}
