use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use courier_core::{OutboxMessage, DEFAULT_MAX_RETRIES};
use courier_db::{ClaimRequest, DbError, OutboxStore};

use crate::sink::MessageSink;

/// Error type for worker iterations.
#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Outbox storage error: {0}")]
    Storage(#[from] DbError),
}

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Claim token written to `claimed_by`. Unique per worker.
    pub worker_id: String,
    pub batch_size: u32,
    /// Sleep after an empty batch.
    pub poll_interval: Duration,
    /// Sleep after a non-empty batch.
    pub busy_interval: Duration,
    /// Sleep after a failed iteration.
    pub error_backoff: Duration,
    pub max_retries: u32,
    /// How long a claim stays valid before other workers may take the row.
    pub claim_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            busy_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(10),
            max_retries: DEFAULT_MAX_RETRIES,
            claim_ttl: Duration::from_secs(300),
        }
    }
}

/// Result of one claim-and-deliver pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.claimed == 0
    }
}

/// Running totals since the worker was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTotals {
    pub sent: u64,
    pub failed: u64,
}

/// Stops a running worker. Cloneable and safe to call more than once.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl WorkerHandle {
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

/// Polls the outbox and hands claimed messages to a sink.
pub struct OutboxWorker<S: MessageSink> {
    store: OutboxStore,
    sink: Arc<S>,
    config: WorkerConfig,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
    sent_total: AtomicU64,
    failed_total: AtomicU64,
}

impl<S: MessageSink> OutboxWorker<S> {
    pub fn new(store: OutboxStore, sink: Arc<S>, config: WorkerConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            store,
            sink,
            config,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            sent_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            stop: self.stop_tx.clone(),
        }
    }

    pub fn totals(&self) -> WorkerTotals {
        WorkerTotals {
            sent: self.sent_total.load(Ordering::Relaxed),
            failed: self.failed_total.load(Ordering::Relaxed),
        }
    }

    /// Run until stopped. A batch in flight always completes; sleeps end
    /// as soon as `stop()` is called.
    pub async fn run(&self) {
        let mut stop_rx = self.stop_rx.clone();
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "Outbox worker started"
        );

        while !*stop_rx.borrow() {
            let pause = match self.process_batch().await {
                Ok(outcome) if outcome.is_empty() => {
                    debug!("No pending outbox messages");
                    self.config.poll_interval
                }
                Ok(outcome) => {
                    let totals = self.totals();
                    info!(
                        sent = outcome.sent,
                        failed = outcome.failed,
                        total_sent = totals.sent,
                        total_failed = totals.failed,
                        "Processed outbox batch"
                    );
                    self.config.busy_interval
                }
                Err(e) => {
                    error!("Outbox worker iteration failed: {}", e);
                    self.config.error_backoff
                }
            };

            if sleep_or_stop(&mut stop_rx, pause).await {
                break;
            }
        }

        let totals = self.totals();
        info!(
            worker_id = %self.config.worker_id,
            total_sent = totals.sent,
            total_failed = totals.failed,
            "Outbox worker stopped"
        );
    }

    /// Claim one batch and deliver it.
    pub async fn process_batch(&self) -> Result<BatchOutcome, OutboxError> {
        let lease = chrono::Duration::from_std(self.config.claim_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let request = ClaimRequest {
            worker_id: &self.config.worker_id,
            batch_size: self.config.batch_size,
            max_retries: self.config.max_retries,
            lease,
        };

        let messages = self.store.claim_batch(&request).await?;
        let mut outcome = BatchOutcome {
            claimed: messages.len(),
            ..BatchOutcome::default()
        };

        let mut result = Ok(());
        for message in &messages {
            match self.deliver(message).await {
                Ok(true) => outcome.sent += 1,
                Ok(false) => outcome.failed += 1,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.sent_total
            .fetch_add(outcome.sent as u64, Ordering::Relaxed);
        self.failed_total
            .fetch_add(outcome.failed as u64, Ordering::Relaxed);

        if let Err(e) = result {
            // Hand the rest of the batch back instead of waiting out the lease.
            match self.store.release_claims(&self.config.worker_id).await {
                Ok(released) => debug!(released, "Released unprocessed outbox claims"),
                Err(release_err) => {
                    warn!("Failed to release outbox claims: {}", release_err)
                }
            }
            return Err(e);
        }
        Ok(outcome)
    }

    /// Send one claimed message and record the outcome. Returns true if it
    /// was delivered.
    async fn deliver(&self, message: &OutboxMessage) -> Result<bool, OutboxError> {
        let worker_id = self.config.worker_id.as_str();
        let attempt = message.retry_count + 1;

        let recorded = match self.sink.send(&message.topic, &message.payload).await {
            Ok(true) => {
                if self.store.mark_sent(message.id, worker_id).await? {
                    return Ok(true);
                }
                false
            }
            Ok(false) => {
                warn!(
                    message_id = %message.id,
                    attempt,
                    "Sink declined outbox message"
                );
                self.store.record_failure(message.id, worker_id, None).await?
            }
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    attempt,
                    "Failed to deliver outbox message: {}",
                    e
                );
                let reason = e.to_string();
                self.store
                    .record_failure(message.id, worker_id, Some(&reason))
                    .await?
            }
        };

        if !recorded {
            warn!(message_id = %message.id, "Claim on outbox message was lost");
        }
        Ok(false)
    }
}

/// Sleep for `duration` unless stopped first. Returns true if stopped.
async fn sleep_or_stop(stop_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = stop_rx.wait_for(|stopped| *stopped) => true,
    }
}
