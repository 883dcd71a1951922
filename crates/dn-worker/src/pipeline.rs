//! `WorkerPipeline`: the per-channel state machine driving one delivery
//! from a decoded message through to ack.
//!
//! `Decoded → IdempotencyCheck → Validating → Rendering → Sending →
//! Delivered / Failing → Retrying / DeadLettering`.
//!
//! The in-process delayed retry scheduled here (`tokio::time::sleep`
//! before republish) is fragile: a process restart between the ack and the
//! scheduled republish loses that retry. A sturdier design would use a
//! delayed-message exchange or a per-attempt queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dn_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig};
use dn_common::{DnError, EnqueuedMessage, FailedRecord, StatusRecord};
use dn_queue::{Delivery, MessageBus, PublishOptions};
use dn_status::StatusStore;
use tracing::{debug, error, info, warn};

use crate::adapter::ChannelAdapter;

pub type Result<T> = std::result::Result<T, DnError>;

#[derive(Debug, Clone)]
pub struct WorkerPipelineConfig {
    /// `MAX_ATTEMPTS`, default 5.
    pub max_attempts: u32,
    /// `STATUS_TTL_SECONDS`, default 86400.
    pub status_ttl: Duration,
}

impl Default for WorkerPipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            status_ttl: Duration::from_secs(86_400),
        }
    }
}

/// Plain attempt/delivered/dead-lettered counters per channel, exposed
/// through a lightweight `/metrics` text endpoint.
#[derive(Default)]
pub struct WorkerMetrics {
    pub send_attempts: AtomicU64,
    pub delivered: AtomicU64,
    pub dead_lettered: AtomicU64,
    pub decode_failed: AtomicU64,
    pub duplicates: AtomicU64,
}

pub struct WorkerPipeline<A: ChannelAdapter> {
    adapter: A,
    bus: Arc<dyn MessageBus>,
    status_store: Arc<dyn StatusStore>,
    breaker: CircuitBreaker,
    config: WorkerPipelineConfig,
    metrics: Arc<WorkerMetrics>,
}

impl<A: ChannelAdapter> WorkerPipeline<A> {
    pub fn new(
        adapter: A,
        bus: Arc<dyn MessageBus>,
        status_store: Arc<dyn StatusStore>,
        breaker_config: CircuitBreakerConfig,
        config: WorkerPipelineConfig,
    ) -> Self {
        let breaker_name = format!("{}-adapter", adapter.channel());
        Self {
            adapter,
            bus,
            status_store,
            breaker: CircuitBreaker::new(breaker_name, breaker_config),
            config,
            metrics: Arc::new(WorkerMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.metrics.clone()
    }

    pub fn breaker_state(&self) -> dn_breaker::CircuitState {
        self.breaker.state()
    }

    /// Drains this channel's queue until the bus closes the consumer.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let queue = format!("{}.queue", self.adapter.channel());
        let mut consumer = self.bus.consume(&queue).await?;
        info!(channel = %self.adapter.channel(), %queue, "worker pipeline started");

        while let Some(delivery) = consumer.next_delivery().await? {
            if let Err(e) = self.process_delivery(delivery).await {
                error!(error = %e, "unexpected error processing delivery");
            }
        }

        info!(channel = %self.adapter.channel(), "worker pipeline consumer closed");
        Ok(())
    }

    /// One full trip through the state machine for a single delivery.
    async fn process_delivery(&self, delivery: Delivery) -> Result<()> {
        let mut message: EnqueuedMessage = match serde_json::from_slice(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                // DecodeFailed: structurally invalid, no retry value.
                warn!(error = %e, "decode failed, dropping message");
                self.metrics.decode_failed.fetch_add(1, Ordering::Relaxed);
                return delivery.ack().await;
            }
        };
        message.ensure_notification_id();
        let notification_id = message.notification_id.clone().unwrap_or_default();
        let channel = self.adapter.channel();
        let key = format!("{channel}:idempotency:{}", message.request.request_id);

        match self.status_store.get(&key).await {
            Ok(Some(_existing)) => {
                debug!(request_id = %message.request.request_id, "duplicate delivery, ack without reprocessing");
                self.metrics.duplicates.fetch_add(1, Ordering::Relaxed);
                return delivery.ack().await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "status store unreachable during idempotency check");
                return self
                    .fail_and_route(message, delivery, &key, format!("status_store_unreachable: {e}"))
                    .await;
            }
        }

        // Status transition to `processing` must be durable before the
        // external send is issued, so a crash mid-send presents as
        // `processing`, not absent.
        if let Err(e) = self
            .status_store
            .put(&key, &StatusRecord::processing(&notification_id), self.config.status_ttl)
            .await
        {
            warn!(error = %e, "failed to write processing status");
            return self
                .fail_and_route(message, delivery, &key, format!("status_store_unreachable: {e}"))
                .await;
        }

        if let Err(validation_err) = self.adapter.validate(&message.request) {
            return self
                .fail_and_route(message, delivery, &key, validation_err.to_string())
                .await;
        }

        let body = self.adapter.render(&message.request);

        let request = message.request.clone();
        let send_result = self.breaker.fire(|| self.adapter.send(&request, &body)).await;
        self.metrics.send_attempts.fetch_add(1, Ordering::Relaxed);

        match send_result {
            Ok(()) => {
                if let Err(e) = self
                    .status_store
                    .put(&key, &StatusRecord::delivered(&notification_id), self.config.status_ttl)
                    .await
                {
                    warn!(error = %e, "failed to write delivered status");
                }
                self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
                delivery.ack().await
            }
            Err(breaker_err) => {
                let error_message = match breaker_err {
                    BreakerError::Open => "breaker_open".to_string(),
                    BreakerError::Timeout => "send_timeout".to_string(),
                    BreakerError::Inner(msg) => msg,
                };
                self.fail_and_route(message, delivery, &key, error_message).await
            }
        }
    }

    /// Shared `Failing` entry point: increments `attempts` and routes to
    /// `Retrying` or `DeadLettering` depending on `MAX_ATTEMPTS`.
    async fn fail_and_route(
        &self,
        mut message: EnqueuedMessage,
        delivery: Delivery,
        key: &str,
        error: String,
    ) -> Result<()> {
        message.attempts += 1;
        let notification_id = message.notification_id.clone().unwrap_or_default();

        if message.attempts >= self.config.max_attempts {
            self.dead_letter(message, delivery, key, notification_id, error).await
        } else {
            self.retry(message, delivery).await
        }
    }

    /// `DeadLettering`: the dead-letter publish runs before the StatusStore
    /// write, and both run before the ack. If the publish itself fails
    /// (broker down), the delivery is still acked, since this worker never
    /// crashes on a per-message error, accepting that this specific
    /// message's failure record is lost rather than looping forever on an
    /// already-exhausted delivery.
    async fn dead_letter(
        &self,
        message: EnqueuedMessage,
        delivery: Delivery,
        key: &str,
        notification_id: String,
        error: String,
    ) -> Result<()> {
        let failed_record = FailedRecord {
            message,
            error: error.clone(),
            failed_at: Utc::now(),
            notification_id: notification_id.clone(),
        };

        match serde_json::to_vec(&failed_record) {
            Ok(payload) => {
                if let Err(e) = self.bus.publish("failed", payload, PublishOptions::default()).await {
                    error!(error = %e, notification_id, "dead-letter publish failed");
                }
            }
            Err(e) => error!(error = %e, "failed to encode dead-letter record"),
        }

        if let Err(e) = self
            .status_store
            .put(key, &StatusRecord::failed(&notification_id, &error), self.config.status_ttl)
            .await
        {
            warn!(error = %e, "failed to write failed status after dead-letter");
        }

        self.metrics.dead_lettered.fetch_add(1, Ordering::Relaxed);
        delivery.ack().await
    }

    /// `Retrying`: the republish scheduler is started before the ack; the
    /// ack of the original delivery happens immediately to free the broker
    /// slot. The retried message is a new delivery under the same
    /// `request_id`.
    async fn retry(&self, message: EnqueuedMessage, delivery: Delivery) -> Result<()> {
        let delay_ms = 2000u64.saturating_mul(1u64 << (message.attempts - 1).min(32));
        let routing_key = self.adapter.channel().to_string();
        let bus = self.bus.clone();

        match serde_json::to_vec(&message) {
            Ok(payload) => {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    if let Err(e) = bus.publish(&routing_key, payload, PublishOptions::default()).await {
                        error!(error = %e, "retry republish failed");
                    }
                });
            }
            Err(e) => error!(error = %e, "failed to encode retry payload"),
        }

        delivery.ack().await
    }
}
