//! Integration tests for `WorkerPipeline` against the in-memory bus and
//! status store: push token missing, backend transient-failure-then-success,
//! and duplicate delivery acked without a second send. Breaker-opens-under-
//! sustained-timeouts behavior is covered at the `dn-breaker` unit level
//! (`opens_after_error_rate_crosses_threshold`, `timeout_counts_as_failure`)
//! rather than re-driven through the full retry ladder here, since doing so
//! would mean either a real multi-minute wait across ten backoff delays or
//! a fragile paused-clock choreography across a spawned retry task. The
//! breaker's own behavior is independent of the pipeline around it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dn_breaker::CircuitBreakerConfig;
use dn_common::{Channel, EnqueuedMessage, NotificationRequest, Scalars, Status};
use dn_queue::{InMemoryBus, MessageBus, PublishOptions};
use dn_status::{InMemoryStatusStore, StatusStore};
use dn_worker::{ChannelAdapter, PushAdapter, RenderedBody, ValidationError, WorkerPipeline, WorkerPipelineConfig};
use parking_lot::Mutex;

/// Adapter whose `send` replays a scripted sequence of outcomes, falling
/// back to success once the script is exhausted. `calls` is a shared handle
/// so the test can observe invocation count after the adapter has been
/// moved into the pipeline.
struct ScriptedAdapter {
    channel: Channel,
    outcomes: Mutex<VecDeque<Result<(), String>>>,
    calls: Arc<AtomicU32>,
}

impl ScriptedAdapter {
    fn new(channel: Channel, outcomes: Vec<Result<(), String>>, calls: Arc<AtomicU32>) -> Self {
        Self {
            channel,
            outcomes: Mutex::new(outcomes.into()),
            calls,
        }
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn validate(&self, _request: &NotificationRequest) -> Result<(), ValidationError> {
        Ok(())
    }

    fn render(&self, _request: &NotificationRequest) -> RenderedBody {
        RenderedBody::Email {
            subject: "s".to_string(),
            html: "h".to_string(),
            text: "t".to_string(),
        }
    }

    async fn send(&self, _request: &NotificationRequest, _body: &RenderedBody) -> Result<(), String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes.lock().pop_front().unwrap_or(Ok(()))
    }
}

fn email_request(request_id: &str) -> NotificationRequest {
    let mut metadata = Scalars::new();
    metadata.insert("email".to_string(), serde_json::json!("a@x"));
    NotificationRequest {
        notification_type: Channel::Email,
        user_id: "u1".to_string(),
        template_code: "welcome_v1".to_string(),
        variables: Scalars::new(),
        request_id: request_id.to_string(),
        priority: 0,
        metadata,
    }
}

fn push_request_without_token(request_id: &str) -> NotificationRequest {
    NotificationRequest {
        notification_type: Channel::Push,
        user_id: "u1".to_string(),
        template_code: "welcome_v1".to_string(),
        variables: Scalars::new(),
        request_id: request_id.to_string(),
        priority: 0,
        metadata: Scalars::new(),
    }
}

async fn publish(bus: &InMemoryBus, channel: Channel, request: NotificationRequest) {
    let message = EnqueuedMessage::new(request);
    let payload = serde_json::to_vec(&message).unwrap();
    bus.publish(channel.as_str(), payload, PublishOptions::default())
        .await
        .unwrap();
}

async fn poll_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..50 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition did not become true within the poll budget");
}

#[tokio::test]
async fn transient_failure_then_success_ends_delivered_with_two_sends() {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let status_store: Arc<dyn StatusStore> = Arc::new(InMemoryStatusStore::new());
    let calls = Arc::new(AtomicU32::new(0));
    let adapter = ScriptedAdapter::new(
        Channel::Email,
        vec![Err("smtp timeout".to_string()), Ok(())],
        calls.clone(),
    );

    publish(&bus, Channel::Email, email_request("r1")).await;

    let pipeline = Arc::new(WorkerPipeline::new(
        adapter,
        bus.clone(),
        status_store.clone(),
        CircuitBreakerConfig::default(),
        WorkerPipelineConfig::default(),
    ));
    tokio::spawn(pipeline.clone().run());

    poll_until(|| calls.load(Ordering::SeqCst) >= 2).await;

    let record = status_store
        .get("email:idempotency:r1")
        .await
        .unwrap()
        .expect("status record present after delivery");
    assert_eq!(record.status, Status::Delivered);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn push_token_missing_dead_letters_with_reduced_attempt_budget() {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let status_store: Arc<dyn StatusStore> = Arc::new(InMemoryStatusStore::new());
    let adapter = PushAdapter::new(
        "https://push.example.com",
        "proj",
        "svc@proj.iam.gserviceaccount.com",
        "",
    );

    publish(&bus, Channel::Push, push_request_without_token("r2")).await;

    // MAX_ATTEMPTS reduced to 1 so the dead-letter path is reached on the
    // first delivery instead of waiting out the real retry backoff.
    let config = WorkerPipelineConfig {
        max_attempts: 1,
        ..WorkerPipelineConfig::default()
    };
    let pipeline = Arc::new(WorkerPipeline::new(
        adapter,
        bus.clone(),
        status_store.clone(),
        CircuitBreakerConfig::default(),
        config,
    ));
    tokio::spawn(pipeline.clone().run());

    let mut failed_consumer = bus.consume("failed.queue").await.unwrap();
    let delivery = failed_consumer.next_delivery().await.unwrap().unwrap();
    let failed_record: dn_common::FailedRecord = serde_json::from_slice(&delivery.payload).unwrap();
    delivery.ack().await.unwrap();

    assert!(failed_record.error.contains("push_token_missing"));

    let record = status_store
        .get("push:idempotency:r2")
        .await
        .unwrap()
        .expect("status record present after dead-letter");
    assert_eq!(record.status, Status::Failed);
}

#[tokio::test]
async fn duplicate_delivery_is_acked_without_a_second_send() {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let status_store: Arc<dyn StatusStore> = Arc::new(InMemoryStatusStore::new());
    let calls = Arc::new(AtomicU32::new(0));
    let adapter = ScriptedAdapter::new(Channel::Email, vec![Ok(())], calls.clone());

    publish(&bus, Channel::Email, email_request("r3")).await;
    publish(&bus, Channel::Email, email_request("r3")).await;

    let pipeline = Arc::new(WorkerPipeline::new(
        adapter,
        bus.clone(),
        status_store.clone(),
        CircuitBreakerConfig::default(),
        WorkerPipelineConfig::default(),
    ));
    tokio::spawn(pipeline.clone().run());

    poll_until(|| pipeline.metrics().duplicates.load(Ordering::Relaxed) >= 1).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let record = status_store
        .get("email:idempotency:r3")
        .await
        .unwrap()
        .expect("status record present");
    assert_eq!(record.status, Status::Delivered);
}
