//! Shared domain types for the notification delivery platform.
//!
//! Every wire type that crosses a process boundary (HTTP payload, bus
//! message, status-store value) lives here so the gateway and the channel
//! workers agree on one vocabulary.

pub mod logging;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Scalar/opaque bag used for `variables` and `metadata`. Schema-less at
/// the boundary, validated on access by the channel adapter that actually
/// needs a field out of it.
pub type Scalars = HashMap<String, serde_json::Value>;

/// Delivery channel. Serializes lowercase to match the wire vocabulary
/// (`"email"` / `"push"`) used as both JSON field and AMQP routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Push,
}

impl Channel {
    /// Routing key / queue name fragment for this channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Push => "push",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Channel::Email),
            "push" => Some(Channel::Push),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical inbound entity submitted to `POST /api/v1/notifications/`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationRequest {
    pub notification_type: Channel,
    pub user_id: String,
    pub template_code: String,
    #[serde(default)]
    pub variables: Scalars,
    pub request_id: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub metadata: Scalars,
}

/// Bus payload: a `NotificationRequest` plus the fields a worker maintains
/// across delivery attempts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnqueuedMessage {
    #[serde(flatten)]
    pub request: NotificationRequest,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub notification_id: Option<String>,
    /// Server-generated id distinct from `notification_id`, propagated
    /// through tracing spans for cross-service log correlation. Purely
    /// observability; does not affect routing or idempotency.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl EnqueuedMessage {
    pub fn new(request: NotificationRequest) -> Self {
        Self {
            request,
            created_at: Utc::now(),
            attempts: 0,
            notification_id: None,
            correlation_id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Ensure `notification_id` is set, generating one on first worker
    /// touch if the gateway didn't stamp one.
    pub fn ensure_notification_id(&mut self) -> &str {
        if self.notification_id.is_none() {
            self.notification_id = Some(uuid::Uuid::new_v4().to_string());
        }
        self.notification_id.as_deref().unwrap()
    }
}

/// Lifecycle status of a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Processing,
    Delivered,
    Failed,
}

/// StatusStore value, keyed `<channel>:idempotency:<request_id>` (worker)
/// or `idemp:<request_id>` (gateway admission) or `status:<notification_id>`
/// (external callback ingestion).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusRecord {
    pub notification_id: String,
    pub status: Status,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    /// Timestamp of the last write, so a status read can report recency
    /// even while the record is still `pending`/`processing`.
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn pending(notification_id: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
            status: Status::Pending,
            sent_at: None,
            error: None,
            failed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn processing(notification_id: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
            status: Status::Processing,
            sent_at: None,
            error: None,
            failed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn delivered(notification_id: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
            status: Status::Delivered,
            sent_at: Some(Utc::now()),
            error: None,
            failed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn failed(notification_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
            status: Status::Failed,
            sent_at: None,
            error: Some(error.into()),
            failed_at: Some(Utc::now()),
            updated_at: Utc::now(),
        }
    }
}

/// Dead-letter payload published to the `failed` routing key once
/// `MAX_ATTEMPTS` is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FailedRecord {
    #[serde(flatten)]
    pub message: EnqueuedMessage,
    pub error: String,
    pub failed_at: DateTime<Utc>,
    pub notification_id: String,
}

/// Shared error taxonomy. Every fallible operation in this workspace
/// resolves to one of these variants; callers classify on the variant,
/// not on string matching.
#[derive(Debug, Error)]
pub enum DnError {
    /// Malformed JSON, schema validation failure, unknown channel. Not
    /// retried: ingress returns 400, the worker acks and drops.
    #[error("structural error: {0}")]
    Structural(String),

    /// Authentication failure. Never reaches the worker.
    #[error("auth error: {0}")]
    Auth(String),

    /// Missing or malformed recipient (e.g. empty email, short push token).
    /// Treated as a delivery error: subject to retry/dead-letter.
    #[error("recipient error: {0}")]
    Recipient(String),

    /// Timeout, connection failure, breaker-open, 5xx from the backend.
    /// Delivery error: retried with backoff up to MAX_ATTEMPTS.
    #[error("backend transient error: {0}")]
    BackendTransient(String),

    /// Status store or message bus unreachable. 500 at ingress; delivery
    /// error (retry ladder) at the worker.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

pub type Result<T> = std::result::Result<T, DnError>;

/// Pagination block of the uniform HTTP envelope. Every endpoint in this
/// system returns a single logical resource, so this is always the
/// degenerate single-page form, carried for wire compatibility with the
/// envelope schema rather than because pagination is meaningful here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Meta {
    pub total: u64,
    pub limit: u64,
    pub page: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            total: 1,
            limit: 1,
            page: 1,
            total_pages: 1,
            has_next: false,
            has_previous: false,
        }
    }
}

/// Uniform HTTP response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    pub meta: Meta,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: message.into(),
            meta: Meta::default(),
        }
    }

    pub fn err(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: message.into(),
            meta: Meta::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trips_lowercase() {
        assert_eq!(serde_json::to_string(&Channel::Email).unwrap(), "\"email\"");
        assert_eq!(serde_json::to_string(&Channel::Push).unwrap(), "\"push\"");
        assert_eq!(Channel::parse("email"), Some(Channel::Email));
        assert_eq!(Channel::parse("sms"), None);
    }

    #[test]
    fn envelope_ok_has_single_page_meta() {
        let env = Envelope::ok("accepted", serde_json::json!({"request_id": "r1"}));
        assert!(env.success);
        assert_eq!(env.meta.total, 1);
        assert_eq!(env.meta.page, 1);
        assert!(!env.meta.has_next);
    }

    #[test]
    fn envelope_err_has_no_data() {
        let env: Envelope<()> = Envelope::err("invalid", "missing field");
        assert!(!env.success);
        assert!(env.data.is_none());
        assert_eq!(env.error.as_deref(), Some("missing field"));
    }

    #[test]
    fn enqueued_message_generates_notification_id_once() {
        let req = NotificationRequest {
            notification_type: Channel::Email,
            user_id: "u1".into(),
            template_code: "welcome_v1".into(),
            variables: Scalars::new(),
            request_id: "r1".into(),
            priority: 0,
            metadata: Scalars::new(),
        };
        let mut msg = EnqueuedMessage::new(req);
        assert!(msg.notification_id.is_none());
        let id = msg.ensure_notification_id().to_string();
        assert_eq!(msg.notification_id.as_deref(), Some(id.as_str()));
        // Calling again must not change the id.
        let id2 = msg.ensure_notification_id();
        assert_eq!(id, id2);
    }

    #[test]
    fn enqueued_message_flattens_request_fields() {
        let req = NotificationRequest {
            notification_type: Channel::Push,
            user_id: "u1".into(),
            template_code: "t1".into(),
            variables: Scalars::new(),
            request_id: "r1".into(),
            priority: 5,
            metadata: Scalars::new(),
        };
        let msg = EnqueuedMessage::new(req);
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["request_id"], "r1");
        assert_eq!(v["notification_type"], "push");
        assert_eq!(v["attempts"], 0);
    }
}
