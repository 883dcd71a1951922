//! StatusAPI, health, and metrics endpoints mounted into each worker binary.
//!
//! State is a plain struct injected via axum `State`, built with one
//! `Router::new()...with_state` call. Three routes: `/health`, `/metrics`
//! as plain text, and `/status/:request_id` backed by the worker's own
//! `StatusStore`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dn_common::{Channel, Envelope};
use dn_status::StatusStore;
use tracing::warn;

use crate::pipeline::WorkerMetrics;

#[derive(Clone)]
pub struct AppState {
    pub status_store: Arc<dyn StatusStore>,
    pub metrics: Arc<WorkerMetrics>,
    pub channel: Channel,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status/{request_id}", get(status_handler))
        .with_state(state)
}

/// Liveness only: process is up and able to respond. Does not probe the
/// bus or status store; a worker that can't reach either still answers
/// here, and is visible instead through `/metrics` counters.
async fn health_handler() -> Json<Envelope<&'static str>> {
    Json(Envelope::ok("up", "UP"))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    use std::sync::atomic::Ordering;

    let m = &state.metrics;
    let channel = state.channel;
    let body = format!(
        "# HELP dn_worker_send_attempts_total Total adapter send attempts\n\
         # TYPE dn_worker_send_attempts_total counter\n\
         dn_worker_send_attempts_total{{channel=\"{channel}\"}} {}\n\
         # HELP dn_worker_delivered_total Messages delivered successfully\n\
         # TYPE dn_worker_delivered_total counter\n\
         dn_worker_delivered_total{{channel=\"{channel}\"}} {}\n\
         # HELP dn_worker_dead_lettered_total Messages dead-lettered after MAX_ATTEMPTS\n\
         # TYPE dn_worker_dead_lettered_total counter\n\
         dn_worker_dead_lettered_total{{channel=\"{channel}\"}} {}\n\
         # HELP dn_worker_decode_failed_total Structurally invalid deliveries dropped\n\
         # TYPE dn_worker_decode_failed_total counter\n\
         dn_worker_decode_failed_total{{channel=\"{channel}\"}} {}\n\
         # HELP dn_worker_duplicates_total Duplicate deliveries acked without reprocessing\n\
         # TYPE dn_worker_duplicates_total counter\n\
         dn_worker_duplicates_total{{channel=\"{channel}\"}} {}\n",
        m.send_attempts.load(Ordering::Relaxed),
        m.delivered.load(Ordering::Relaxed),
        m.dead_lettered.load(Ordering::Relaxed),
        m.decode_failed.load(Ordering::Relaxed),
        m.duplicates.load(Ordering::Relaxed),
    );

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// `GET /status/:request_id`: returns the StatusStore record for
/// `<channel>:idempotency:<request_id>`; 404 with a uniform envelope if
/// absent.
async fn status_handler(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Response {
    let key = format!("{}:idempotency:{request_id}", state.channel);

    match state.status_store.get(&key).await {
        Ok(Some(record)) => (StatusCode::OK, Json(Envelope::ok("ok", record))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(Envelope::<()>::err("not found", "no status for request_id")),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, request_id, "status store unreachable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Envelope::<()>::err("internal error", e.to_string())),
            )
                .into_response()
        }
    }
}
