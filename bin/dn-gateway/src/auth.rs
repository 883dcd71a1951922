//! Shared-secret authentication for the ingress gateway.
//!
//! A static `API_KEY` checked against the `x-api-key` header on every
//! request except `/health`.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dn_common::Envelope;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::warn;

const API_KEY_HEADER: &str = "x-api-key";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AuthState {
    pub api_key: String,
}

pub async fn require_api_key(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| HeaderValue::to_str(v).ok());

    match provided {
        Some(key) if secrets_match(&auth.api_key, key) => next.run(request).await,
        _ => {
            warn!(
                key_fingerprint = %fingerprint(provided),
                "rejected request with missing or invalid x-api-key"
            );
            (
                StatusCode::UNAUTHORIZED,
                Json(Envelope::<()>::err("unauthorized", "missing or invalid x-api-key")),
            )
                .into_response()
        }
    }
}

/// Compares `expected` against caller-supplied `provided` without leaking
/// timing information derived from *where* the two strings first differ.
/// Keys both sides under a random per-process nonce and compares the
/// resulting MAC tags via `Mac::verify_slice`, which runs in constant time,
/// unlike a naive `==` on the raw secret that would short-circuit on the
/// first mismatched byte.
fn secrets_match(expected: &str, provided: &str) -> bool {
    let nonce: [u8; 32] = rand::random();

    let Ok(mut reference) = HmacSha256::new_from_slice(&nonce) else {
        return false;
    };
    reference.update(expected.as_bytes());
    let reference_tag = reference.finalize().into_bytes();

    let Ok(mut candidate) = HmacSha256::new_from_slice(&nonce) else {
        return false;
    };
    candidate.update(provided.as_bytes());
    candidate.verify_slice(&reference_tag[..]).is_ok()
}

/// Short, non-reversible fingerprint of a rejected key for log
/// correlation. Lets an operator tell "same bad key retried" from
/// "different bad key" apart without ever logging the header value itself.
fn fingerprint(provided: Option<&str>) -> String {
    match provided {
        Some(key) => hex::encode(&Sha256::digest(key.as_bytes())[..4]),
        None => "none".to_string(),
    }
}

fn is_public_path(path: &str) -> bool {
    matches!(path, "/health")
}
