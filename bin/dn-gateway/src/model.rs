//! Request bodies for the gateway's three write endpoints.
//!
//! Plain request/response structs. `NotificationRequest` already covers
//! `POST /api/v1/notifications/` (dn-common is shared with the workers),
//! so only the two endpoints with no existing domain type get one here.

use dn_common::Scalars;
use serde::Deserialize;

/// Body of `POST /api/v1/users/`. `user_id` is the one field every other
/// record in this system keys user data by (`NotificationRequest`,
/// `StatusRecord` lookups), so it's the only field this gateway inspects.
/// Everything else rides through opaquely via `#[serde(flatten)]` onto the
/// `user.created` event, the same schema-less-payload treatment
/// `NotificationRequest.metadata`/`.variables` already give arbitrary
/// caller-supplied data.
#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub user_id: String,
    #[serde(flatten)]
    pub attributes: Scalars,
}

/// Body of `POST /api/v1/:channel/status/`: an external callback
/// reporting terminal delivery state back into the shared status store.
/// `status` is restricted to the subset of `Status` an outside caller can
/// meaningfully assert; `processing` is worker-internal.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusIngestionRequest {
    pub notification_id: String,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}
