//! `ChannelAdapter`: the seam between the channel-agnostic `WorkerPipeline`
//! and a concrete delivery backend (SMTP, mobile push). Validation and
//! rendering are synchronous and infallible-by-contract except for the
//! explicit `ValidationError` path; `send` is the only network I/O and is
//! always invoked through the pipeline's circuit breaker.

use async_trait::async_trait;
use dn_common::{Channel, NotificationRequest};

/// Recipient validation failed. Carries a stable error code so the
/// dead-letter record and status read are greppable.
#[derive(Debug, Clone)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValidationError {}

/// The rendered, channel-specific body ready to hand to `send`.
#[derive(Debug, Clone)]
pub enum RenderedBody {
    Email {
        subject: String,
        html: String,
        text: String,
    },
    Push {
        payload: serde_json::Value,
    },
}

/// Channel-specific behavior plugged into `WorkerPipeline`.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> Channel;

    /// Validate the recipient fields in `request.metadata`: email requires
    /// non-empty `metadata.email`; push requires `metadata.push_token` of
    /// length >= 10.
    fn validate(&self, request: &NotificationRequest) -> Result<(), ValidationError>;

    /// Compute the rendered body from `template_code`/`variables`.
    fn render(&self, request: &NotificationRequest) -> RenderedBody;

    /// Send the rendered body to the backend. Any error here is a delivery
    /// error: the pipeline always invokes this through a `CircuitBreaker`.
    async fn send(
        &self,
        request: &NotificationRequest,
        body: &RenderedBody,
    ) -> Result<(), String>;
}

/// Strip HTML tags for the plain-text alternative of an email body: the
/// text part is derived by stripping tags from the html part.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_removes_markup_and_collapses_whitespace() {
        let html = "<p>Hello <b>Ada</b>!</p>\n<a href=\"x\">link</a>";
        assert_eq!(strip_tags(html), "Hello Ada! link");
    }
}
