//! SMTP email adapter.
//!
//! Grounded in the `DaniilShunto-Code2` smtp-mailer worker pattern
//! (`lettre::AsyncTransport`, ack/requeue decision based on SMTP error
//! classification) for the adapter shape, reshaped to this spec's exact
//! fields: `to`, `subject` defaulting from `metadata.subject` or a fixed
//! fallback, `html` from the renderer, `text` derived by stripping tags
//! from `html`.

use async_trait::async_trait;
use dn_common::NotificationRequest;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::adapter::{strip_tags, ChannelAdapter, RenderedBody, ValidationError};
use dn_common::Channel;

const DEFAULT_SUBJECT: &str = "Notification";

pub struct EmailAdapter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailAdapter {
    pub fn new(
        host: &str,
        port: u16,
        user: &str,
        pass: &str,
        email_from: &str,
    ) -> Result<Self, String> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| format!("smtp relay config: {e}"))?
            .port(port);

        if !user.is_empty() {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        let from = email_from
            .parse::<Mailbox>()
            .map_err(|e| format!("invalid EMAIL_FROM: {e}"))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn subject_for(request: &NotificationRequest) -> String {
        request
            .metadata
            .get("subject")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string())
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn validate(&self, request: &NotificationRequest) -> Result<(), ValidationError> {
        let email = request
            .metadata
            .get("email")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if email.trim().is_empty() {
            return Err(ValidationError("email_missing".to_string()));
        }
        Ok(())
    }

    fn render(&self, request: &NotificationRequest) -> RenderedBody {
        let html = dn_render::render(&request.template_code, &request.variables);
        let text = strip_tags(&html);
        RenderedBody::Email {
            subject: Self::subject_for(request),
            html,
            text,
        }
    }

    async fn send(&self, request: &NotificationRequest, body: &RenderedBody) -> Result<(), String> {
        let RenderedBody::Email { subject, html, text } = body else {
            return Err("email adapter received non-email body".to_string());
        };

        let to_raw = request
            .metadata
            .get("email")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "email_missing".to_string())?;
        let to: Mailbox = to_raw.parse().map_err(|e| format!("invalid recipient: {e}"))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            )
            .map_err(|e| format!("message build failed: {e}"))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| format!("smtp send failed: {e}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dn_common::{Channel as DnChannel, Scalars};

    fn request_with_email(email: Option<&str>) -> NotificationRequest {
        let mut metadata = Scalars::new();
        if let Some(email) = email {
            metadata.insert("email".to_string(), serde_json::json!(email));
        }
        NotificationRequest {
            notification_type: DnChannel::Email,
            user_id: "u1".to_string(),
            template_code: "welcome_v1".to_string(),
            variables: Scalars::new(),
            request_id: "r1".to_string(),
            priority: 0,
            metadata,
        }
    }

    #[test]
    fn subject_falls_back_when_missing() {
        let request = request_with_email(Some("a@x.com"));
        assert_eq!(EmailAdapter::subject_for(&request), DEFAULT_SUBJECT);
    }

    #[test]
    fn subject_uses_metadata_when_present() {
        let mut request = request_with_email(Some("a@x.com"));
        request
            .metadata
            .insert("subject".to_string(), serde_json::json!("Custom"));
        assert_eq!(EmailAdapter::subject_for(&request), "Custom");
    }
}
