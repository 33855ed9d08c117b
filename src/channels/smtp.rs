//! SMTP transport via lettre, for deployments relaying through their own server.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use super::{MailTransport, OutboundEmail};
use crate::config::SmtpConfig;
use crate::error::ChannelError;

pub struct SmtpMailTransport {
    transport: SmtpTransport,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, ChannelError> {
        let mut builder = SmtpTransport::relay(&config.host)
            .map_err(|e| send_failed(format!("SMTP relay error: {e}")))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "smtp".into(),
        reason,
    }
}

/// Build an HTML message. Addresses may carry a display name.
fn build_message(email: &OutboundEmail) -> Result<Message, ChannelError> {
    Message::builder()
        .from(
            email
                .from
                .parse()
                .map_err(|_| ChannelError::InvalidAddress(email.from.clone()))?,
        )
        .to(email
            .to
            .parse()
            .map_err(|_| ChannelError::InvalidAddress(email.to.clone()))?)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_HTML)
        .body(email.html.clone())
        .map_err(|e| send_failed(format!("Failed to build email: {e}")))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn deliver(&self, email: &OutboundEmail) -> Result<(), ChannelError> {
        let message = build_message(email)?;
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| send_failed(format!("SMTP task failed: {e}")))?
            .map_err(|e| send_failed(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}
