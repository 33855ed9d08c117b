//! Outbound mail: transports, reply formatting and HTML templates.

pub mod email_types;
pub mod mailer;
pub mod mailgun;
pub mod smtp;
pub mod templates;

pub use mailer::{Mailer, OriginalMessage, SendOutcome};
pub use mailgun::MailgunTransport;
pub use smtp::SmtpMailTransport;
pub use templates::Templates;

use async_trait::async_trait;

use crate::error::ChannelError;

/// A fully formatted outbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Delivers formatted email. Pure I/O: no loop protection, no retries.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Transport name for logs and errors (e.g. "mailgun", "smtp").
    fn name(&self) -> &str;

    async fn deliver(&self, email: &OutboundEmail) -> Result<(), ChannelError>;
}
