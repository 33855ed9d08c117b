//! Reply formatting and loop protection in front of a [`MailTransport`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::email_types::{
    extract_address, html_escape, is_relay_address, normalize_newlines, reply_subject,
};
use super::{MailTransport, OutboundEmail};
use crate::error::ChannelError;
use crate::store::QuestionStage;

/// Whether a message actually left through the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Destination was on the relay domain; nothing was sent.
    Refused,
}

/// The message being replied to, quoted under the reply.
#[derive(Debug, Clone)]
pub struct OriginalMessage<'a> {
    pub subject: &'a str,
    pub body_plain: &'a str,
    /// `from` header of the original, used in the "wrote:" line.
    pub sender: &'a str,
    pub received_at: DateTime<Utc>,
}

impl<'a> OriginalMessage<'a> {
    pub fn from_question(question: &'a QuestionStage) -> Self {
        Self {
            subject: question.subject(),
            body_plain: question.body_plain(),
            sender: &question.sender,
            received_at: question.received_at,
        }
    }

    /// `On <date> <sender> wrote:` followed by every original line, `> `-prefixed.
    pub fn quote_html(&self) -> String {
        let header = self
            .received_at
            .format("<br />On %a, %b %d, %Y at %H:%M %p ")
            .to_string();
        let quoted = normalize_newlines(self.body_plain)
            .split('\n')
            .map(|line| format!("&gt; {}", html_escape(line)))
            .collect::<Vec<_>>()
            .join("<br />");
        format!("{header}{} wrote:<br />{quoted}", html_escape(self.sender))
    }
}

/// Sends formatted mail and refuses to mail the relay's own domain.
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    relay_domain: String,
}

impl Mailer {
    pub fn new(transport: Arc<dyn MailTransport>, relay_domain: impl Into<String>) -> Self {
        Self {
            transport,
            relay_domain: relay_domain.into(),
        }
    }

    pub fn relay_domain(&self) -> &str {
        &self.relay_domain
    }

    /// Send one message. Transport errors are returned, never retried.
    pub async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<SendOutcome, ChannelError> {
        let address = extract_address(to).unwrap_or_else(|| to.to_string());
        if is_relay_address(&address, &self.relay_domain) {
            warn!(to, domain = %self.relay_domain, "Refusing to send email to relay domain");
            return Ok(SendOutcome::Refused);
        }

        let email = OutboundEmail {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        };
        self.transport.deliver(&email).await?;
        info!(to, transport = self.transport.name(), "Email sent");
        Ok(SendOutcome::Sent)
    }

    /// Reply to `original`: the reply text, then the quoted original, under a `Re:` subject.
    pub async fn reply(
        &self,
        from: &str,
        to: &str,
        original: &OriginalMessage<'_>,
        reply_html: &str,
    ) -> Result<SendOutcome, ChannelError> {
        let html = format!("{reply_html}{}", original.quote_html());
        self.send(from, to, &reply_subject(original.subject), &html)
            .await
    }
}
