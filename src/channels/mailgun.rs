//! Mailgun HTTP API transport.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{MailTransport, OutboundEmail};
use crate::config::MailgunConfig;
use crate::error::ChannelError;

pub struct MailgunTransport {
    endpoint: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl MailgunTransport {
    pub fn new(config: &MailgunConfig) -> Self {
        Self {
            endpoint: format!("{}/{}/messages", config.api_base, config.domain),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn failed(reason: String) -> ChannelError {
        ChannelError::SendFailed {
            name: "mailgun".into(),
            reason,
        }
    }
}

#[async_trait]
impl MailTransport for MailgunTransport {
    fn name(&self) -> &str {
        "mailgun"
    }

    async fn deliver(&self, email: &OutboundEmail) -> Result<(), ChannelError> {
        let form = [
            ("from", email.from.as_str()),
            ("to", email.to.as_str()),
            ("subject", email.subject.as_str()),
            ("html", email.html.as_str()),
        ];
        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(self.api_key.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| Self::failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::failed(format!("HTTP {status}: {body}")));
        }
        tracing::debug!(to = %email.to, "Mailgun accepted message");
        Ok(())
    }
}
