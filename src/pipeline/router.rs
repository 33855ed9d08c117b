//! Token routing: recipient local-part → user and conversation record.

use tracing::{info, warn};
use uuid::Uuid;

use super::handlers::EmailPipeline;
use super::types::{InboundEmail, Recipient, Stage, WebhookReply};
use crate::channels::email_types::local_part;
use crate::channels::templates::{TOKEN_NOT_FOUND, fill};
use crate::error::{Result, WebhookError};
use crate::store::{EmailEvent, User};

/// Which webhook endpoint received the email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Dispatch on the recipient's stage marker.
    Inbound,
    Question,
    NewReply,
    RequestCorrection,
}

/// A resolved email, ready for its handler.
#[derive(Debug)]
pub enum Routed {
    Question {
        user: User,
    },
    NewReply {
        user: User,
        event: EmailEvent,
    },
    RequestCorrection {
        user: User,
        event: EmailEvent,
    },
    /// Answered with a notice; nothing left to do.
    Handled(WebhookReply),
}

impl EmailPipeline {
    /// Parse the recipient and load its user and, for follow-ups, its record.
    pub(crate) async fn resolve(&self, endpoint: Endpoint, email: &InboundEmail) -> Result<Routed> {
        let recipient = Recipient::parse(&email.recipient)?;
        let mismatch = || {
            let local = local_part(&email.recipient).unwrap_or_default();
            WebhookError::InvalidToken(local.to_string())
        };

        match recipient {
            Recipient::Question { token } => {
                if !matches!(endpoint, Endpoint::Inbound | Endpoint::Question) {
                    return Err(mismatch().into());
                }
                match self.db.get_user_by_token(&token).await? {
                    Some(user) => Ok(Routed::Question { user }),
                    None => self.token_not_found(email, &token).await,
                }
            }
            Recipient::Conversation { id, stage } => {
                let stage = match (endpoint, stage) {
                    (Endpoint::Inbound, stage) => stage,
                    (Endpoint::NewReply, _) => Stage::SuggestionReply,
                    (Endpoint::RequestCorrection, _) => Stage::CorrectionRequest,
                    (Endpoint::Question, _) => return Err(mismatch().into()),
                };

                let event = match Uuid::parse_str(&id) {
                    Ok(uuid) => self.db.get_email_event(uuid).await?,
                    Err(_) => None,
                };
                let Some(event) = event else {
                    return Err(WebhookError::InvalidToken(id).into());
                };

                let Some(user) = self.db.get_user_by_id(&event.user_id).await? else {
                    warn!(id = %event.id, user_id = %event.user_id, "Conversation owner no longer exists");
                    return self.token_not_found(email, &id).await;
                };

                Ok(match stage {
                    Stage::SuggestionReply => Routed::NewReply { user, event },
                    Stage::CorrectionRequest => Routed::RequestCorrection { user, event },
                })
            }
        }
    }

    /// Tell the sender that nobody owns the address they wrote to.
    async fn token_not_found(&self, email: &InboundEmail, local: &str) -> Result<Routed> {
        info!(local, from = %email.from, "No account for recipient token");
        self.mailer
            .send(
                &email.to,
                &email.from,
                &email.subject,
                &fill(TOKEN_NOT_FOUND, local),
            )
            .await?;
        Ok(Routed::Handled(WebhookReply::declined()))
    }
}
