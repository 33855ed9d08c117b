//! Stage handlers: new question, owner's reply to suggestions, and
//! correction request from the asker.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::dispatcher::Dispatch;
use super::extract::extract_body;
use super::router::{Endpoint, Routed};
use super::types::{InboundEmail, WebhookReply};
use crate::channels::Mailer;
use crate::channels::Templates;
use crate::channels::email_types::extract_address;
use crate::channels::templates::{
    EMAIL_UNCONFIGURED, EMAIL_UNVERIFIED, UNRECOGNISED_SENDER, fill, text_to_html,
};
use crate::config::DEFAULT_NUMBER_OF_ITEMS;
use crate::error::Result;
use crate::responder::AnswerService;
use crate::store::{Database, EmailEvent, QuestionStage, User};

/// Everything a webhook needs once its signature checked out.
pub struct EmailPipeline {
    pub(crate) db: Arc<dyn Database>,
    pub(crate) responder: Arc<dyn AnswerService>,
    pub(crate) mailer: Arc<Mailer>,
    pub(crate) templates: Templates,
    /// Placeholder forward address meaning "not configured".
    default_email: Option<String>,
    number_of_items: usize,
}

impl EmailPipeline {
    pub fn new(
        db: Arc<dyn Database>,
        responder: Arc<dyn AnswerService>,
        mailer: Arc<Mailer>,
        templates: Templates,
    ) -> Self {
        Self {
            db,
            responder,
            mailer,
            templates,
            default_email: None,
            number_of_items: DEFAULT_NUMBER_OF_ITEMS,
        }
    }

    pub fn with_default_email(mut self, default_email: Option<String>) -> Self {
        self.default_email = default_email;
        self
    }

    /// Route one authenticated webhook to its stage handler.
    pub async fn process(
        &self,
        endpoint: Endpoint,
        params: &HashMap<String, String>,
    ) -> Result<WebhookReply> {
        let email = InboundEmail::from_params(params)?;
        match self.resolve(endpoint, &email).await? {
            Routed::Question { user } => self.question(&user, &email).await,
            Routed::NewReply { user, event } => self.new_reply(&user, event, &email).await,
            Routed::RequestCorrection { user, event } => {
                self.request_correction(&user, event, &email).await
            }
            Routed::Handled(reply) => Ok(reply),
        }
    }

    /// `token@domain`: record the question and answer it or ask the owner.
    pub async fn question(&self, user: &User, email: &InboundEmail) -> Result<WebhookReply> {
        let extracted = extract_body(&email.body_plain);
        let mut event = EmailEvent::new(
            &user.user_id,
            QuestionStage {
                package: email.package.clone(),
                extracted_body: extracted.clone(),
                sender: email.from.clone(),
                received_at: email.received_at,
            },
        );
        self.db.insert_email_event(&event).await?;
        info!(id = %event.id, user_id = %user.user_id, "Question recorded");

        if self.is_unconfigured(user) {
            self.notify_sender(email, EMAIL_UNCONFIGURED).await?;
            return Ok(WebhookReply::declined());
        }
        let Some(verified) = user.verified_email.as_deref() else {
            self.notify_sender(email, EMAIL_UNVERIFIED).await?;
            return Ok(WebhookReply::declined());
        };

        let result = self
            .responder
            .answer(&user.token, &extracted, self.number_of_items)
            .await;
        match Dispatch::classify(result) {
            Dispatch::DirectAnswer(top) => {
                self.respond_with_answer(&mut event, &top.answer_text, &top.source_id)
                    .await?
            }
            Dispatch::Suggestions(answers) => {
                self.request_assistance(verified, &mut event, Some(answers))
                    .await?
            }
            Dispatch::NoSuggestions => self.request_assistance(verified, &mut event, None).await?,
        }
        Ok(WebhookReply::handled())
    }

    /// `id+c@domain`: the owner answered; save it and send it to the asker.
    pub async fn new_reply(
        &self,
        user: &User,
        mut event: EmailEvent,
        email: &InboundEmail,
    ) -> Result<WebhookReply> {
        let answer_text = extract_body(&email.body_plain);
        let from = self.stage_sender(&event, 'c');

        let Some(sender) = extract_address(&email.from) else {
            warn!(from = %email.from, "Invalid email address on suggestion reply");
            return Ok(WebhookReply::declined());
        };

        let verified = user
            .verified_email
            .as_deref()
            .filter(|verified| verified.eq_ignore_ascii_case(&sender));
        let Some(verified) = verified else {
            warn!(id = %event.id, sender = %sender, "Suggestion reply from unrecognised sender");
            self.mailer
                .send(&from, &sender, &email.subject, &fill(UNRECOGNISED_SENDER, &sender))
                .await?;
            return Ok(WebhookReply::declined());
        };

        let saved = self
            .responder
            .create_saved_reply(&user.token, &event.question.extracted_body, &answer_text)
            .await;
        match saved {
            Ok(reply_id) => {
                self.respond_with_answer(&mut event, &answer_text, &reply_id)
                    .await?
            }
            Err(e) => {
                warn!(id = %event.id, error = %e, "Saved reply creation failed");
                self.mailer
                    .send(&from, verified, &email.subject, &text_to_html(&e.to_string()))
                    .await?;
            }
        }
        Ok(WebhookReply::handled())
    }

    /// `id+e@domain`: the asker rejected the answer; ask the owner again.
    pub async fn request_correction(
        &self,
        user: &User,
        mut event: EmailEvent,
        email: &InboundEmail,
    ) -> Result<WebhookReply> {
        let Some(verified) = user.verified_email.as_deref() else {
            self.notify_sender(email, EMAIL_UNVERIFIED).await?;
            return Ok(WebhookReply::declined());
        };

        let extracted = extract_body(&email.body_plain);
        let result = self
            .responder
            .answer(&user.token, &extracted, self.number_of_items)
            .await;
        let answers = Dispatch::correction_candidates(result);
        info!(id = %event.id, "Correction requested");
        self.request_assistance(verified, &mut event, answers)
            .await?;
        Ok(WebhookReply::handled())
    }

    fn is_unconfigured(&self, user: &User) -> bool {
        match (&user.forward_email, &self.default_email) {
            (None, _) => true,
            (Some(forward), Some(placeholder)) => forward.eq_ignore_ascii_case(placeholder),
            (Some(_), None) => false,
        }
    }

    /// Notice back to the sender, from the address they wrote to.
    async fn notify_sender(&self, email: &InboundEmail, notice: &str) -> Result<()> {
        self.mailer
            .send(&email.to, &email.from, &email.subject, notice)
            .await?;
        Ok(())
    }
}
