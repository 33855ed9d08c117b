//! Answer dispatch: classify ranking results and send the matching reply.

use tracing::{info, warn};

use super::handlers::EmailPipeline;
use crate::channels::OriginalMessage;
use crate::channels::templates::CorrectionLink;
use crate::error::{ResponderError, Result};
use crate::responder::{RankedAnswer, SourceType};
use crate::store::EmailEvent;

/// What to do with the ranking collaborator's answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Failed call or no results.
    NoSuggestions,
    /// Top result is a saved reply: answer the asker directly.
    DirectAnswer(RankedAnswer),
    /// Forward every candidate to the owner for review.
    Suggestions(Vec<RankedAnswer>),
}

impl Dispatch {
    /// Classify the answer to a new question.
    pub fn classify(result: std::result::Result<Vec<RankedAnswer>, ResponderError>) -> Self {
        let mut items = match result {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Ranking call failed, asking for assistance");
                return Self::NoSuggestions;
            }
        };
        let top_is_saved_reply = items
            .first()
            .map(|top| top.source_type == SourceType::SavedReply);
        match top_is_saved_reply {
            None => Self::NoSuggestions,
            Some(true) => Self::DirectAnswer(items.swap_remove(0)),
            Some(false) => Self::Suggestions(items),
        }
    }

    /// Candidates for a correction request. The asker already rejected the
    /// automatic answer, so a saved reply on top is listed like any other.
    /// `None` renders the "no suggestions" variant.
    pub fn correction_candidates(
        result: std::result::Result<Vec<RankedAnswer>, ResponderError>,
    ) -> Option<Vec<RankedAnswer>> {
        match result {
            Ok(items) if !items.is_empty() => Some(items),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Ranking call failed, sending empty suggestions");
                None
            }
        }
    }
}

impl EmailPipeline {
    /// `"<name> <id+<marker>@domain>"`, the address replies to this stage go to.
    pub(crate) fn stage_sender(&self, event: &EmailEvent, marker: char) -> String {
        format!(
            "{} <{}>",
            self.templates.sender_name,
            self.stage_address(event, marker)
        )
    }

    pub(crate) fn stage_address(&self, event: &EmailEvent, marker: char) -> String {
        format!(
            "{}+{marker}@{}",
            event.unique_id(),
            self.mailer.relay_domain()
        )
    }

    /// Reply to the original asker with an answer and record the final stage.
    pub(crate) async fn respond_with_answer(
        &self,
        event: &mut EmailEvent,
        answer_text: &str,
        saved_reply_id: &str,
    ) -> Result<()> {
        let from = self.stage_sender(event, 'd');
        let correction_address = self.stage_address(event, 'e');
        {
            let original = OriginalMessage::from_question(&event.question);
            let link = CorrectionLink {
                address: &correction_address,
                subject: original.subject,
                body: original.body_plain,
            };
            let body = self
                .templates
                .answer_body(event.question.first_name(), answer_text, &link);
            self.mailer
                .reply(&from, &event.question.sender, &original, &body)
                .await?;
        }

        event.record_final(saved_reply_id, &from);
        self.db.update_email_event(event).await?;
        info!(id = %event.id, saved_reply_id, "Answer sent to asker");
        Ok(())
    }

    /// Forward suggestions (or the lack of them) to `to` and record the
    /// suggestion stage.
    pub(crate) async fn request_assistance(
        &self,
        to: &str,
        event: &mut EmailEvent,
        answers: Option<Vec<RankedAnswer>>,
    ) -> Result<()> {
        let from = self.stage_sender(event, 'c');
        {
            let original = OriginalMessage::from_question(&event.question);
            let body = self
                .templates
                .suggestions_body(event.question.first_name(), answers.as_deref());
            self.mailer.reply(&from, to, &original, &body).await?;
        }

        let count = answers.as_ref().map_or(0, Vec::len);
        event.record_suggestions(answers, &from);
        self.db.update_email_event(event).await?;
        info!(id = %event.id, count, "Suggestions sent to owner");
        Ok(())
    }
}
