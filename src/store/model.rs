//! Conversation record and user types.
//!
//! An [`EmailEvent`] is created when a question email arrives and is
//! updated in place as the suggestion and final stages complete. Each
//! stage is an `Option` so the record's progress is explicit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::responder::RankedAnswer;

/// A user owning a receiving token. Read-only from the responder's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    /// Local-part that routes new questions to this user.
    pub token: String,
    /// Address the owner asked suggestions to be forwarded to.
    pub forward_email: Option<String>,
    /// `forward_email` once its owner confirmed it.
    pub verified_email: Option<String>,
}

/// The inbound question that opened a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStage {
    /// All webhook parameters as received.
    pub package: serde_json::Value,
    pub extracted_body: String,
    /// The `from` header value of the question email.
    pub sender: String,
    pub received_at: DateTime<Utc>,
}

impl QuestionStage {
    fn package_field(&self, key: &str) -> &str {
        self.package.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    /// Original subject line.
    pub fn subject(&self) -> &str {
        self.package_field("subject")
    }

    /// Original plain-text body, before extraction.
    pub fn body_plain(&self) -> &str {
        self.package_field("body-plain")
    }

    /// First word of the `from` header, if it looks like a name.
    pub fn first_name(&self) -> Option<&str> {
        self.package_field("from")
            .split_whitespace()
            .next()
            .filter(|word| !word.contains('@'))
    }
}

/// Candidate answers forwarded to the owner for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionStage {
    /// `None` when the ranking call produced nothing usable.
    pub results: Option<Vec<RankedAnswer>>,
    pub sender: String,
    pub sent_at: DateTime<Utc>,
}

/// The answer that was sent back to the asker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStage {
    pub saved_reply_id: String,
    pub sender: String,
    pub sent_at: DateTime<Utc>,
}

/// Where a conversation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// Question recorded, nothing sent yet.
    Created,
    /// Suggestions sent to the owner, no answer yet.
    Suggested,
    /// An answer reached the asker.
    Answered,
}

/// Stored state for one inbound question and its reply lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailEvent {
    pub id: Uuid,
    pub user_id: String,
    pub question: QuestionStage,
    pub suggestion: Option<SuggestionStage>,
    pub final_answer: Option<FinalStage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailEvent {
    /// Create a record for a freshly received question.
    pub fn new(user_id: &str, question: QuestionStage) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            question,
            suggestion: None,
            final_answer: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The local-part used for this conversation's follow-up addresses.
    pub fn unique_id(&self) -> String {
        self.id.to_string()
    }

    pub fn state(&self) -> ConversationState {
        match (&self.suggestion, &self.final_answer) {
            (_, Some(_)) => ConversationState::Answered,
            (Some(_), None) => ConversationState::Suggested,
            (None, None) => ConversationState::Created,
        }
    }

    /// Record the suggestions sent to the owner. A correction request
    /// replaces any earlier suggestions.
    pub fn record_suggestions(&mut self, results: Option<Vec<RankedAnswer>>, sender: &str) {
        self.suggestion = Some(SuggestionStage {
            results,
            sender: sender.to_string(),
            sent_at: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    /// Record the answer sent to the asker. Last write wins.
    pub fn record_final(&mut self, saved_reply_id: &str, sender: &str) {
        if let Some(previous) = &self.final_answer {
            tracing::debug!(
                id = %self.id,
                previous = %previous.saved_reply_id,
                next = saved_reply_id,
                "Overwriting final answer"
            );
        }
        self.final_answer = Some(FinalStage {
            saved_reply_id: saved_reply_id.to_string(),
            sender: sender.to_string(),
            sent_at: Utc::now(),
        });
        self.updated_at = Utc::now();
    }
}
