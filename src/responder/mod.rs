//! Answer-ranking and saved-reply collaborator.
//!
//! The responder service owns the documents and saved replies; this crate
//! only asks it for ranked answers and submits new saved replies.

pub mod client;

pub use client::HttpAnswerService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ResponderError;

/// Where a ranked answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A pre-authored answer, safe to send without review.
    SavedReply,
    /// A span extracted from an uploaded document.
    Document,
    #[serde(other)]
    Unknown,
}

/// One candidate answer returned by the ranking service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedAnswer {
    pub source_type: SourceType,
    pub source_id: String,
    pub answer_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_context_start_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text_start_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text_end_offset: Option<usize>,
}

impl RankedAnswer {
    /// Split the context around the answer span as `(before, answer, after)`.
    ///
    /// `None` when the ranking service returned no context. Offsets count
    /// characters, not bytes, and are clamped to the context.
    pub fn context_parts(&self) -> Option<(String, String, String)> {
        let context = self.answer_context.as_ref()?;
        let ctx_start = self.answer_context_start_offset?;
        let start = self.answer_text_start_offset?;
        let end = self.answer_text_end_offset?;

        let chars: Vec<char> = context.chars().collect();
        let local_start = start.saturating_sub(ctx_start).min(chars.len());
        let local_end = end.saturating_sub(ctx_start).clamp(local_start, chars.len());

        Some((
            chars[..local_start].iter().collect(),
            chars[local_start..local_end].iter().collect(),
            chars[local_end..].iter().collect(),
        ))
    }
}

/// Client for the answer-ranking and saved-reply endpoints.
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Rank the best answers to `question` among the token owner's
    /// documents and saved replies.
    async fn answer(
        &self,
        token: &str,
        question: &str,
        number_of_items: usize,
    ) -> Result<Vec<RankedAnswer>, ResponderError>;

    /// Store a new saved reply. Returns its id.
    async fn create_saved_reply(
        &self,
        token: &str,
        question: &str,
        answer: &str,
    ) -> Result<String, ResponderError>;
}
