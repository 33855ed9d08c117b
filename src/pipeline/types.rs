//! Shared types for the inbound email pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels::email_types::local_part;
use crate::error::WebhookError;

// ── Inbound email ───────────────────────────────────────────────────

/// An inbound email as delivered by the provider's webhook.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Address the message was routed to (`token@domain`, `id+c@domain`, ...).
    pub recipient: String,
    /// `To` header value.
    pub to: String,
    /// `From` header value, display name included.
    pub from: String,
    pub subject: String,
    pub body_plain: String,
    /// Provider receipt time.
    pub received_at: DateTime<Utc>,
    /// Every webhook parameter, kept verbatim on the conversation record.
    pub package: serde_json::Value,
}

impl InboundEmail {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, WebhookError> {
        let required = |name: &str| {
            params
                .get(name)
                .cloned()
                .ok_or_else(|| WebhookError::MissingParameter(name.to_string()))
        };

        let raw_timestamp = required("timestamp")?;
        let received_at = raw_timestamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| WebhookError::InvalidParameter {
                name: "timestamp".into(),
                reason: format!("expected epoch seconds, got {raw_timestamp:?}"),
            })?;

        let package = params
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect::<serde_json::Map<_, _>>();

        Ok(Self {
            recipient: required("recipient")?,
            to: required("to")?,
            from: required("from")?,
            subject: params.get("subject").cloned().unwrap_or_default(),
            body_plain: required("body-plain")?,
            received_at,
            package: serde_json::Value::Object(package),
        })
    }
}

// ── Recipient grammar ───────────────────────────────────────────────

/// Follow-up stage encoded by the single character after `+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// `+c`: the owner replies to the suggestions with the answer.
    SuggestionReply,
    /// `+e`: the asker says the direct answer was wrong.
    CorrectionRequest,
}

impl Stage {
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            'c' => Some(Self::SuggestionReply),
            'e' => Some(Self::CorrectionRequest),
            _ => None,
        }
    }

    pub fn marker(self) -> char {
        match self {
            Self::SuggestionReply => 'c',
            Self::CorrectionRequest => 'e',
        }
    }
}

/// Parsed recipient local-part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// `token@domain`: a new question for the token's owner.
    Question { token: String },
    /// `id+<stage>@domain`: a follow-up on an existing conversation.
    Conversation { id: String, stage: Stage },
}

impl Recipient {
    pub fn parse(address: &str) -> Result<Self, WebhookError> {
        let local = local_part(address)
            .ok_or_else(|| WebhookError::MalformedRecipient(address.to_string()))?;

        let mut tail = local.chars().rev();
        match (tail.next(), tail.next()) {
            (Some(marker), Some('+')) => {
                let id = &local[..local.len() - marker.len_utf8() - 1];
                match Stage::from_marker(marker) {
                    Some(stage) if !id.is_empty() => Ok(Self::Conversation {
                        id: id.to_string(),
                        stage,
                    }),
                    _ => Err(WebhookError::InvalidToken(id.to_string())),
                }
            }
            _ => Ok(Self::Question {
                token: local.to_string(),
            }),
        }
    }
}

// ── Webhook reply ───────────────────────────────────────────────────

/// JSON acknowledgement returned to the webhook caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReply {
    pub success: bool,
    #[serde(rename = "emailHandled")]
    pub email_handled: bool,
}

impl WebhookReply {
    /// The email was processed.
    pub fn handled() -> Self {
        Self {
            success: true,
            email_handled: true,
        }
    }

    /// The email was answered with a notice instead of being processed.
    pub fn declined() -> Self {
        Self {
            success: false,
            email_handled: true,
        }
    }
}
