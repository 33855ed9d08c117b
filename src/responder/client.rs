//! HTTP client for the responder API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{AnswerService, RankedAnswer};
use crate::error::ResponderError;

const ANSWER_ENDPOINT: &str = "/api/0.1/answer";
const ADD_SAVED_REPLY_ENDPOINT: &str = "/api/0.1/saved-replies/add-saved-reply";

/// Response envelope shared by every responder endpoint.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnswerResult {
    #[serde(default)]
    items: Vec<RankedAnswer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedReplyResult {
    reply_id: serde_json::Value,
}

/// `AnswerService` backed by the responder's HTTP API.
pub struct HttpAnswerService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAnswerService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// POST a form to `endpoint` and unwrap the `{success, result}` envelope.
    async fn call(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> Result<serde_json::Value, ResponderError> {
        let url = format!("{}{endpoint}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| ResponderError::RequestFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| ResponderError::RequestFailed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        debug!(endpoint, status = %status, "Responder call finished");

        let envelope: ApiEnvelope =
            serde_json::from_str(&text).map_err(|e| ResponderError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: format!("status {status}: {e}"),
            })?;

        if !envelope.success {
            let message = envelope
                .result
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("The responder could not process the request")
                .to_string();
            return Err(ResponderError::Rejected { message });
        }
        Ok(envelope.result)
    }
}

#[async_trait]
impl AnswerService for HttpAnswerService {
    async fn answer(
        &self,
        token: &str,
        question: &str,
        number_of_items: usize,
    ) -> Result<Vec<RankedAnswer>, ResponderError> {
        let limit = number_of_items.to_string();
        let result = self
            .call(
                ANSWER_ENDPOINT,
                &[
                    ("token", token),
                    ("question", question),
                    ("numberOfItems", &limit),
                ],
            )
            .await?;

        let parsed: AnswerResult =
            serde_json::from_value(result).map_err(|e| ResponderError::InvalidResponse {
                endpoint: ANSWER_ENDPOINT.to_string(),
                reason: e.to_string(),
            })?;
        Ok(parsed.items)
    }

    async fn create_saved_reply(
        &self,
        token: &str,
        question: &str,
        answer: &str,
    ) -> Result<String, ResponderError> {
        let result = self
            .call(
                ADD_SAVED_REPLY_ENDPOINT,
                &[("token", token), ("question", question), ("answer", answer)],
            )
            .await?;

        let parsed: SavedReplyResult =
            serde_json::from_value(result).map_err(|e| ResponderError::InvalidResponse {
                endpoint: ADD_SAVED_REPLY_ENDPOINT.to_string(),
                reason: e.to_string(),
            })?;

        match parsed.reply_id {
            serde_json::Value::String(id) => Ok(id),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(ResponderError::InvalidResponse {
                endpoint: ADD_SAVED_REPLY_ENDPOINT.to_string(),
                reason: format!("unexpected replyId {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::routing::post;
    use axum::{Form, Json, Router};
    use tokio::net::TcpListener;

    use super::*;
    use crate::responder::SourceType;

    /// Start a fake responder on a random port, return its base URL.
    async fn start_stub() -> String {
        let app = Router::new()
            .route(
                ANSWER_ENDPOINT,
                post(|Form(params): Form<HashMap<String, String>>| async move {
                    if params.get("question").map(|q| q.is_empty()).unwrap_or(true) {
                        return Json(serde_json::json!({
                            "success": false,
                            "result": {"message": "Missing question"}
                        }));
                    }
                    assert_eq!(params["numberOfItems"], "3");
                    Json(serde_json::json!({
                        "success": true,
                        "result": {"items": [
                            {"sourceType": "document", "sourceId": "Sky", "answerText": "blue",
                             "answerContext": "The sky is blue.", "answerContextStartOffset": 0,
                             "answerTextStartOffset": 11, "answerTextEndOffset": 15}
                        ]}
                    }))
                }),
            )
            .route(
                ADD_SAVED_REPLY_ENDPOINT,
                post(|Form(params): Form<HashMap<String, String>>| async move {
                    assert_eq!(params["token"], "tok");
                    Json(serde_json::json!({"success": true, "result": {"replyId": "r-42"}}))
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{port}/")
    }

    #[tokio::test]
    async fn answer_parses_items() {
        let service = HttpAnswerService::new(start_stub().await);
        let items = service.answer("tok", "What colour?", 3).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_type, SourceType::Document);
        assert_eq!(items[0].answer_text_start_offset, Some(11));
    }

    #[tokio::test]
    async fn unsuccessful_envelope_is_rejected() {
        let service = HttpAnswerService::new(start_stub().await);
        let err = service.answer("tok", "", 3).await.unwrap_err();
        assert!(matches!(err, ResponderError::Rejected { ref message } if message == "Missing question"));
    }

    #[tokio::test]
    async fn saved_reply_returns_id() {
        let service = HttpAnswerService::new(start_stub().await);
        let id = service
            .create_saved_reply("tok", "What colour?", "Blue.")
            .await
            .unwrap();
        assert_eq!(id, "r-42");
    }

    #[tokio::test]
    async fn unreachable_service_is_request_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let service = HttpAnswerService::new(format!("http://127.0.0.1:{port}"));
        let err = service.answer("tok", "q", 3).await.unwrap_err();
        assert!(matches!(err, ResponderError::RequestFailed { .. }));
    }
}
