//! Integration tests for the webhook → pipeline → mail flow.
//!
//! Each test spins up the Axum server on a random port with an in-memory
//! database, a stub responder and a capturing mail transport, then drives
//! it with signed webhook posts the way Mailgun would.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use uuid::Uuid;

use email_responder::channels::{MailTransport, Mailer, OutboundEmail, Templates};
use email_responder::error::{ChannelError, ResponderError};
use email_responder::pipeline::EmailPipeline;
use email_responder::responder::{AnswerService, RankedAnswer, SourceType};
use email_responder::store::{
    ConversationState, Database, EmailEvent, LibSqlBackend, QuestionStage, User,
};
use email_responder::webhook::signature::sign;
use email_responder::webhook::{AppState, webhook_routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const SIGNING_KEY: &str = "key-integration";
const DOMAIN: &str = "mail.example.com";
const TIMESTAMP: &str = "1700000000";

// ── Stubs ────────────────────────────────────────────────────────────

/// Stub responder: scripted answers, recorded saved replies.
struct StubResponder {
    answers: Mutex<Result<Vec<RankedAnswer>, String>>,
    saved_reply: Mutex<Result<String, String>>,
    questions: Mutex<Vec<String>>,
    saved: Mutex<Vec<(String, String)>>,
}

impl StubResponder {
    fn new() -> Self {
        Self {
            answers: Mutex::new(Ok(vec![])),
            saved_reply: Mutex::new(Ok("r-42".into())),
            questions: Mutex::new(vec![]),
            saved: Mutex::new(vec![]),
        }
    }

    fn answer_with(&self, answers: Vec<RankedAnswer>) {
        *self.answers.lock().unwrap() = Ok(answers);
    }
}

#[async_trait]
impl AnswerService for StubResponder {
    async fn answer(
        &self,
        token: &str,
        question: &str,
        number_of_items: usize,
    ) -> Result<Vec<RankedAnswer>, ResponderError> {
        assert_eq!(token, "tok123");
        assert_eq!(number_of_items, 3);
        self.questions.lock().unwrap().push(question.to_string());
        self.answers
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| ResponderError::Rejected { message })
    }

    async fn create_saved_reply(
        &self,
        _token: &str,
        question: &str,
        answer: &str,
    ) -> Result<String, ResponderError> {
        self.saved
            .lock()
            .unwrap()
            .push((question.to_string(), answer.to_string()));
        self.saved_reply
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| ResponderError::Rejected { message })
    }
}

/// Mail transport that records instead of sending.
#[derive(Default)]
struct CaptureTransport {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl CaptureTransport {
    fn take(&self) -> Vec<OutboundEmail> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl MailTransport for CaptureTransport {
    fn name(&self) -> &str {
        "capture"
    }
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────

struct Harness {
    base: String,
    db: Arc<dyn Database>,
    responder: Arc<StubResponder>,
    mail: Arc<CaptureTransport>,
    client: reqwest::Client,
}

/// Start an Axum server on a random port with one provisioned user.
async fn start_server(user: User, default_email: Option<&str>) -> Harness {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    db.upsert_user(&user).await.unwrap();

    let responder = Arc::new(StubResponder::new());
    let mail = Arc::new(CaptureTransport::default());
    let mailer = Arc::new(Mailer::new(mail.clone(), DOMAIN));
    let templates = Templates {
        sender_name: "Answer Bot".into(),
        site_url: "https://answers.example.com".into(),
        ui_url: "https://ui.example.com".into(),
    };
    let pipeline = EmailPipeline::new(Arc::clone(&db), responder.clone(), mailer, templates)
        .with_default_email(default_email.map(str::to_string));

    let app = webhook_routes(AppState {
        db: Arc::clone(&db),
        pipeline: Arc::new(pipeline),
        signing_key: secrecy::SecretString::from(SIGNING_KEY.to_string()),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Harness {
        base: format!("http://127.0.0.1:{port}"),
        db,
        responder,
        mail,
        client: reqwest::Client::new(),
    }
}

fn alice() -> User {
    User {
        user_id: "u-alice".into(),
        token: "tok123".into(),
        forward_email: Some("alice@example.com".into()),
        verified_email: Some("alice@example.com".into()),
    }
}

fn document(id: &str, text: &str) -> RankedAnswer {
    RankedAnswer {
        source_type: SourceType::Document,
        source_id: id.into(),
        answer_text: text.into(),
        answer_context: None,
        answer_context_start_offset: None,
        answer_text_start_offset: None,
        answer_text_end_offset: None,
    }
}

fn saved_reply(id: &str, text: &str) -> RankedAnswer {
    RankedAnswer {
        source_type: SourceType::SavedReply,
        ..document(id, text)
    }
}

const QUESTION_BODY: &str = "Hi,\r\nWhat colour is the sky?\r\nBest,\r\nBob";

impl Harness {
    /// Post a webhook signed with a fresh delivery token.
    async fn post(&self, path: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
        let delivery = Uuid::new_v4().to_string();
        self.post_as(&delivery, path, fields).await
    }

    async fn post_as(&self, delivery: &str, path: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
        let signature = sign(SIGNING_KEY, TIMESTAMP, delivery).unwrap();
        let mut form = vec![
            ("token", delivery),
            ("timestamp", TIMESTAMP),
            ("signature", signature.as_str()),
        ];
        form.extend_from_slice(fields);

        let resp = self
            .client
            .post(format!("{}{path}", self.base))
            .form(&form)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    /// Bob asks a question on `recipient`.
    async fn ask(&self, recipient: &str) -> (StatusCode, Value) {
        self.post(
            "/email/inbound",
            &[
                ("recipient", recipient),
                ("to", recipient),
                ("from", "Bob Smith <bob@example.com>"),
                ("subject", "Sky"),
                ("body-plain", QUESTION_BODY),
            ],
        )
        .await
    }
}

/// Conversation id from a stage address such as `Answer Bot <id+c@domain>`.
fn conversation_id(from: &str) -> Uuid {
    let start = from.find('<').unwrap() + 1;
    let end = from.find('+').unwrap();
    Uuid::parse_str(&from[start..end]).unwrap()
}

fn handled(success: bool) -> Value {
    serde_json::json!({"success": success, "emailHandled": true})
}

// ── Routing ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_token_gets_token_not_found_notice() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;

        let (status, body) = h.ask("nobody@mail.example.com").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, handled(false));

        let sent = h.mail.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, "nobody@mail.example.com");
        assert_eq!(sent[0].to, "Bob Smith <bob@example.com>");
        assert_eq!(sent[0].subject, "Sky");
        assert!(sent[0].html.contains("<b>nobody</b>"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn bad_signature_is_rejected_before_any_side_effect() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;

        let resp = h
            .client
            .post(format!("{}/email/question", h.base))
            .form(&[
                ("token", "t"),
                ("timestamp", TIMESTAMP),
                ("signature", "0000"),
                ("recipient", "tok123@mail.example.com"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["result"]["message"].as_str().unwrap().contains("Invalid webhook signature"));
        assert!(h.mail.take().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_conversation_is_bad_request_and_claim_released() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;
        let recipient = format!("{}+e@mail.example.com", Uuid::new_v4());
        let fields = [
            ("recipient", recipient.as_str()),
            ("to", recipient.as_str()),
            ("from", "bob@example.com"),
            ("subject", "Re: Sky"),
            ("body-plain", "Wrong answer"),
        ];

        let (status, body) = h.post_as("retry-1", "/email/inbound", &fields).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["result"]["message"].as_str().unwrap().contains("Invalid or expired token"));

        // Released: the provider's retry is processed again, not swallowed.
        let (status, _) = h.post_as("retry-1", "/email/inbound", &fields).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn duplicate_delivery_is_processed_once() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;
        let fields = [
            ("recipient", "tok123@mail.example.com"),
            ("to", "tok123@mail.example.com"),
            ("from", "bob@example.com"),
            ("subject", "Sky"),
            ("body-plain", "What colour is the sky?"),
        ];

        let (_, first) = h.post_as("dup-1", "/email/question", &fields).await;
        let (status, second) = h.post_as("dup-1", "/email/question", &fields).await;
        assert_eq!(first, handled(true));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second, handled(true));
        assert_eq!(h.mail.take().len(), 1);
        assert_eq!(h.responder.questions.lock().unwrap().len(), 1);
    })
    .await
    .expect("test timed out");
}

// ── Question pre-checks ──────────────────────────────────────────────

#[tokio::test]
async fn unconfigured_forward_address_gets_notice() {
    timeout(TEST_TIMEOUT, async {
        let user = User {
            forward_email: Some("placeholder@example.com".into()),
            ..alice()
        };
        let h = start_server(user, Some("placeholder@example.com")).await;

        let (_, body) = h.ask("tok123@mail.example.com").await;
        assert_eq!(body, handled(false));

        let sent = h.mail.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "Bob Smith <bob@example.com>");
        assert!(sent[0].html.contains("not yet been configured"));
        assert!(h.responder.questions.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unverified_forward_address_gets_notice() {
    timeout(TEST_TIMEOUT, async {
        let user = User {
            verified_email: None,
            ..alice()
        };
        let h = start_server(user, None).await;

        let (_, body) = h.ask("tok123@mail.example.com").await;
        assert_eq!(body, handled(false));
        assert!(h.mail.take()[0].html.contains("not been verified"));
    })
    .await
    .expect("test timed out");
}

// ── Answer flows ─────────────────────────────────────────────────────

#[tokio::test]
async fn saved_reply_match_answers_asker_directly() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;
        h.responder.answer_with(vec![
            saved_reply("r-1", "The sky is blue."),
            document("Sky", "blue"),
        ]);

        let (_, body) = h.ask("tok123@mail.example.com").await;
        assert_eq!(body, handled(true));
        assert_eq!(
            h.responder.questions.lock().unwrap().as_slice(),
            ["What colour is the sky?"]
        );

        let sent = h.mail.take();
        assert_eq!(sent.len(), 1);
        let answer = &sent[0];
        assert!(answer.from.starts_with("Answer Bot <"));
        assert!(answer.from.ends_with("+d@mail.example.com>"));
        assert_eq!(answer.to, "Bob Smith <bob@example.com>");
        assert_eq!(answer.subject, "Re: Sky");
        assert!(answer.html.starts_with("Hello Bob,<br /><br />The sky is blue."));
        assert!(answer.html.contains("%2Be@mail.example.com"));
        assert!(answer.html.contains("Bob Smith &lt;bob@example.com&gt; wrote:<br />&gt; Hi,"));

        let id = conversation_id(&answer.from);
        let event = h.db.get_email_event(id).await.unwrap().unwrap();
        assert_eq!(event.state(), ConversationState::Answered);
        assert_eq!(event.final_answer.unwrap().saved_reply_id, "r-1");
        assert_eq!(event.question.extracted_body, "What colour is the sky?");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn suggestions_then_owner_reply_answers_asker() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;
        h.responder.answer_with(vec![document("Sky", "The sky is blue.")]);

        let (_, body) = h.ask("tok123@mail.example.com").await;
        assert_eq!(body, handled(true));

        let sent = h.mail.take();
        assert_eq!(sent.len(), 1);
        let suggestions = &sent[0];
        assert_eq!(suggestions.to, "alice@example.com");
        assert!(suggestions.from.ends_with("+c@mail.example.com>"));
        assert!(suggestions.html.contains("==Answer Bot Suggestions=="));
        assert!(suggestions.html.contains("#/documents/Sky"));

        let id = conversation_id(&suggestions.from);
        let event = h.db.get_email_event(id).await.unwrap().unwrap();
        assert_eq!(event.state(), ConversationState::Suggested);

        // Alice replies to the suggestions with the answer.
        let recipient = format!("{id}+c@mail.example.com");
        let (_, body) = h
            .post(
                "/email/inbound",
                &[
                    ("recipient", recipient.as_str()),
                    ("to", recipient.as_str()),
                    ("from", "Alice <Alice@Example.com>"),
                    ("subject", "Re: Sky"),
                    (
                        "body-plain",
                        "It is blue.\r\n\r\nOn Tue, Nov 14, 2023 at 22:13 PM Answer Bot wrote:\r\n> ==Answer Bot Suggestions==",
                    ),
                ],
            )
            .await;
        assert_eq!(body, handled(true));
        assert_eq!(
            h.responder.saved.lock().unwrap().as_slice(),
            [("What colour is the sky?".to_string(), "It is blue.".to_string())]
        );

        let sent = h.mail.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "Bob Smith <bob@example.com>");
        assert!(sent[0].html.contains("It is blue."));

        let event = h.db.get_email_event(id).await.unwrap().unwrap();
        assert_eq!(event.state(), ConversationState::Answered);
        assert_eq!(event.final_answer.unwrap().saved_reply_id, "r-42");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn no_results_sends_no_suggestions_variant() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;
        *h.responder.answers.lock().unwrap() = Err("ranking offline".into());

        let (_, body) = h.ask("tok123@mail.example.com").await;
        assert_eq!(body, handled(true));

        let sent = h.mail.take();
        assert_eq!(sent[0].to, "alice@example.com");
        assert!(sent[0].html.contains("No suggestions were found"));

        let event = h
            .db
            .get_email_event(conversation_id(&sent[0].from))
            .await
            .unwrap()
            .unwrap();
        assert!(event.suggestion.unwrap().results.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn correction_request_asks_owner_and_keeps_final() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;
        h.responder.answer_with(vec![saved_reply("r-1", "Green.")]);
        h.ask("tok123@mail.example.com").await;
        let id = conversation_id(&h.mail.take()[0].from);

        // Bob follows the "does not answer my question" link.
        let recipient = format!("{id}+e@mail.example.com");
        let (_, body) = h
            .post(
                "/email/request-correction",
                &[
                    ("recipient", recipient.as_str()),
                    ("to", recipient.as_str()),
                    ("from", "Bob Smith <bob@example.com>"),
                    ("subject", "Sky"),
                    ("body-plain", "Hi,\nWhat colour is the sky at noon?"),
                ],
            )
            .await;
        assert_eq!(body, handled(true));

        // Even a saved reply on top is only a suggestion now.
        let sent = h.mail.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert!(sent[0].html.contains("#/saved-replies/r-1"));
        assert_eq!(
            h.responder.questions.lock().unwrap().last().map(String::as_str),
            Some("What colour is the sky at noon?")
        );

        let event = h.db.get_email_event(id).await.unwrap().unwrap();
        assert!(event.suggestion.is_some());
        assert_eq!(event.final_answer.unwrap().saved_reply_id, "r-1");
    })
    .await
    .expect("test timed out");
}

// ── Owner replies ────────────────────────────────────────────────────

async fn suggested_conversation(h: &Harness) -> Uuid {
    h.responder.answer_with(vec![document("Sky", "blue")]);
    h.ask("tok123@mail.example.com").await;
    conversation_id(&h.mail.take()[0].from)
}

#[tokio::test]
async fn reply_from_unrecognised_sender_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;
        let id = suggested_conversation(&h).await;

        let recipient = format!("{id}+c@mail.example.com");
        let (_, body) = h
            .post(
                "/email/new-reply",
                &[
                    ("recipient", recipient.as_str()),
                    ("to", recipient.as_str()),
                    ("from", "Mallory <mallory@example.com>"),
                    ("subject", "Re: Sky"),
                    ("body-plain", "It is green."),
                ],
            )
            .await;
        assert_eq!(body, handled(false));

        let sent = h.mail.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "mallory@example.com");
        assert!(sent[0].html.contains("mallory@example.com is not allowed"));
        assert!(h.responder.saved.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn reply_with_malformed_sender_is_declined_silently() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;
        let id = suggested_conversation(&h).await;

        let recipient = format!("{id}+c@mail.example.com");
        let (status, body) = h
            .post(
                "/email/new-reply",
                &[
                    ("recipient", recipient.as_str()),
                    ("to", recipient.as_str()),
                    ("from", "Alice Smith"),
                    ("subject", "Re: Sky"),
                    ("body-plain", "It is blue."),
                ],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, handled(false));
        assert!(h.mail.take().is_empty());
        assert!(h.responder.saved.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn conversation_without_owner_gets_token_not_found_notice() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;

        let question = QuestionStage {
            package: serde_json::json!({"subject": "Sky", "body-plain": "What colour?"}),
            extracted_body: "What colour?".into(),
            sender: "Bob <bob@y.com>".into(),
            received_at: chrono::Utc::now(),
        };
        let event = EmailEvent::new("u-gone", question);
        h.db.insert_email_event(&event).await.unwrap();

        let recipient = format!("{}+e@mail.example.com", event.id);
        let (status, body) = h
            .post(
                "/email/request-correction",
                &[
                    ("recipient", recipient.as_str()),
                    ("to", recipient.as_str()),
                    ("from", "Bob <bob@y.com>"),
                    ("subject", "Re: Sky"),
                    ("body-plain", "That was wrong."),
                ],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, handled(false));

        let sent = h.mail.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "Bob <bob@y.com>");
        assert_eq!(sent[0].from, recipient);
        assert!(h.responder.questions.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn saved_reply_failure_is_mailed_to_owner() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;
        let id = suggested_conversation(&h).await;
        *h.responder.saved_reply.lock().unwrap() = Err("Answer must not be empty".into());

        let recipient = format!("{id}+c@mail.example.com");
        let (status, body) = h
            .post(
                "/email/inbound",
                &[
                    ("recipient", recipient.as_str()),
                    ("to", recipient.as_str()),
                    ("from", "alice@example.com"),
                    ("subject", "Re: Sky"),
                    ("body-plain", "Thanks"),
                ],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, handled(true));

        let sent = h.mail.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert!(sent[0].html.contains("Answer must not be empty"));

        let event = h.db.get_email_event(id).await.unwrap().unwrap();
        assert_eq!(event.state(), ConversationState::Suggested);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn relay_domain_sender_gets_nothing() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(alice(), None).await;

        let (_, body) = h
            .post(
                "/email/inbound",
                &[
                    ("recipient", "nobody@mail.example.com"),
                    ("to", "nobody@mail.example.com"),
                    ("from", "Answer Bot <abc+d@mail.example.com>"),
                    ("subject", "Re: Sky"),
                    ("body-plain", "loop"),
                ],
            )
            .await;
        assert_eq!(body, handled(false));
        assert!(h.mail.take().is_empty());
    })
    .await
    .expect("test timed out");
}
