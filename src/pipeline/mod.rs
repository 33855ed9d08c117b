//! Inbound email pipeline.
//!
//! Every authenticated webhook flows through:
//! 1. `Recipient::parse()` + `EmailPipeline::resolve()`: token routing
//! 2. `extract_body()`: quote, greeting and signature stripping
//! 3. `Dispatch::classify()`: direct answer, suggestions or nothing
//! 4. `Mailer`: the reply, quoting the original question
//!
//! The conversation record is updated after every mail that goes out.

pub mod dispatcher;
pub mod extract;
pub mod handlers;
pub mod router;
pub mod types;

pub use dispatcher::Dispatch;
pub use handlers::EmailPipeline;
pub use router::Endpoint;
pub use types::{InboundEmail, Recipient, Stage, WebhookReply};
