//! HTML bodies for outbound replies and notices.

use crate::channels::email_types::{html_escape, normalize_newlines};
use crate::responder::{RankedAnswer, SourceType};

/// Notice sent when the recipient token matches no account. `%s` is the local-part.
pub const TOKEN_NOT_FOUND: &str = "Sorry, no account matches the address <b>%s</b>. \
Please check the address you wrote to and try again.";

pub const EMAIL_UNCONFIGURED: &str = "Sorry, this account has not yet been configured for email access. \
<br />Please contact your administrator to set this up.";

pub const EMAIL_UNVERIFIED: &str = "Sorry, the forwarding address of this account has not been verified yet. \
<br />Please contact your administrator to complete the verification.";

/// Rejection sent to someone replying to suggestions they do not own. `%s` is their address.
pub const UNRECOGNISED_SENDER: &str = "Sorry, %s is not allowed to answer questions for this account. \
<br />Only the verified forwarding address can reply to suggestions.";

pub const NO_SUGGESTIONS: &str = "No suggestions were found for this question. \
Reply to this email with the answer: it will be sent to the person who asked and saved for next time.";

/// Fill the single `%s` slot of a notice.
pub fn fill(template: &str, value: &str) -> String {
    template.replacen("%s", &html_escape(value), 1)
}

/// Branding and links shared by every reply.
#[derive(Debug, Clone)]
pub struct Templates {
    pub sender_name: String,
    pub site_url: String,
    pub ui_url: String,
}

/// Where the "this does not answer my question" link sends its mail.
#[derive(Debug, Clone)]
pub struct CorrectionLink<'a> {
    /// Address of the record's correction stage, `id+e@domain`.
    pub address: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

impl Templates {
    pub fn signature(&self) -> String {
        format!(
            "--<br />Sent by <a href=\"{}\">{}</a><br /><br />",
            html_escape(&self.site_url),
            html_escape(&self.sender_name)
        )
    }

    /// Direct answer to the asker, with a link to ask for a human correction.
    pub fn answer_body(
        &self,
        first_name: Option<&str>,
        answer_text: &str,
        correction: &CorrectionLink<'_>,
    ) -> String {
        let mailto = format!(
            "mailto:{}?subject={}&body={}",
            percent_encode(&format!("\"{}\" <{}>", self.sender_name, correction.address)),
            percent_encode(correction.subject),
            percent_encode(&normalize_newlines(correction.body).replace('\n', "\r\n")),
        );
        format!(
            "{}<br /><br />{}<br /><br />{}<small>If this answer does not answer your question, \
             click <a href=\"{}\">here</a>.</small><br /><br />",
            greeting(first_name),
            text_to_html(answer_text),
            self.signature(),
            html_escape(&mailto),
        )
    }

    /// Suggestions forwarded to the owner. `None` renders the "no suggestions" variant.
    pub fn suggestions_body(&self, first_name: Option<&str>, answers: Option<&[RankedAnswer]>) -> String {
        let mut body = format!(
            "{}<br /><br />=={} Suggestions==<br /><br />",
            greeting(first_name),
            html_escape(&self.sender_name)
        );
        match answers {
            Some(answers) if !answers.is_empty() => {
                for answer in answers {
                    body.push_str(&self.suggestion_entry(answer));
                }
            }
            _ => {
                body.push_str(NO_SUGGESTIONS);
                body.push_str("<br /><br />");
            }
        }
        body.push_str("==End Suggestions==<br /><br />");
        body.push_str(&self.signature());
        body
    }

    fn suggestion_entry(&self, answer: &RankedAnswer) -> String {
        let context = match answer.context_parts() {
            Some((before, span, after)) => format!(
                "{}<b>{}</b>{}",
                text_to_html(&before),
                text_to_html(&span),
                text_to_html(&after)
            ),
            None => text_to_html(&answer.answer_text),
        };
        let id = html_escape(&answer.source_id);
        let ui = html_escape(&self.ui_url);
        match answer.source_type {
            SourceType::Document => format!(
                "{context}<br /><br />According to document: \
                 <a href=\"{ui}/dashboard.html#/documents/{id}\">{id}</a><br /><br />"
            ),
            SourceType::SavedReply => format!(
                "{context}<br /><br />According to \
                 <a href=\"{ui}/dashboard.html#/saved-replies/{id}\">saved reply</a><br /><br />"
            ),
            SourceType::Unknown => format!("{context}<br /><br />"),
        }
    }
}

fn greeting(first_name: Option<&str>) -> String {
    match first_name {
        Some(name) => format!("Hello {},", html_escape(name)),
        None => "Hello,".to_string(),
    }
}

/// Escape plain text and keep its line breaks.
pub fn text_to_html(text: &str) -> String {
    html_escape(&normalize_newlines(text)).replace('\n', "<br />")
}

/// Percent-encode everything outside the URI unreserved set.
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'@' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
