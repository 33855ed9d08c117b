//! Question text extraction from a raw plain-text body.
//!
//! Two passes: unwrap the quoted reply chain, then drop a leading greeting
//! line and everything from the first closing line on. Both checks only look
//! at the first three words of a line, so this is a heuristic and will
//! occasionally mis-trim.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::email_types::normalize_newlines;

const GREETINGS: &[&str] = &[
    "hola", "hi", "dear", "hey", "hello", "morning", "afternoon", "evening", "bonjour",
];

const CLOSINGS: &[&str] = &[
    "thank", "bye", "regards", "cheers", "sincerely", "ciao", "best", "bgif", "soon",
    "cordially", "yours", "sent", "--", "goodbye",
];

/// Words considered per line.
const FIRST_WORDS: usize = 3;

/// `On Tue, Mar 5, 2024 at 2:07 PM Bob <bob@example.com> wrote:`
static REPLY_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*on\b.*\bwrote:\s*$").expect("valid reply header regex"));

/// Forward and Outlook-style separators.
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:-{2,}\s*(?:forwarded message|original message)\s*-{2,}|begin forwarded message:)\s*$",
    )
    .expect("valid separator regex")
});

/// A reply body split around its first quoted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped {
    /// Text above the quote header, if any.
    pub top: Option<String>,
    /// The quoted text with `>` markers removed.
    pub quoted: String,
    /// Text below the quoted block, if any.
    pub bottom: Option<String>,
}

impl Unwrapped {
    /// Text above the quote, else below it, else the quote itself.
    pub fn into_preferred(self) -> String {
        self.top.or(self.bottom).unwrap_or(self.quoted)
    }
}

/// Locate the first reply header, forward separator or `>` block.
///
/// Returns `None` when the text contains no quote.
pub fn unwrap_quote(text: &str) -> Option<Unwrapped> {
    let text = normalize_newlines(text);
    let lines: Vec<&str> = text.split('\n').collect();

    let (start, quote_from) = find_quote_start(&lines)?;

    let (quoted, rest): (Vec<&str>, &[&str]) =
        if lines.get(quote_from).is_some_and(|line| is_quote_line(line)) {
            let len = lines[quote_from..]
                .iter()
                .take_while(|line| is_quote_line(line))
                .count();
            let block = lines[quote_from..quote_from + len]
                .iter()
                .map(|line| strip_quote_marker(line))
                .collect();
            (block, &lines[quote_from + len..])
        } else {
            // Forwarded or top-posted without markers: everything below is the quote.
            (lines[quote_from..].to_vec(), &lines[lines.len()..])
        };

    Some(Unwrapped {
        top: non_blank(&lines[..start]),
        quoted: quoted.join("\n").trim().to_string(),
        bottom: non_blank(rest),
    })
}

/// Index of the header line and of the first quoted line after it.
fn find_quote_start(lines: &[&str]) -> Option<(usize, usize)> {
    for (idx, line) in lines.iter().enumerate() {
        if REPLY_HEADER_RE.is_match(line) || SEPARATOR_RE.is_match(line) {
            return Some((idx, idx + 1));
        }
        // Clients wrap long headers: "On ..., Bob <bob@example.com>\nwrote:"
        if line.trim_start().to_lowercase().starts_with("on ") {
            let wrapped = lines
                .get(idx + 1)
                .is_some_and(|next| REPLY_HEADER_RE.is_match(&format!("{line} {next}")));
            if wrapped {
                return Some((idx, idx + 2));
            }
        }
        if is_quote_line(line) {
            return Some((idx, idx));
        }
    }
    None
}

fn is_quote_line(line: &str) -> bool {
    line.trim_start().starts_with('>')
}

fn strip_quote_marker(line: &str) -> &str {
    let line = line.trim_start();
    let line = line.strip_prefix('>').unwrap_or(line);
    line.strip_prefix(' ').unwrap_or(line)
}

fn non_blank(lines: &[&str]) -> Option<String> {
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Whether any of the first three words of `line`, stripped of everything
/// but ASCII letters and digits, is in `lookup`.
fn starts_with_any(line: &str, lookup: &[&str]) -> bool {
    let cleaned: String = line
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .take(FIRST_WORDS)
        .any(|word| lookup.contains(&word.to_lowercase().as_str()))
}

/// Extract the question (or answer) text from a raw email body.
pub fn extract_body(text: &str) -> String {
    let text = normalize_newlines(text);
    let stripped = match unwrap_quote(&text) {
        Some(unwrapped) => unwrapped.into_preferred(),
        None => text,
    };

    let mut lines: Vec<&str> = stripped
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() > 1 && starts_with_any(lines[0], GREETINGS) {
        lines.remove(0);
    }
    // The last line is never treated as a closing.
    for idx in 1..lines.len().saturating_sub(1) {
        if starts_with_any(lines[idx], CLOSINGS) {
            lines.truncate(idx);
            break;
        }
    }
    lines.join("\n")
}
