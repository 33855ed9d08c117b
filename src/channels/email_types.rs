//! Address parsing and HTML helpers for outbound mail.

use std::sync::LazyLock;

use regex::Regex;

/// `Name <addr>` or a bare address with no angle brackets.
static SENDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:<(.*)>|^([^<].*[^> ])$)").expect("valid sender regex"));

/// Extract the address from a `From`-style header value.
///
/// Accepts `Bob Smith <bob@example.com>` and `bob@example.com`.
/// Returns `None` when no address can be found.
pub fn extract_address(header: &str) -> Option<String> {
    let header = header.trim();
    let caps = SENDER_RE.captures(header)?;
    let address = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim())
        .filter(|a| !a.is_empty())?;
    address.contains('@').then(|| address.to_string())
}

/// Local-part of an address (`tok` in `tok@mail.example.com`).
pub fn local_part(address: &str) -> Option<&str> {
    let (local, domain) = address.trim().rsplit_once('@')?;
    (!local.is_empty() && !domain.is_empty()).then_some(local)
}

/// Prefix `Re: ` unless the subject already carries it.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim_start();
    let already_reply = trimmed
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"));
    if already_reply {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

/// Whether `address` is on the relay's own domain (or a subdomain of it).
pub fn is_relay_address(address: &str, relay_domain: &str) -> bool {
    let relay_domain = relay_domain.trim().to_lowercase();
    if relay_domain.is_empty() {
        return false;
    }
    let address = address.trim().to_lowercase();
    let Some((_, host)) = address.rsplit_once('@') else {
        return false;
    };
    host == relay_domain
        || host
            .strip_suffix(relay_domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Escape text for inclusion in an HTML body.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Normalise CRLF line endings to `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}
