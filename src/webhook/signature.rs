//! Mailgun webhook signature verification.
//!
//! Mailgun signs every webhook with `HMAC-SHA256(signing_key, timestamp + token)`
//! and sends the hex digest as `signature`.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Check the `token`/`timestamp`/`signature` parameters of a webhook.
///
/// Returns the per-request token, which identifies the delivery.
pub fn verify_signature(
    signing_key: &str,
    params: &HashMap<String, String>,
) -> Result<String, WebhookError> {
    let param = |name: &str| {
        params
            .get(name)
            .ok_or_else(|| WebhookError::MissingParameter(name.to_string()))
    };
    let token = param("token")?;
    let timestamp = param("timestamp")?;
    let signature = param("signature")?;

    let expected = sign(signing_key, timestamp, token)?;
    if constant_time_eq(expected.as_bytes(), signature.trim().as_bytes()) {
        Ok(token.clone())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

/// Hex HMAC-SHA256 over `timestamp + token`.
pub fn sign(signing_key: &str, timestamp: &str, token: &str) -> Result<String, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    Ok(hex_encode(mac.finalize().into_bytes().as_slice()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
