//! Configuration types, built from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Items requested from the ranking collaborator per question.
pub const DEFAULT_NUMBER_OF_ITEMS: usize = 3;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Port for the webhook HTTP server.
    pub port: u16,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Base URL of the answer-ranking / saved-reply service.
    pub responder_api_url: String,
    /// Dashboard URL used for document and saved-reply links.
    pub ui_url: String,
    /// Public site linked from the signature of every reply.
    pub site_url: String,
    /// Display name used in the `From` header of outbound mail.
    pub sender_name: String,
    /// Placeholder forward address meaning "not configured".
    pub default_email: Option<String>,
    pub mailgun: MailgunConfig,
    /// SMTP relay; when set, outbound mail goes through SMTP instead of the Mailgun API.
    pub smtp: Option<SmtpConfig>,
}

/// Mailgun account settings.
#[derive(Debug, Clone)]
pub struct MailgunConfig {
    pub api_key: SecretString,
    /// Key used to sign webhooks. Defaults to the API key.
    pub signing_key: SecretString,
    /// Relay domain; local-parts under it are tokens and record ids.
    pub domain: String,
    pub api_base: String,
}

/// SMTP relay settings for the lettre transport.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl ResponderConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let port = parse_or(&lookup, "RESPONDER_PORT", 5050)?;

        let db_path = lookup("RESPONDER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/email-responder.db"));

        let api_key = required("MAILGUN_API_KEY")?;
        let signing_key = lookup("MAILGUN_WEBHOOK_SIGNING_KEY")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| api_key.clone());
        let domain = required("MAILGUN_DOMAIN")?.to_lowercase();
        let api_base = lookup("MAILGUN_API_BASE")
            .unwrap_or_else(|| "https://api.mailgun.net/v3".to_string())
            .trim_end_matches('/')
            .to_string();

        let smtp = match lookup("SMTP_HOST").filter(|v| !v.is_empty()) {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(&lookup, "SMTP_PORT", 587)?,
                username: lookup("SMTP_USERNAME").unwrap_or_default(),
                password: SecretString::from(lookup("SMTP_PASSWORD").unwrap_or_default()),
            }),
            None => None,
        };

        Ok(Self {
            port,
            db_path,
            responder_api_url: required("RESPONDER_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            ui_url: lookup("RESPONDER_UI_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            site_url: lookup("RESPONDER_SITE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            sender_name: lookup("RESPONDER_SENDER_NAME").unwrap_or_else(|| "Answer Bot".to_string()),
            default_email: lookup("RESPONDER_DEFAULT_EMAIL").filter(|v| !v.is_empty()),
            mailgun: MailgunConfig {
                api_key: SecretString::from(api_key),
                signing_key: SecretString::from(signing_key),
                domain,
                api_base,
            },
            smtp,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
