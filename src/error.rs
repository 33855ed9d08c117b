//! Error types for the email responder.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Responder error: {0}")]
    Responder(#[from] ResponderError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised while authenticating and routing an inbound webhook.
///
/// These are user-facing: the message is returned to the webhook caller.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid value for parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Malformed recipient address: {0}")]
    MalformedRecipient(String),
}

/// Errors from the answer-ranking and saved-reply collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    #[error("Responder request {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    /// The collaborator answered with `success: false`.
    #[error("{message}")]
    Rejected { message: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send email via {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Self::Webhook(WebhookError::InvalidSignature) => StatusCode::UNAUTHORIZED,
            Self::Webhook(WebhookError::MissingParameter(name))
                if matches!(name.as_str(), "token" | "timestamp" | "signature") =>
            {
                StatusCode::UNAUTHORIZED
            }
            Self::Webhook(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Webhook handler failed");
        } else {
            tracing::warn!(error = %self, "Webhook rejected");
        }
        let body = serde_json::json!({
            "success": false,
            "result": { "message": self.to_string() },
        });
        (status, Json(body)).into_response()
    }
}
