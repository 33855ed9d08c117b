//! HTTP surface for Mailgun webhooks.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::get,
};
use secrecy::{ExposeSecret, SecretString};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::params::WebhookParams;
use super::signature::verify_signature;
use crate::error::Result;
use crate::pipeline::{EmailPipeline, Endpoint, WebhookReply};
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub pipeline: Arc<EmailPipeline>,
    /// Key Mailgun signs webhooks with.
    pub signing_key: SecretString,
}

/// Build the Axum router with the webhook and health routes.
pub fn webhook_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/email/inbound", get(inbound).post(inbound))
        .route("/email/question", get(question).post(question))
        .route("/email/new-reply", get(new_reply).post(new_reply))
        .route(
            "/email/request-correction",
            get(request_correction).post(request_correction),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "email-responder"
    }))
}

// ── Webhooks ────────────────────────────────────────────────────────────

async fn inbound(
    State(state): State<AppState>,
    WebhookParams(params): WebhookParams,
) -> Result<Json<WebhookReply>> {
    handle(&state, Endpoint::Inbound, &params).await
}

async fn question(
    State(state): State<AppState>,
    WebhookParams(params): WebhookParams,
) -> Result<Json<WebhookReply>> {
    handle(&state, Endpoint::Question, &params).await
}

async fn new_reply(
    State(state): State<AppState>,
    WebhookParams(params): WebhookParams,
) -> Result<Json<WebhookReply>> {
    handle(&state, Endpoint::NewReply, &params).await
}

async fn request_correction(
    State(state): State<AppState>,
    WebhookParams(params): WebhookParams,
) -> Result<Json<WebhookReply>> {
    handle(&state, Endpoint::RequestCorrection, &params).await
}

/// Verify, claim the delivery, then run the pipeline. A failed run
/// releases the claim so the provider's retry is processed.
async fn handle(
    state: &AppState,
    endpoint: Endpoint,
    params: &HashMap<String, String>,
) -> Result<Json<WebhookReply>> {
    let delivery = verify_signature(state.signing_key.expose_secret(), params)?;

    if !state.db.claim_delivery(&delivery).await? {
        info!(delivery = %delivery, "Duplicate webhook delivery ignored");
        return Ok(Json(WebhookReply::handled()));
    }

    match state.pipeline.process(endpoint, params).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            if let Err(release) = state.db.release_delivery(&delivery).await {
                warn!(delivery = %delivery, error = %release, "Failed to release delivery claim");
            }
            Err(e)
        }
    }
}
