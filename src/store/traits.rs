//! `Database` trait, the single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::model::{EmailEvent, User};

/// Backend-agnostic store for users, conversation records and webhook deliveries.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Look up the user owning a receiving token.
    async fn get_user_by_token(&self, token: &str) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, DatabaseError>;

    /// Insert or replace a user. Users are provisioned outside the responder.
    async fn upsert_user(&self, user: &User) -> Result<(), DatabaseError>;

    // ── Conversation records ────────────────────────────────────────

    async fn insert_email_event(&self, event: &EmailEvent) -> Result<(), DatabaseError>;

    async fn get_email_event(&self, id: Uuid) -> Result<Option<EmailEvent>, DatabaseError>;

    /// Persist the suggestion and final stages of an existing record.
    async fn update_email_event(&self, event: &EmailEvent) -> Result<(), DatabaseError>;

    // ── Webhook deliveries ──────────────────────────────────────────

    /// Claim a webhook delivery token. Returns `false` if it was already claimed.
    async fn claim_delivery(&self, token: &str) -> Result<bool, DatabaseError>;

    /// Release a claim so a redelivery of the same webhook is processed.
    async fn release_delivery(&self, token: &str) -> Result<(), DatabaseError>;
}
