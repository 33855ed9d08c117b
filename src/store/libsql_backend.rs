//! libSQL backend for the async `Database` trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::responder::RankedAnswer;
use crate::store::migrations;
use crate::store::model::{EmailEvent, FinalStage, QuestionStage, SuggestionStage, User};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

const USER_COLUMNS: &str = "user_id, token, forward_email, verified_email";

const EVENT_COLUMNS: &str = "id, user_id, question_package, question_extracted_body, \
    question_sender, question_received_at, suggested_results, suggested_sender, suggested_at, \
    final_saved_reply_id, final_sender, final_at, created_at, updated_at";

fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    Ok(User {
        user_id: row.get(0)?,
        token: row.get(1)?,
        forward_email: row.get(2).ok(),
        verified_email: row.get(3).ok(),
    })
}

/// Map a libsql Row to an EmailEvent. Column order matches `EVENT_COLUMNS`.
fn row_to_event(row: &libsql::Row) -> Result<EmailEvent, DatabaseError> {
    let field = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));

    let id_str: String = row.get(0).map_err(field)?;
    let package_str: String = row.get(2).map_err(field)?;
    let received_str: String = row.get(5).map_err(field)?;
    let created_str: String = row.get(12).map_err(field)?;
    let updated_str: String = row.get(13).map_err(field)?;

    let package: serde_json::Value = serde_json::from_str(&package_str)
        .map_err(|e| DatabaseError::Serialization(format!("question_package: {e}")))?;

    let suggested_sender: Option<String> = row.get(7).ok();
    let suggestion = match suggested_sender {
        Some(sender) => {
            let results_str: Option<String> = row.get(6).ok();
            let results: Option<Vec<RankedAnswer>> = match results_str {
                Some(s) => serde_json::from_str(&s)
                    .map_err(|e| DatabaseError::Serialization(format!("suggested_results: {e}")))?,
                None => None,
            };
            let sent_at: Option<String> = row.get(8).ok();
            Some(SuggestionStage {
                results,
                sender,
                sent_at: sent_at.as_deref().map(parse_datetime).unwrap_or(DateTime::<Utc>::MIN_UTC),
            })
        }
        None => None,
    };

    let final_reply_id: Option<String> = row.get(9).ok();
    let final_answer = match final_reply_id {
        Some(saved_reply_id) => {
            let sender: Option<String> = row.get(10).ok();
            let sent_at: Option<String> = row.get(11).ok();
            Some(FinalStage {
                saved_reply_id,
                sender: sender.unwrap_or_default(),
                sent_at: sent_at.as_deref().map(parse_datetime).unwrap_or(DateTime::<Utc>::MIN_UTC),
            })
        }
        None => None,
    };

    Ok(EmailEvent {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("email event id: {e}")))?,
        user_id: row.get(1).map_err(field)?,
        question: QuestionStage {
            package,
            extracted_body: row.get(3).map_err(field)?,
            sender: row.get(4).map_err(field)?,
            received_at: parse_datetime(&received_str),
        },
        suggestion,
        final_answer,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user_by_token(&self, token: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE token = ?1"),
                params![token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_token: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_token: {e}"))),
        }
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_id: {e}"))),
        }
    }

    async fn upsert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO users (user_id, token, forward_email, verified_email)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    token = excluded.token,
                    forward_email = excluded.forward_email,
                    verified_email = excluded.verified_email",
                params![
                    user.user_id.clone(),
                    user.token.clone(),
                    opt_text_owned(user.forward_email.clone()),
                    opt_text_owned(user.verified_email.clone()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_user: {e}")))?;

        debug!(user_id = %user.user_id, "User upserted");
        Ok(())
    }

    // ── Conversation records ────────────────────────────────────────

    async fn insert_email_event(&self, event: &EmailEvent) -> Result<(), DatabaseError> {
        let package = serde_json::to_string(&event.question.package)
            .map_err(|e| DatabaseError::Serialization(format!("question_package: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO email_events (id, user_id, question_package, question_extracted_body,
                    question_sender, question_received_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.unique_id(),
                    event.user_id.clone(),
                    package,
                    event.question.extracted_body.clone(),
                    event.question.sender.clone(),
                    event.question.received_at.to_rfc3339(),
                    event.created_at.to_rfc3339(),
                    event.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_email_event: {e}")))?;

        debug!(id = %event.id, user_id = %event.user_id, "Email event inserted");
        Ok(())
    }

    async fn get_email_event(&self, id: Uuid) -> Result<Option<EmailEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM email_events WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_email_event: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_event(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_email_event: {e}"))),
        }
    }

    async fn update_email_event(&self, event: &EmailEvent) -> Result<(), DatabaseError> {
        let (suggested_results, suggested_sender, suggested_at) = match &event.suggestion {
            Some(stage) => (
                Some(serde_json::to_string(&stage.results).map_err(|e| {
                    DatabaseError::Serialization(format!("suggested_results: {e}"))
                })?),
                Some(stage.sender.clone()),
                Some(stage.sent_at.to_rfc3339()),
            ),
            None => (None, None, None),
        };
        let (final_id, final_sender, final_at) = match &event.final_answer {
            Some(stage) => (
                Some(stage.saved_reply_id.clone()),
                Some(stage.sender.clone()),
                Some(stage.sent_at.to_rfc3339()),
            ),
            None => (None, None, None),
        };

        let updated = self
            .conn()
            .execute(
                "UPDATE email_events SET
                    suggested_results = ?1, suggested_sender = ?2, suggested_at = ?3,
                    final_saved_reply_id = ?4, final_sender = ?5, final_at = ?6,
                    updated_at = ?7
                 WHERE id = ?8",
                params![
                    opt_text_owned(suggested_results),
                    opt_text_owned(suggested_sender),
                    opt_text_owned(suggested_at),
                    opt_text_owned(final_id),
                    opt_text_owned(final_sender),
                    opt_text_owned(final_at),
                    event.updated_at.to_rfc3339(),
                    event.unique_id(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_email_event: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "email_event".into(),
                id: event.unique_id(),
            });
        }

        debug!(id = %event.id, state = ?event.state(), "Email event updated");
        Ok(())
    }

    // ── Webhook deliveries ──────────────────────────────────────────

    async fn claim_delivery(&self, token: &str) -> Result<bool, DatabaseError> {
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO webhook_deliveries (token, received_at) VALUES (?1, ?2)",
                params![token, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("claim_delivery: {e}")))?;
        Ok(inserted > 0)
    }

    async fn release_delivery(&self, token: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM webhook_deliveries WHERE token = ?1",
                params![token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("release_delivery: {e}")))?;
        Ok(())
    }
}
