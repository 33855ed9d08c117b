//! Persistence layer: libSQL-backed storage for users and conversation records.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use model::{ConversationState, EmailEvent, FinalStage, QuestionStage, SuggestionStage, User};
pub use traits::Database;
