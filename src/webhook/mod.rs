//! Webhook server: signature check, delivery claim and routes.

pub mod params;
pub mod routes;
pub mod signature;

pub use params::WebhookParams;
pub use routes::{AppState, webhook_routes};
pub use signature::verify_signature;
