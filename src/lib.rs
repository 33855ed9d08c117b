//! Email responder: answers questions sent by email through a ranking service.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod responder;
pub mod store;
pub mod webhook;
