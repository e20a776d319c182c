//! REST API module for inbox-rs
//!
//! Provides HTTP endpoints for mailbox listings, messages and attachments

pub mod handlers;
pub mod server;

pub use server::ApiServer;
