//! inbox-rs: Ephemeral mailbox store
//!
//! Stores parsed email messages under a mailbox key, expires them after a
//! retention window and serves sanitized views of them.
//!
//! # Features
//!
//! - **Storage**: SQLite-backed message documents with mailbox and time indexes
//! - **Expiry**: Background sweep removing messages older than the retention window
//! - **Raw retrieval**: Original bytes kept zlib-compressed for verbatim download
//! - **Sanitized views**: `cid:` references resolved to attachment URLs,
//!   scripts and event handlers stripped
//!
//! # Example
//!
//! ```no_run
//! use inbox_rs::store::{MessageStore, StoreOptions};
//! use sqlx::SqlitePool;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SqlitePool::connect("sqlite://inbox.db?mode=rwc").await?;
//!     let store = MessageStore::open(
//!         pool,
//!         StoreOptions {
//!             retention: Duration::from_secs(3600),
//!             hostname: "localhost:8080".to_string(),
//!         },
//!     )
//!     .await?;
//!
//!     let raw = b"From: a@example.com\r\nSubject: Hi\r\n\r\nHello\r\n";
//!     let id = store.ingest("user@example.com", "a@example.com", raw).await?;
//!     println!("stored {:?}", id);
//!
//!     for summary in store.list_by_mailbox("user@example.com", false, 10).await? {
//!         println!("{} {:?}", summary.id, summary.subject);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`codec`]: Raw message compression
//! - [`sanitize`]: HTML rewrites for safe rendering
//! - [`store`]: Message persistence and expiry
//! - [`mailbox`]: Summary and detail views
//! - [`parser`]: RFC 5322 parsing adapter
//! - [`db`]: Connection pool setup
//! - [`api`]: HTTP endpoints

pub mod api;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod mailbox;
pub mod model;
pub mod parser;
pub mod sanitize;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{InboxError, Result};
pub use store::{MessageStore, StoreOptions};
