//! Message store
//!
//! One SQLite table holds every message document. Three indexes are kept on
//! it:
//!
//! - `received` ascending, backing the expiry sweep
//! - `received` descending, for mailbox listings
//! - `mailbox`, for mailbox-scoped queries
//!
//! # Expiry
//! ```text
//! ┌────────┐             ┌──────────┐   every sweep_interval   ┌───────────┐
//! │ insert │ → received →│ messages │ ←──── DELETE WHERE ──────│  sweeper  │
//! └────────┘             └──────────┘   received < now - ttl   └───────────┘
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::codec::{self, Compressor, DeflateCompressor};
use crate::config::Config;
use crate::error::{InboxError, Result};
use crate::mailbox::{self, MessageDetail, MessageSummary};
use crate::model::{
    normalize_mailbox, Attachment, AttachmentContent, MessageDocument, NewMessage,
};
use crate::parser::parse_message;
use crate::sanitize::text_to_html;

/// Sweep period used when a zero interval is requested
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Settings the store is opened with
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Messages older than this are removed by the expiry sweep
    pub retention: Duration,
    /// Host used in attachment URLs
    pub hostname: String,
}

impl From<&Config> for StoreOptions {
    fn from(config: &Config) -> Self {
        Self {
            retention: config.retention(),
            hostname: config.server.hostname.clone(),
        }
    }
}

/// Handle to the message collection
#[derive(Clone)]
pub struct MessageStore {
    db: SqlitePool,
    compressor: Arc<dyn Compressor>,
    retention: Duration,
    hostname: Arc<str>,
}

impl MessageStore {
    /// Open the store, creating the table and all indexes first.
    ///
    /// Fails if any of them cannot be created.
    pub async fn open(db: SqlitePool, options: StoreOptions) -> Result<Self> {
        if options.retention.is_zero() {
            return Err(InboxError::Config(
                "message retention must be greater than zero".to_string(),
            ));
        }

        let store = Self {
            db,
            compressor: Arc::new(DeflateCompressor::default()),
            retention: options.retention,
            hostname: Arc::from(options.hostname),
        };
        store.init_db().await?;

        Ok(store)
    }

    /// Replace the compressor used for raw messages
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                mailbox TEXT NOT NULL,
                envelope_from TEXT NOT NULL,
                received INTEGER NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT 0,
                raw TEXT NOT NULL,
                rawsize INTEGER NOT NULL,
                message TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_received_expiry ON messages(received ASC)",
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_received ON messages(received DESC)")
            .execute(&self.db)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_mailbox ON messages(mailbox)")
            .execute(&self.db)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_settings WHERE key = 'expire_seconds'")
                .fetch_optional(&self.db)
                .await?;

        let expire_seconds = self.retention.as_secs().to_string();
        if let Some(previous) = previous.filter(|p| *p != expire_seconds) {
            info!(
                "Message retention changed from {}s to {}s",
                previous, expire_seconds
            );
        }

        sqlx::query(
            r#"
            INSERT INTO store_settings (key, value) VALUES ('expire_seconds', ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(&expire_seconds)
        .execute(&self.db)
        .await?;

        debug!("Message store ready (retention {}s)", expire_seconds);
        Ok(())
    }

    /// Parse a raw message and store it
    pub async fn ingest(
        &self,
        mailbox: &str,
        envelope_from: &str,
        raw: &[u8],
    ) -> Result<Option<String>> {
        let message = parse_message(raw)?;

        self.insert(NewMessage {
            mailbox: mailbox.to_string(),
            from: envelope_from.to_string(),
            raw: raw.to_vec(),
            message,
        })
        .await
    }

    /// Persist a new message.
    ///
    /// Returns `None` if the database accepted the statement but stored
    /// nothing.
    pub async fn insert(&self, new: NewMessage) -> Result<Option<String>> {
        let mailbox = normalize_mailbox(&new.mailbox);
        let mut message = new.message;

        if message.html.as_deref().map_or(true, str::is_empty) {
            message.html = message.text.as_deref().map(text_to_html);
        }

        let raw = codec::encode(self.compressor.as_ref(), &new.raw);
        let rawsize = new.raw.len() as i64;
        if raw.is_empty() {
            warn!(
                "Storing message for {} without raw content ({} bytes lost)",
                mailbox, rawsize
            );
        }

        let id = Uuid::new_v4().to_string();
        let received = Utc::now().trunc_subsecs(6);
        let message_json = serde_json::to_string(&message)?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO messages (
                id, mailbox, envelope_from, received, is_read, raw, rawsize, message
            ) VALUES (?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&mailbox)
        .bind(&new.from)
        .bind(received.timestamp_micros())
        .bind(&raw)
        .bind(rawsize)
        .bind(&message_json)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Message for {} was not stored", mailbox);
            return Ok(None);
        }

        info!("Stored message {} for {} ({} bytes)", id, mailbox, rawsize);
        Ok(Some(id))
    }

    /// Newest `limit` messages of a mailbox.
    ///
    /// Without `include_full_content` the HTML, text and attachments are
    /// dropped in the query itself.
    pub async fn list_by_mailbox(
        &self,
        mailbox: &str,
        include_full_content: bool,
        limit: u32,
    ) -> Result<Vec<MessageSummary>> {
        let projection = if include_full_content {
            "message"
        } else {
            "json_remove(message, '$.html', '$.text', '$.attachments')"
        };

        let query = format!(
            r#"
            SELECT id, mailbox, envelope_from, received, is_read, '' AS raw, rawsize,
                   {} AS message
            FROM messages
            WHERE mailbox = ?
            ORDER BY received DESC
            LIMIT ?
            "#,
            projection
        );

        let rows = sqlx::query(&query)
            .bind(normalize_mailbox(mailbox))
            .bind(i64::from(limit))
            .fetch_all(&self.db)
            .await?;

        rows.into_iter()
            .map(|row| {
                let doc = Self::row_to_document(row)?;
                Ok(mailbox::summarize(&doc, include_full_content, &self.hostname))
            })
            .collect()
    }

    /// Fetch the stored document as is
    pub async fn find_document(&self, id: &str) -> Result<Option<MessageDocument>> {
        let row = sqlx::query(
            r#"
            SELECT id, mailbox, envelope_from, received, is_read, raw, rawsize, message
            FROM messages
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    /// Full message view. Marks an unread message as read in the background.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<MessageDetail>> {
        let Some(doc) = self.find_document(id).await? else {
            return Ok(None);
        };

        if !doc.read {
            self.mark_read_in_background(&doc.id);
        }

        Ok(Some(mailbox::detail(&doc, &self.hostname)))
    }

    fn mark_read_in_background(&self, id: &str) {
        let store = self.clone();
        let id = id.to_string();

        tokio::spawn(async move {
            if let Err(e) = store.mark_read(&id).await {
                warn!("Failed to mark message {} as read: {}", id, e);
            }
        });
    }

    /// Set the read flag. Already-read messages are left untouched.
    pub async fn mark_read(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ? AND is_read = 0")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() > 0 {
            debug!("Marked message {} as read", id);
        }
        Ok(())
    }

    /// Original message bytes
    pub async fn get_raw_by_id(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT raw FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        raw.map(|raw| codec::decode(self.compressor.as_ref(), &raw))
            .transpose()
    }

    /// All attachments of a message with decoded content
    pub async fn get_attachments(&self, id: &str) -> Result<Option<Vec<AttachmentContent>>> {
        let json: Option<Option<String>> = sqlx::query_scalar(
            "SELECT json_extract(message, '$.attachments') FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        let Some(json) = json.flatten() else {
            return Ok(None);
        };

        let attachments: Vec<Attachment> = serde_json::from_str(&json)?;
        attachments
            .iter()
            .map(AttachmentContent::try_from)
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Attachment at position `index`
    pub async fn get_attachment(
        &self,
        id: &str,
        index: usize,
    ) -> Result<Option<AttachmentContent>> {
        let json: Option<Option<String>> =
            sqlx::query_scalar("SELECT json_extract(message, ?) FROM messages WHERE id = ?")
                .bind(format!("$.attachments[{}]", index))
                .bind(id)
                .fetch_optional(&self.db)
                .await?;

        let Some(json) = json.flatten() else {
            return Ok(None);
        };

        let attachment: Attachment = serde_json::from_str(&json)?;
        AttachmentContent::try_from(&attachment).map(Some)
    }

    /// Delete a message.
    ///
    /// Returns `true` once the store accepted the delete, whether or not the
    /// message existed.
    pub async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        debug!("Delete {} removed {} row(s)", id, result.rows_affected());
        Ok(true)
    }

    pub async fn count_by_mailbox(&self, mailbox: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE mailbox = ?")
            .bind(normalize_mailbox(mailbox))
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    /// Remove messages older than the retention window
    pub async fn purge_expired(&self) -> Result<u64> {
        self.purge_expired_at(Utc::now()).await
    }

    /// Remove messages received before `now - retention`
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let retention = chrono::Duration::from_std(self.retention)
            .map_err(|e| InboxError::Config(format!("invalid retention: {}", e)))?;
        let cutoff = now - retention;

        let result = sqlx::query("DELETE FROM messages WHERE received < ?")
            .bind(cutoff.timestamp_micros())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval`.
    ///
    /// A zero interval falls back to [`MIN_SWEEP_INTERVAL`].
    pub fn spawn_expiry_task(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let interval = if interval.is_zero() {
            warn!(
                "Expiry sweep interval is zero, using {:?}",
                MIN_SWEEP_INTERVAL
            );
            MIN_SWEEP_INTERVAL
        } else {
            interval
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => info!("Expired {} message(s)", removed),
                    Err(e) => error!("Message expiry failed: {}", e),
                }
            }
        })
    }

    fn row_to_document(row: SqliteRow) -> Result<MessageDocument> {
        let received_micros: i64 = row.try_get("received")?;
        let received = DateTime::from_timestamp_micros(received_micros).ok_or_else(|| {
            InboxError::Parse(format!("Invalid received timestamp: {}", received_micros))
        })?;

        let rawsize: i64 = row.try_get("rawsize")?;
        let message_json: String = row.try_get("message")?;

        Ok(MessageDocument {
            id: row.try_get("id")?,
            mailbox: row.try_get("mailbox")?,
            from: row.try_get("envelope_from")?,
            received,
            read: row.try_get("is_read")?,
            raw: row.try_get("raw")?,
            rawsize: rawsize as u64,
            message: serde_json::from_str(&message_json)?,
        })
    }
}
