//! Stored message document and its parsed content

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InboxError, Result};

/// A single `{name, address}` entry of an address header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub name: String,
    pub address: String,
}

impl Address {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Attachment as persisted inside the message document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Content-ID without angle brackets, used by `cid:` references
    #[serde(default)]
    pub content_id: Option<String>,
    /// Generated file name
    pub file_name: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Decoded size in bytes
    #[serde(default)]
    pub size: u64,
    /// Base64 encoded content
    #[serde(default)]
    pub content: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

impl Attachment {
    pub fn from_bytes(
        content_id: Option<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        Self {
            content_id,
            file_name: file_name.into(),
            content_type: content_type.into(),
            size: bytes.len() as u64,
            content: BASE64.encode(bytes),
        }
    }

    pub fn decode_content(&self) -> Result<Vec<u8>> {
        BASE64.decode(self.content.as_bytes()).map_err(|e| {
            InboxError::Codec(format!("attachment {} content: {}", self.file_name, e))
        })
    }
}

/// Parsed structure of a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub from: Vec<Address>,
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    #[serde(default)]
    pub reply_to: Vec<Address>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Input of the ingestion path
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub mailbox: String,
    /// Envelope sender
    pub from: String,
    pub raw: Vec<u8>,
    pub message: ParsedMessage,
}

/// The persisted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDocument {
    pub id: String,
    pub mailbox: String,
    pub from: String,
    pub received: DateTime<Utc>,
    pub read: bool,
    /// Codec-encoded raw message, empty if compression failed
    pub raw: String,
    /// Length of the original raw message
    pub rawsize: u64,
    pub message: ParsedMessage,
}

/// Attachment with its decoded bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentContent {
    pub content_id: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl TryFrom<&Attachment> for AttachmentContent {
    type Error = InboxError;

    fn try_from(attachment: &Attachment) -> Result<Self> {
        Ok(Self {
            content_id: attachment.content_id.clone(),
            file_name: attachment.file_name.clone(),
            content_type: attachment.content_type.clone(),
            content: attachment.decode_content()?,
        })
    }
}

/// Lowercase and trim a mailbox key
pub fn normalize_mailbox(mailbox: &str) -> String {
    mailbox.trim().to_lowercase()
}
