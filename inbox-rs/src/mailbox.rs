//! Client-facing views of stored messages
//!
//! A [`MessageSummary`] is what a mailbox listing returns; a
//! [`MessageDetail`] is the full single-message view. Both carry HTML that
//! already went through [`crate::sanitize`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Address, MessageDocument};
use crate::sanitize::{decorate_attachments, sanitize_html, AttachmentView};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub mailbox: String,
    /// Envelope sender
    pub from: String,
    pub received: DateTime<Utc>,
    pub read: bool,
    pub rawsize: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_from: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentView>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    pub id: String,
    pub mailbox: String,
    pub from: String,
    pub received: DateTime<Utc>,
    pub read: bool,
    pub rawsize: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_from: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub attachments: Vec<AttachmentView>,
    /// Mailbox owner is listed in `to`
    pub direct: bool,
}

fn non_empty(list: &[Address]) -> Option<Vec<Address>> {
    if list.is_empty() {
        None
    } else {
        Some(list.to_vec())
    }
}

fn non_empty_str(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// True if any `to` address matches the mailbox, ignoring case and
/// surrounding whitespace
pub fn is_direct_recipient(mailbox: &str, to: &[Address]) -> bool {
    let mailbox = mailbox.trim().to_lowercase();
    to.iter()
        .any(|addr| addr.address.trim().to_lowercase() == mailbox)
}

/// Build a listing entry.
///
/// `html` and `attachments` are only projected with `include_full_content`.
pub fn summarize(doc: &MessageDocument, include_full_content: bool, hostname: &str) -> MessageSummary {
    let message = &doc.message;

    let (html, attachments) = if include_full_content {
        (
            message
                .html
                .as_deref()
                .map(|html| sanitize_html(html, &message.attachments, &doc.id, hostname)),
            Some(decorate_attachments(&message.attachments)),
        )
    } else {
        (None, None)
    };

    MessageSummary {
        id: doc.id.clone(),
        mailbox: doc.mailbox.clone(),
        from: doc.from.clone(),
        received: doc.received,
        read: doc.read,
        rawsize: doc.rawsize,
        subject: non_empty_str(&message.subject),
        header_from: non_empty(&message.from),
        to: non_empty(&message.to),
        cc: non_empty(&message.cc),
        reply_to: non_empty(&message.reply_to),
        html,
        attachments,
    }
}

/// Build the single-message view
pub fn detail(doc: &MessageDocument, hostname: &str) -> MessageDetail {
    let message = &doc.message;

    MessageDetail {
        id: doc.id.clone(),
        mailbox: doc.mailbox.clone(),
        from: doc.from.clone(),
        received: doc.received,
        read: doc.read,
        rawsize: doc.rawsize,
        subject: non_empty_str(&message.subject),
        header_from: non_empty(&message.from),
        to: non_empty(&message.to),
        cc: non_empty(&message.cc),
        reply_to: non_empty(&message.reply_to),
        text: message.text.clone(),
        html: message
            .html
            .as_deref()
            .map(|html| sanitize_html(html, &message.attachments, &doc.id, hostname)),
        attachments: decorate_attachments(&message.attachments),
        direct: is_direct_recipient(&doc.mailbox, &message.to),
    }
}
