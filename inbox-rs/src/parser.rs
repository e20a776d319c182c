//! RFC 5322 parsing adapter
//!
//! Builds a [`ParsedMessage`] from raw bytes using `mail-parser`.

use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::{InboxError, Result};
use crate::model::{Address, Attachment, ParsedMessage};

/// Parse raw message bytes
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| InboxError::Parse("unable to parse message".to_string()))?;

    let text = message.text_bodies().find_map(|part| match &part.body {
        PartType::Text(text) => Some(text.to_string()),
        _ => None,
    });

    let html = message.html_bodies().find_map(|part| match &part.body {
        PartType::Html(html) => Some(html.to_string()),
        _ => None,
    });

    let attachments = message
        .attachments()
        .enumerate()
        .map(|(idx, part)| {
            let file_name = part
                .attachment_name()
                .map(String::from)
                .unwrap_or_else(|| format!("attachment-{}", idx + 1));

            let content_type = part
                .content_type()
                .map(|ct: &mail_parser::ContentType| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let content_id = part.content_id().map(strip_angle_brackets);

            Attachment::from_bytes(content_id, file_name, content_type, part.contents())
        })
        .collect();

    Ok(ParsedMessage {
        subject: message.subject().map(String::from),
        from: addresses(message.from()),
        to: addresses(message.to()),
        cc: addresses(message.cc()),
        reply_to: addresses(message.reply_to()),
        text,
        html,
        attachments,
    })
}

fn addresses(header: Option<&mail_parser::Address<'_>>) -> Vec<Address> {
    header
        .map(|list| {
            list.iter()
                .filter_map(|addr| {
                    addr.address().map(|address| Address {
                        name: addr.name().unwrap_or_default().to_string(),
                        address: address.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn strip_angle_brackets(id: &str) -> String {
    id.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}
