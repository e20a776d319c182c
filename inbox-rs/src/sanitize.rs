//! Output sanitizer for stored message HTML
//!
//! Performs a fixed set of rewrites on message HTML before it is handed to a
//! client:
//!
//! - `cid:` references in `src`/`href` attributes become attachment URLs
//! - `<script>` blocks are removed
//! - `on*=` event handler attributes are removed
//!
//! This is not a general purpose HTML sanitizer.

use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::OnceLock;

use crate::model::Attachment;

/// Stand-in for line terminators while script blocks are matched
const LINE_SENTINEL: char = '\u{1}';

fn content_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?P<attr>src|href)(?P<eq>\s*=\s*)(?P<quote>["']?)(?P<scheme>cid:)(?P<cid>[^"'\s>]+)"#)
            .expect("content reference pattern")
    })
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<script\b[^>]*>.*?</script\s*>").expect("script pattern")
    })
}

fn event_handler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(?P<sep>\s+|[/"'])on[a-z]{3,}\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*)"#,
        )
            .expect("event handler pattern")
    })
}

fn line_terminator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r\n|\r|\n").expect("line terminator pattern"))
}

/// Attachment metadata with its public index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

/// Escape `<` and `>` in a file name
pub fn escape_file_name(name: &str) -> String {
    name.replace('<', "&lt;").replace('>', "&gt;")
}

/// Public URL of the attachment at `index` of message `message_id`
pub fn attachment_url(hostname: &str, message_id: &str, index: usize, file_name: &str) -> String {
    format!(
        "http://{}/attachment/{}/{}/{}",
        hostname,
        message_id,
        index,
        escape_file_name(file_name)
    )
}

/// Rewrite `src="cid:..."` / `href="cid:..."` to attachment URLs.
///
/// The first attachment whose content id equals the referenced id wins.
/// Unknown ids are left as they were.
pub fn resolve_content_references(
    html: &str,
    attachments: &[Attachment],
    message_id: &str,
    hostname: &str,
) -> String {
    content_reference_re()
        .replace_all(html, |caps: &Captures| {
            let cid = &caps["cid"];
            let found = attachments
                .iter()
                .enumerate()
                .find(|(_, a)| a.content_id.as_deref() == Some(cid));

            match found {
                Some((index, attachment)) => format!(
                    "{}{}{}{}",
                    &caps["attr"],
                    &caps["eq"],
                    &caps["quote"],
                    attachment_url(hostname, message_id, index, &attachment.file_name)
                ),
                None => format!(
                    "{}{}{}{}{}",
                    &caps["attr"],
                    &caps["eq"],
                    &caps["quote"],
                    &caps["scheme"],
                    cid
                ),
            }
        })
        .into_owned()
}

/// Remove script blocks and event handler attributes.
///
/// The script pattern is lazy: a block ends at the first `</script>` after
/// its opening tag, so nested or malformed blocks can leave a tail behind.
pub fn strip_unsafe(html: &str) -> String {
    let sentinel = LINE_SENTINEL.to_string();
    let collapsed = line_terminator_re().replace_all(html, sentinel.as_str());
    let without_scripts = script_re().replace_all(&collapsed, "");
    let restored = without_scripts.replace(LINE_SENTINEL, "\n");
    let without_handlers = event_handler_re().replace_all(&restored, |caps: &Captures| {
        // a `/` or closing quote still separates the surrounding attributes
        let sep = &caps["sep"];
        if sep.trim().is_empty() {
            String::new()
        } else {
            sep.to_string()
        }
    });

    without_handlers.trim().to_string()
}

/// Reference resolution followed by [`strip_unsafe`]
pub fn sanitize_html(
    html: &str,
    attachments: &[Attachment],
    message_id: &str,
    hostname: &str,
) -> String {
    strip_unsafe(&resolve_content_references(
        html,
        attachments,
        message_id,
        hostname,
    ))
}

/// Attachment views numbered by position
pub fn decorate_attachments(attachments: &[Attachment]) -> Vec<AttachmentView> {
    attachments
        .iter()
        .enumerate()
        .map(|(index, a)| AttachmentView {
            index,
            content_id: a.content_id.clone(),
            file_name: a.file_name.clone(),
            content_type: a.content_type.clone(),
            size: a.size,
        })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Number of `>` quote markers and the remaining line
fn quote_level(line: &str) -> (usize, &str) {
    let mut level = 0;
    let mut rest = line;
    while let Some(after) = rest.trim_start_matches(' ').strip_prefix('>') {
        level += 1;
        rest = after;
    }
    if level > 0 {
        rest = rest.strip_prefix(' ').unwrap_or(rest);
    }
    (level, rest)
}

fn indent_line(line: &str) -> String {
    let body = line.trim_start_matches([' ', '\t']);
    let mut out = String::new();
    for c in line[..line.len() - body.len()].chars() {
        match c {
            '\t' => out.push_str("&nbsp;&nbsp;&nbsp;&nbsp;"),
            _ => out.push_str("&nbsp;"),
        }
    }
    out.push_str(&escape_html(body));
    out
}

/// Render a plain text body as HTML.
///
/// Quoted lines (`> `) become nested blockquotes and leading indentation is
/// kept.
pub fn text_to_html(text: &str) -> String {
    let mut out = String::new();
    let mut depth = 0;
    let mut block_start = true;

    for line in text.lines() {
        let (level, content) = quote_level(line);

        while depth < level {
            out.push_str("<blockquote>");
            depth += 1;
            block_start = true;
        }
        while depth > level {
            out.push_str("</blockquote>");
            depth -= 1;
            block_start = true;
        }

        if !block_start {
            out.push_str("<br/>");
        }
        out.push_str(&indent_line(content));
        block_start = false;
    }

    while depth > 0 {
        out.push_str("</blockquote>");
        depth -= 1;
    }

    out
}
