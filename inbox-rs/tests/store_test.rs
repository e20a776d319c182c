//! Integration tests for the message store

use chrono::Utc;
use inbox_rs::codec::Compressor;
use inbox_rs::model::{Address, Attachment, NewMessage, ParsedMessage};
use inbox_rs::sanitize::text_to_html;
use inbox_rs::store::{MessageStore, StoreOptions};
use inbox_rs::InboxError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const RAW: &[u8] = b"From: Sender <sender@remote.test>\r\n\
To: User@Example.com\r\n\
Subject: Welcome\r\n\
\r\n\
Hello there\r\n";

/// Helper to create a file-backed database in a temporary directory
async fn setup_pool(dir: &TempDir) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("inbox.db"))
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .unwrap()
}

async fn setup_store_with_retention(retention: Duration) -> (MessageStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = setup_pool(&dir).await;

    let store = MessageStore::open(
        pool,
        StoreOptions {
            retention,
            hostname: "inbox.test".to_string(),
        },
    )
    .await
    .unwrap();

    (store, dir)
}

async fn setup_store() -> (MessageStore, TempDir) {
    setup_store_with_retention(Duration::from_secs(3600)).await
}

fn new_message(mailbox: &str, subject: &str) -> NewMessage {
    NewMessage {
        mailbox: mailbox.to_string(),
        from: "sender@remote.test".to_string(),
        raw: format!("Subject: {}\r\n\r\nbody\r\n", subject).into_bytes(),
        message: ParsedMessage {
            subject: Some(subject.to_string()),
            from: vec![Address::new("Sender", "sender@remote.test")],
            to: vec![Address::new("", mailbox)],
            text: Some("body".to_string()),
            html: Some(format!("<p>{}</p>", subject)),
            ..Default::default()
        },
    }
}

fn message_with_attachments() -> NewMessage {
    let mut new = new_message("user@example.com", "With attachments");
    new.message.html = Some(
        r#"<p>Logo <img src="cid:logo" onerror="steal()"></p><script>alert(1)</script>"#
            .to_string(),
    );
    new.message.attachments = vec![
        Attachment::from_bytes(Some("logo".to_string()), "logo.png", "image/png", b"PNGDATA"),
        Attachment::from_bytes(None, "report.pdf", "application/pdf", b"%PDF-1.4"),
    ];
    new
}

async fn wait_until_read(store: &MessageStore, id: &str) -> bool {
    for _ in 0..100 {
        let doc = store.find_document(id).await.unwrap().unwrap();
        if doc.read {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_insert_and_find_document() {
    let (store, _dir) = setup_store().await;
    let new = new_message("  User@Example.COM ", "Hello");
    let raw = new.raw.clone();
    let message = new.message.clone();

    let id = store.insert(new).await.unwrap().unwrap();
    let doc = store.find_document(&id).await.unwrap().unwrap();

    assert_eq!(doc.id, id);
    assert_eq!(doc.mailbox, "user@example.com");
    assert_eq!(doc.from, "sender@remote.test");
    assert!(!doc.read);
    assert_eq!(doc.rawsize, raw.len() as u64);
    assert!(!doc.raw.is_empty());
    assert_eq!(doc.message, message);
    assert!(doc.received <= Utc::now());

    assert_eq!(store.get_raw_by_id(&id).await.unwrap().unwrap(), raw);
}

#[tokio::test]
async fn test_text_only_message_gets_html_fallback() {
    let (store, _dir) = setup_store().await;
    let mut new = new_message("user@example.com", "Plain");
    new.message.html = None;
    new.message.text = Some("Hi\n> quoted".to_string());

    let id = store.insert(new).await.unwrap().unwrap();
    let doc = store.find_document(&id).await.unwrap().unwrap();

    assert_eq!(doc.message.html, Some(text_to_html("Hi\n> quoted")));
    assert_eq!(
        doc.message.html.as_deref(),
        Some("Hi<blockquote>quoted</blockquote>")
    );
}

struct FailingCompressor;

impl Compressor for FailingCompressor {
    fn compress(&self, _bytes: &[u8]) -> inbox_rs::Result<Vec<u8>> {
        Err(InboxError::Codec("compression disabled".to_string()))
    }

    fn decompress(&self, _bytes: &[u8]) -> inbox_rs::Result<Vec<u8>> {
        Err(InboxError::Codec("compression disabled".to_string()))
    }
}

#[tokio::test]
async fn test_compression_failure_keeps_rawsize() {
    let (store, _dir) = setup_store().await;
    let store = store.with_compressor(Arc::new(FailingCompressor));

    let new = new_message("user@example.com", "Lost raw");
    let raw_len = new.raw.len() as u64;

    let id = store.insert(new).await.unwrap().unwrap();
    let doc = store.find_document(&id).await.unwrap().unwrap();

    assert_eq!(doc.raw, "");
    assert_eq!(doc.rawsize, raw_len);
    assert!(doc.rawsize > 0);

    // The message itself is still readable
    assert!(store.get_by_id(&id).await.unwrap().is_some());

    // Raw retrieval cannot succeed
    assert!(matches!(
        store.get_raw_by_id(&id).await,
        Err(InboxError::Codec(_))
    ));
}

#[tokio::test]
async fn test_list_order_and_limit() {
    let (store, _dir) = setup_store().await;

    for i in 0..5 {
        store
            .insert(new_message("user@example.com", &format!("Message {}", i)))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let summaries = store
        .list_by_mailbox(" USER@example.com", false, 3)
        .await
        .unwrap();

    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[0].subject.as_deref(), Some("Message 4"));
    assert_eq!(summaries[2].subject.as_deref(), Some("Message 2"));
    for pair in summaries.windows(2) {
        assert!(pair[0].received > pair[1].received);
    }
}

#[tokio::test]
async fn test_list_is_scoped_to_mailbox() {
    let (store, _dir) = setup_store().await;

    store.insert(new_message("a@example.com", "For A")).await.unwrap();
    store.insert(new_message("b@example.com", "For B")).await.unwrap();

    let summaries = store.list_by_mailbox("a@example.com", false, 10).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].subject.as_deref(), Some("For A"));

    assert!(store
        .list_by_mailbox("nobody@example.com", true, 10)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(store.count_by_mailbox("B@EXAMPLE.COM").await.unwrap(), 1);
}

#[tokio::test]
async fn test_list_projection_depends_on_full_content() {
    let (store, _dir) = setup_store().await;
    let id = store.insert(message_with_attachments()).await.unwrap().unwrap();

    let brief = store.list_by_mailbox("user@example.com", false, 10).await.unwrap();
    assert_eq!(brief[0].id, id);
    assert!(brief[0].html.is_none());
    assert!(brief[0].attachments.is_none());
    assert_eq!(brief[0].subject.as_deref(), Some("With attachments"));
    assert!(brief[0].to.is_some());
    assert!(brief[0].cc.is_none());

    let full = store.list_by_mailbox("user@example.com", true, 10).await.unwrap();
    let html = full[0].html.as_deref().unwrap();
    assert_eq!(
        html,
        format!(
            r#"<p>Logo <img src="http://inbox.test/attachment/{}/0/logo.png"></p>"#,
            id
        )
    );
    assert_eq!(full[0].attachments.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn test_get_by_id_detail() {
    let (store, _dir) = setup_store().await;
    let id = store.insert(message_with_attachments()).await.unwrap().unwrap();

    let detail = store.get_by_id(&id).await.unwrap().unwrap();

    assert_eq!(detail.id, id);
    assert!(detail.direct);
    assert!(!detail.html.as_deref().unwrap().contains("<script"));
    assert!(!detail.html.as_deref().unwrap().contains("onerror"));
    assert_eq!(detail.attachments[0].index, 0);
    assert_eq!(detail.attachments[1].index, 1);
    assert_eq!(detail.attachments[1].file_name, "report.pdf");
}

#[tokio::test]
async fn test_direct_flag_false_when_only_cc() {
    let (store, _dir) = setup_store().await;
    let mut new = new_message("user@example.com", "Cc only");
    new.message.to = vec![Address::new("", "someone@else.test")];
    new.message.cc = vec![Address::new("", "user@example.com")];

    let id = store.insert(new).await.unwrap().unwrap();
    let detail = store.get_by_id(&id).await.unwrap().unwrap();
    assert!(!detail.direct);
}

#[tokio::test]
async fn test_read_flag_flips_once() {
    let (store, _dir) = setup_store().await;
    let id = store
        .insert(new_message("user@example.com", "Unread"))
        .await
        .unwrap()
        .unwrap();

    let first = store.get_by_id(&id).await.unwrap().unwrap();
    assert!(!first.read);
    assert!(wait_until_read(&store, &id).await);

    let second = store.get_by_id(&id).await.unwrap().unwrap();
    assert!(second.read);

    let listed = store.list_by_mailbox("user@example.com", false, 1).await.unwrap();
    assert!(listed[0].read);
}

#[tokio::test]
async fn test_listing_does_not_mark_read() {
    let (store, _dir) = setup_store().await;
    let id = store
        .insert(new_message("user@example.com", "Listed"))
        .await
        .unwrap()
        .unwrap();

    store.list_by_mailbox("user@example.com", true, 10).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let doc = store.find_document(&id).await.unwrap().unwrap();
    assert!(!doc.read);
}

#[tokio::test]
async fn test_missing_ids_are_not_errors() {
    let (store, _dir) = setup_store().await;

    assert!(store.get_by_id("missing").await.unwrap().is_none());
    assert!(store.find_document("missing").await.unwrap().is_none());
    assert!(store.get_raw_by_id("missing").await.unwrap().is_none());
    assert!(store.get_attachments("missing").await.unwrap().is_none());
    assert!(store.get_attachment("missing", 0).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_attachments_decodes_content() {
    let (store, _dir) = setup_store().await;
    let id = store.insert(message_with_attachments()).await.unwrap().unwrap();

    let attachments = store.get_attachments(&id).await.unwrap().unwrap();
    assert_eq!(attachments.len(), 2);
    assert_eq!(attachments[0].content, b"PNGDATA".to_vec());
    assert_eq!(attachments[0].content_id.as_deref(), Some("logo"));
    assert_eq!(attachments[1].content, b"%PDF-1.4".to_vec());

    let second = store.get_attachment(&id, 1).await.unwrap().unwrap();
    assert_eq!(second.file_name, "report.pdf");
    assert_eq!(second.content_type, "application/pdf");
    assert!(store.get_attachment(&id, 2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_attachments_empty_list() {
    let (store, _dir) = setup_store().await;
    let id = store
        .insert(new_message("user@example.com", "No attachments"))
        .await
        .unwrap()
        .unwrap();

    let attachments = store.get_attachments(&id).await.unwrap().unwrap();
    assert!(attachments.is_empty());
}

#[tokio::test]
async fn test_delete_by_id() {
    let (store, _dir) = setup_store().await;
    let id = store
        .insert(new_message("user@example.com", "Doomed"))
        .await
        .unwrap()
        .unwrap();

    assert!(store.delete_by_id(&id).await.unwrap());
    assert!(store.get_by_id(&id).await.unwrap().is_none());

    // Accepted even when nothing is left to delete
    assert!(store.delete_by_id(&id).await.unwrap());
}

#[tokio::test]
async fn test_purge_expired_at() {
    let (store, _dir) = setup_store().await;
    let id = store
        .insert(new_message("user@example.com", "Old"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(store.purge_expired_at(Utc::now()).await.unwrap(), 0);
    assert!(store.find_document(&id).await.unwrap().is_some());

    let later = Utc::now() + chrono::Duration::hours(2);
    assert_eq!(store.purge_expired_at(later).await.unwrap(), 1);
    assert!(store.find_document(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_expiry_task_removes_old_messages() {
    let (store, _dir) = setup_store_with_retention(Duration::from_secs(1)).await;
    let id = store
        .insert(new_message("user@example.com", "Short lived"))
        .await
        .unwrap()
        .unwrap();

    let sweeper = store.spawn_expiry_task(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(1600)).await;
    sweeper.abort();

    assert!(store.find_document(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_open_rejects_zero_retention() {
    let dir = tempfile::tempdir().unwrap();
    let pool = setup_pool(&dir).await;

    let result = MessageStore::open(
        pool,
        StoreOptions {
            retention: Duration::ZERO,
            hostname: "inbox.test".to_string(),
        },
    )
    .await;

    assert!(matches!(result, Err(InboxError::Config(_))));
}

#[tokio::test]
async fn test_reopen_keeps_documents() {
    let dir = tempfile::tempdir().unwrap();

    let store = MessageStore::open(
        setup_pool(&dir).await,
        StoreOptions {
            retention: Duration::from_secs(60),
            hostname: "inbox.test".to_string(),
        },
    )
    .await
    .unwrap();
    let id = store
        .insert(new_message("user@example.com", "Persisted"))
        .await
        .unwrap()
        .unwrap();

    let reopened = MessageStore::open(
        setup_pool(&dir).await,
        StoreOptions {
            retention: Duration::from_secs(120),
            hostname: "inbox.test".to_string(),
        },
    )
    .await
    .unwrap();

    assert_eq!(reopened.retention(), Duration::from_secs(120));
    assert!(reopened.find_document(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_ingest_raw_message() {
    let (store, _dir) = setup_store().await;

    let id = store
        .ingest("user@example.com", "bounce@remote.test", RAW)
        .await
        .unwrap()
        .unwrap();

    let detail = store.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(detail.from, "bounce@remote.test");
    assert_eq!(detail.subject.as_deref(), Some("Welcome"));
    assert_eq!(detail.header_from.as_ref().unwrap()[0].address, "sender@remote.test");
    assert!(detail.direct);
    assert!(detail.html.as_deref().unwrap().contains("Hello there"));
    assert_eq!(detail.rawsize, RAW.len() as u64);

    assert_eq!(store.get_raw_by_id(&id).await.unwrap().unwrap(), RAW.to_vec());
}

#[tokio::test]
async fn test_mark_read_is_awaitable_and_idempotent() {
    let (store, _dir) = setup_store().await;
    let id = store
        .insert(new_message("user@example.com", "Mark me"))
        .await
        .unwrap()
        .unwrap();

    store.mark_read(&id).await.unwrap();
    assert!(store.find_document(&id).await.unwrap().unwrap().read);

    // Repeating it, or naming an unknown id, is not an error
    store.mark_read(&id).await.unwrap();
    store.mark_read("missing").await.unwrap();
    assert!(store.find_document(&id).await.unwrap().unwrap().read);
}

#[tokio::test]
async fn test_listing_and_lookup_read_raw_column_strictly() {
    let (store, dir) = setup_store().await;
    let id = store
        .insert(new_message("user@example.com", "Raw column"))
        .await
        .unwrap()
        .unwrap();

    // The listing does not carry raw content but still maps every row
    let summaries = store.list_by_mailbox("user@example.com", true, 10).await.unwrap();
    assert_eq!(summaries.len(), 1);

    // A non-text raw value surfaces as an error instead of an empty string
    sqlx::query("UPDATE messages SET raw = ? WHERE id = ?")
        .bind(vec![0xffu8, 0xfe])
        .bind(&id)
        .execute(&setup_pool(&dir).await)
        .await
        .unwrap();
    assert!(matches!(
        store.find_document(&id).await,
        Err(InboxError::Database(_))
    ));
}

#[tokio::test]
async fn test_expiry_task_with_zero_interval_keeps_running() {
    let (store, _dir) = setup_store().await;

    let sweeper = store.spawn_expiry_task(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!sweeper.is_finished());
    sweeper.abort();
}
