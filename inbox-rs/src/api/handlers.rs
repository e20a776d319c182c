//! API request handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::InboxError;
use crate::store::MessageStore;

/// Default number of messages in a listing
const DEFAULT_LIST_LIMIT: u32 = 50;

/// Upper bound for `limit`
const MAX_LIST_LIMIT: u32 = 500;

/// Shared application state
pub struct AppState {
    pub store: MessageStore,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
        }
    }
}

impl IntoResponse for InboxError {
    fn into_response(self) -> Response {
        let status = match self {
            InboxError::Parse(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (status, Json(ApiError::new(&self.to_string()))).into_response()
    }
}

fn not_found(what: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(ApiError::new(what))).into_response()
}

/// Listing query parameters
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Include sanitized HTML and attachments
    #[serde(default)]
    pub full: bool,
    pub limit: Option<u32>,
}

/// Ingestion query parameters
#[derive(Debug, Deserialize)]
pub struct IngestParams {
    /// Envelope sender
    #[serde(default)]
    pub from: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /mailbox/:mailbox - Newest messages of a mailbox
pub async fn list_mailbox(
    State(state): State<Arc<AppState>>,
    Path(mailbox): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Response, InboxError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    let summaries = state
        .store
        .list_by_mailbox(&mailbox, params.full, limit)
        .await?;

    Ok(Json(summaries).into_response())
}

/// POST /mailbox/:mailbox - Store a raw RFC 5322 message
pub async fn ingest_message(
    State(state): State<Arc<AppState>>,
    Path(mailbox): Path<String>,
    Query(params): Query<IngestParams>,
    body: Bytes,
) -> Result<Response, InboxError> {
    match state.store.ingest(&mailbox, &params.from, &body).await? {
        Some(id) => Ok((StatusCode::CREATED, Json(IngestResponse { id })).into_response()),
        None => {
            warn!("Message for {} was not stored", mailbox);
            Ok((
                StatusCode::INSUFFICIENT_STORAGE,
                Json(ApiError::new("Message not stored")),
            )
                .into_response())
        }
    }
}

/// GET /message/:id - Single message
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, InboxError> {
    match state.store.get_by_id(&id).await? {
        Some(detail) => Ok(Json(detail).into_response()),
        None => Ok(not_found("Message not found")),
    }
}

/// GET /message/:id/raw - Original message bytes
pub async fn get_raw_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, InboxError> {
    match state.store.get_raw_by_id(&id).await? {
        Some(raw) => Ok(([(header::CONTENT_TYPE, "message/rfc822")], raw).into_response()),
        None => Ok(not_found("Message not found")),
    }
}

/// GET /attachment/:id/:index/:name - Attachment content
pub async fn get_attachment(
    State(state): State<Arc<AppState>>,
    Path((id, index, _name)): Path<(String, usize, String)>,
) -> Result<Response, InboxError> {
    match state.store.get_attachment(&id, index).await? {
        Some(attachment) => Ok((
            [(header::CONTENT_TYPE, attachment.content_type)],
            attachment.content,
        )
            .into_response()),
        None => Ok(not_found("Attachment not found")),
    }
}

/// DELETE /message/:id
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, InboxError> {
    let deleted = state.store.delete_by_id(&id).await?;
    Ok(Json(DeleteResponse { deleted }).into_response())
}
