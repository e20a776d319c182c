//! API Server - HTTP server for the mailbox API

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{self, AppState};
use crate::store::MessageStore;

/// API Server configuration
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(store: MessageStore, addr: String) -> Self {
        let state = Arc::new(AppState { store });
        Self { state, addr }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/mailbox/:mailbox",
                get(handlers::list_mailbox).post(handlers::ingest_message),
            )
            .route(
                "/message/:id",
                get(handlers::get_message).delete(handlers::delete_message),
            )
            .route("/message/:id/raw", get(handlers::get_raw_message))
            .route("/attachment/:id/:index/:name", get(handlers::get_attachment))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Start the API server
    pub async fn run(&self) -> std::io::Result<()> {
        let router = self.router();

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
