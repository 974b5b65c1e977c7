//! HTTP server for piantad

use crate::chat::ChatService;
use crate::config::DaemonConfig;
use crate::llm_client::ModelInvoker;
use crate::routes;
use crate::store::PlantStore;
use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Four base64 images of 5 MiB each, plus the JSON around them
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Application state shared across handlers
pub struct AppState {
    pub config: DaemonConfig,
    pub store: Arc<dyn PlantStore>,
    pub chat: ChatService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: DaemonConfig, store: Arc<dyn PlantStore>, model: Arc<dyn ModelInvoker>) -> Self {
        let chat = ChatService::new(
            Arc::clone(&store),
            model,
            config.llm.clone(),
            config.store.clone(),
        );
        Self {
            config,
            store,
            chat,
            start_time: Instant::now(),
        }
    }
}

/// Full router with CORS, body limit and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(routes::CHAT_SECRET_HEADER),
            header::HeaderName::from_static(routes::INGEST_SECRET_HEADER),
        ]);

    Router::new()
        .merge(routes::chat_routes())
        .merge(routes::ingest_routes())
        .merge(routes::health_routes())
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until ctrl-c
pub async fn run(state: AppState) -> Result<()> {
    let addr = state.config.server.listen.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down gracefully");
        })
        .await?;
    Ok(())
}
