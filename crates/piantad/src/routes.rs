//! API routes for piantad
//!
//! Error bodies are `{"error": ..., "detail"?: ...}`.

use crate::chat::{ChatError, ChatRequest, ChatResponse};
use crate::server::AppState;
use crate::store::InsertedReading;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use pianta_shared::ingest::validate_reading;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

type AppStateArc = Arc<AppState>;

pub const CHAT_SECRET_HEADER: &str = "x-chat-secret";
pub const INGEST_SECRET_HEADER: &str = "x-ingest-secret";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Set when a reply was produced but could not be stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, error: &str, detail: Option<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            detail,
            reply: None,
        }),
    )
}

fn status_of(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Secret check, skipped when no secret is configured.
fn check_secret(headers: &HeaderMap, name: &str, secret: &str) -> Result<(), ApiError> {
    if secret.is_empty() {
        return Ok(());
    }
    let given = headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("");
    if given == secret {
        Ok(())
    } else {
        warn!("[!]  rejected request without valid {}", name);
        Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized", None))
    }
}

fn parse_json(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid JSON", None))
}

// ============================================================================
// Chat Routes
// ============================================================================

pub fn chat_routes() -> Router<AppStateArc> {
    Router::new().route("/chat", post(chat))
}

async fn chat(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatResponse>, ApiError> {
    check_secret(&headers, CHAT_SECRET_HEADER, &state.config.auth.chat_secret)?;
    let payload = parse_json(&body)?;
    let request: ChatRequest = serde_json::from_value(payload).map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
    })?;

    match state.chat.handle(request).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            let status = status_of(err.status());
            let body = match err {
                ChatError::MissingMessage => ErrorBody {
                    error: "Missing message".into(),
                    detail: None,
                    reply: None,
                },
                ChatError::Rejected(e) => {
                    info!("  chat rejected: {}", e);
                    ErrorBody {
                        error: e.to_string(),
                        detail: None,
                        reply: None,
                    }
                }
                ChatError::Model(e) => {
                    error!("  model call failed: {}", e);
                    ErrorBody {
                        error: "Anthropic error".into(),
                        detail: Some(e.to_string()),
                        reply: None,
                    }
                }
                ChatError::Persist { source, response } => {
                    error!("  persisting chat failed: {}", source);
                    ErrorBody {
                        error: "Failed to persist chat messages".into(),
                        detail: Some(source.to_string()),
                        reply: Some(response.reply),
                    }
                }
            };
            Err((status, Json(body)))
        }
    }
}

// ============================================================================
// Ingest Routes
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub data: Vec<InsertedReading>,
}

pub fn ingest_routes() -> Router<AppStateArc> {
    Router::new().route("/ingest", post(ingest))
}

async fn ingest(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    check_secret(&headers, INGEST_SECRET_HEADER, &state.config.auth.ingest_secret)?;
    let payload = parse_json(&body)?;
    let reading = validate_reading(&payload)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, &e.to_string(), None))?;

    let inserted = state.store.insert_reading(&reading).await.map_err(|e| {
        error!("  storing reading failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), None)
    })?;
    info!("  reading {} stored for plant {}", inserted.id, reading.plant_id);

    Ok(Json(IngestResponse {
        ok: true,
        data: vec![inserted],
    }))
}

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
