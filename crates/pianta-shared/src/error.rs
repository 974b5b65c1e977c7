//! Error types for Pianta.
//!
//! The decision engine itself never fails on malformed input; these errors
//! cover the collaborators around it (model calls, storage, request intake).

use crate::attachments::AttachmentError;
use crate::ingest::IngestError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PiantaError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Model unavailable after fallback: {0}")]
    ModelExhausted(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PiantaError {
    pub fn code(&self) -> i32 {
        match self {
            PiantaError::InvalidInput(_) => -32602,
            PiantaError::Model(_) => -32003,
            PiantaError::ModelExhausted(_) => -32004,
            PiantaError::Store(_) => -32005,
            PiantaError::Io(_) => -32006,
            PiantaError::Json(_) => -32700,
            PiantaError::Internal(_) => -32603,
        }
    }

    /// HTTP status the daemon answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            PiantaError::InvalidInput(_) | PiantaError::Json(_) => 400,
            PiantaError::Model(_) | PiantaError::ModelExhausted(_) => 502,
            PiantaError::Store(_) | PiantaError::Io(_) | PiantaError::Internal(_) => 500,
        }
    }
}

impl From<IngestError> for PiantaError {
    fn from(e: IngestError) -> Self {
        PiantaError::InvalidInput(e.to_string())
    }
}

impl From<AttachmentError> for PiantaError {
    fn from(e: AttachmentError) -> Self {
        PiantaError::InvalidInput(e.to_string())
    }
}
