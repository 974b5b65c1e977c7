//! piantad - plant chat and telemetry daemon
//!
//! Exposed as a library so integration tests can drive the router directly.

pub mod chat;
pub mod config;
pub mod llm_client;
pub mod routes;
pub mod server;
pub mod store;

pub use chat::{ChatError, ChatRequest, ChatResponse, ChatService};
pub use config::DaemonConfig;
pub use llm_client::{AnthropicClient, ModelError, ModelInvoker, ScriptedModel};
pub use server::{router, AppState};
pub use store::{MemoryStore, PlantStore, SqliteStore};
