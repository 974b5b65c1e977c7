//! Shared types and the decision engine for Pianta components.
//!
//! Everything here is pure: no I/O, no global state. The daemon gathers the
//! inputs, calls the model, and hands the raw text to `pipeline::produce_reply`.

pub mod attachments;
pub mod confidence;
pub mod error;
pub mod guardrail;
pub mod history;
pub mod ingest;
pub mod intent;
pub mod model_output;
pub mod pipeline;
pub mod prompt;
pub mod reconcile;
pub mod reply;
pub mod sanitize;
pub mod telemetry;

pub use error::PiantaError;
pub use history::{ConversationTurn, Role, StoredTurn};
pub use model_output::{LightAction, ModelDecision, Urgency, WaterAction};
pub use pipeline::{produce_reply, ChatContext, DecisionAudit, PlantProfile, ReplyOutcome};
pub use prompt::{build_prompt, PromptRequest};
pub use reconcile::ReconciledDecision;
pub use telemetry::{Prediction, TelemetryReading, Thresholds};

/// Config file path for piantad
pub const CONFIG_PATH: &str = "/etc/pianta/config.toml";

/// State directory for Pianta
pub const STATE_DIR: &str = "/var/lib/pianta";

/// Reply used when the model returns no text
pub const EMPTY_MODEL_REPLY: &str = "Non riesco a rispondere in questo momento.";
