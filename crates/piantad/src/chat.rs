//! Chat request handling: gather context, call the model, reconcile, persist.

use crate::config::{LlmConfig, StoreConfig};
use crate::llm_client::{invoke_with_fallback, ModelInvoker};
use crate::store::{PlantRecord, PlantStore};
use chrono::{DateTime, Utc};
use pianta_shared::attachments::{validate_images, ImageAttachment};
use pianta_shared::ingest::plant_id_text;
use pianta_shared::sanitize::sanitize_text;
use pianta_shared::{
    build_prompt, produce_reply, ChatContext, DecisionAudit, PiantaError, PlantProfile, Prediction,
    TelemetryReading,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "plantId")]
    pub plant_id: Option<Value>,
    #[serde(default)]
    pub plant: Option<PlantProfile>,
    #[serde(default)]
    pub reading: Option<TelemetryReading>,
    /// Optional history for the trend line; read from the store when absent
    #[serde(default)]
    pub readings: Vec<TelemetryReading>,
    #[serde(default)]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
}

impl ChatRequest {
    pub fn plant_key(&self) -> Option<String> {
        self.plant_id.as_ref().and_then(plant_id_text)
    }
}

/// Body of a successful `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub needs_photo: bool,
    pub confidence: f64,
    pub needs_follow_up: bool,
    pub follow_up_due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Missing message")]
    MissingMessage,

    #[error("{0}")]
    Rejected(PiantaError),

    #[error("Anthropic error")]
    Model(PiantaError),

    /// The reply was produced but the turns could not be stored.
    #[error("Failed to persist chat messages")]
    Persist {
        source: PiantaError,
        response: ChatResponse,
    },
}

impl ChatError {
    pub fn status(&self) -> u16 {
        match self {
            ChatError::MissingMessage => 400,
            ChatError::Rejected(e) | ChatError::Model(e) => e.http_status(),
            ChatError::Persist { .. } => 500,
        }
    }
}

pub struct ChatService {
    store: Arc<dyn PlantStore>,
    model: Arc<dyn ModelInvoker>,
    llm: LlmConfig,
    limits: StoreConfig,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn PlantStore>,
        model: Arc<dyn ModelInvoker>,
        llm: LlmConfig,
        limits: StoreConfig,
    ) -> Self {
        Self {
            store,
            model,
            llm,
            limits,
        }
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        self.handle_at(request, Utc::now()).await
    }

    pub async fn handle_at(&self, request: ChatRequest, now: DateTime<Utc>) -> Result<ChatResponse, ChatError> {
        let message = sanitize_text(&request.message);
        if message.is_empty() {
            return Err(ChatError::MissingMessage);
        }
        let images = validate_images(&request.images).map_err(|e| ChatError::Rejected(e.into()))?;
        let plant_id = request.plant_key();

        let request_id = Uuid::new_v4();
        let ctx = self
            .gather_context(&request, message, images, plant_id.as_deref(), now)
            .await;
        info!(
            "  [{}] chat for '{}' ({} stored turns, {} images)",
            request_id,
            ctx.plant.name,
            ctx.stored_conversation.len(),
            ctx.images.len()
        );

        let prompt = build_prompt(&ctx);
        let model_reply = invoke_with_fallback(
            self.model.as_ref(),
            &self.llm.model,
            self.llm.fallback_model.as_deref(),
            &prompt,
        )
        .await
        .map_err(ChatError::Model)?;

        let outcome = produce_reply(&ctx, &model_reply.text, now);
        if !outcome.applied_rules.is_empty() {
            info!("  [{}] guardrails applied: {:?}", request_id, outcome.applied_rules);
        }
        if model_reply.used_fallback {
            info!("  [{}] answered by fallback model {}", request_id, model_reply.model);
        }
        let response = ChatResponse {
            reply: outcome.reply.clone(),
            needs_photo: outcome.needs_photo,
            confidence: outcome.confidence,
            needs_follow_up: outcome.needs_follow_up,
            follow_up_due_at: outcome.follow_up_due_at,
        };

        if let Some(plant_id) = plant_id {
            let audit = DecisionAudit::record(&ctx, &model_reply.text, &outcome, now);
            if let Err(source) = self
                .store
                .record_exchange(&plant_id, &ctx.user_message, &outcome.reply, &audit)
                .await
            {
                return Err(ChatError::Persist { source, response });
            }
        }

        Ok(response)
    }

    /// Store reads are best effort; a failed read leaves that part empty.
    ///
    /// A plant id seen for the first time is registered from the request's
    /// profile, if it sent one, with `now` as birth date when it has none.
    async fn gather_context(
        &self,
        request: &ChatRequest,
        message: String,
        images: Vec<ImageAttachment>,
        plant_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ChatContext {
        let mut ctx = ChatContext {
            user_message: message,
            plant: request.plant.clone().unwrap_or_default(),
            latest_reading: request.reading.clone(),
            reading_history: request.readings.clone(),
            prediction: request.prediction.clone(),
            stored_conversation: Vec::new(),
            images,
        };
        let Some(plant_id) = plant_id else {
            return ctx;
        };

        match self.store.plant(plant_id).await {
            Ok(Some(record)) => {
                // stored values are canonical
                if let Some(name) = record.name.filter(|n| !n.trim().is_empty()) {
                    ctx.plant.name = name;
                }
                if let Some(kind) = record.plant_type.filter(|t| !t.trim().is_empty()) {
                    ctx.plant.plant_type = kind;
                }
                if let Some(personality) = record.personality.filter(|p| !p.trim().is_empty()) {
                    ctx.plant.personality = personality;
                }
                if record.created_at.is_some() {
                    ctx.plant.created_at = record.created_at;
                }
                if let Some(thresholds) = record.thresholds {
                    ctx.plant.thresholds = thresholds;
                }
            }
            Ok(None) if request.plant.is_some() => {
                let record = register_record(plant_id, &ctx.plant, now);
                match self.store.upsert_plant(&record).await {
                    Ok(()) => {
                        info!("  registered plant {} as '{}'", plant_id, ctx.plant.name);
                        ctx.plant.created_at = record.created_at;
                    }
                    Err(e) => warn!("[!]  plant {} not registered: {}", plant_id, e),
                }
            }
            Ok(None) => {}
            Err(e) => warn!("[!]  plant {} not loaded: {}", plant_id, e),
        }

        match self.store.recent_turns(plant_id, self.limits.history_limit).await {
            Ok(turns) => ctx.stored_conversation = turns,
            Err(e) => warn!("[!]  history for {} not loaded: {}", plant_id, e),
        }

        if ctx.reading_history.is_empty() || ctx.latest_reading.is_none() {
            match self.store.recent_readings(plant_id, self.limits.readings_limit).await {
                Ok(readings) => {
                    if ctx.latest_reading.is_none() {
                        ctx.latest_reading = readings.first().cloned();
                    }
                    if ctx.reading_history.is_empty() {
                        ctx.reading_history = readings;
                    }
                }
                Err(e) => warn!("[!]  readings for {} not loaded: {}", plant_id, e),
            }
        }

        ctx
    }
}

fn register_record(plant_id: &str, profile: &PlantProfile, now: DateTime<Utc>) -> PlantRecord {
    let text = |s: &str| Some(sanitize_text(s)).filter(|t| !t.is_empty());
    PlantRecord {
        id: plant_id.to_string(),
        name: text(&profile.name),
        plant_type: text(&profile.plant_type),
        personality: text(&profile.personality),
        created_at: profile.created_at.or(Some(now)),
        thresholds: Some(profile.thresholds),
    }
}
