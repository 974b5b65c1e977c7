//! Reply pipeline entry point.
//!
//! raw model text -> parse -> reconcile -> resolve -> intent -> synthesize
//!
//! `produce_reply` is total: malformed model output, missing telemetry and
//! conflicting advice all end in a fully populated decision and a reply.

use crate::attachments::ImageAttachment;
use crate::confidence::{resolve, ResolveInput};
use crate::error::PiantaError;
use crate::guardrail;
use crate::history::StoredTurn;
use crate::intent::{self, IntentContext};
use crate::model_output::{parse_model_response, ModelDecision};
use crate::reconcile::{reconcile, GuardrailRule, ReconciledDecision};
use crate::reply::{sensor_summary, synthesize, SynthesisInput};
use crate::sanitize::{sanitize_text, sanitize_value};
use crate::telemetry::{Prediction, TelemetryReading, Thresholds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_PLANT_NAME: &str = "Senti Chi Pianta";
pub const DEFAULT_PERSONALITY: &str = "Gentile, poetica, ironica quanto basta. Parla in prima persona.";

fn default_plant_name() -> String {
    DEFAULT_PLANT_NAME.to_string()
}

fn default_personality() -> String {
    DEFAULT_PERSONALITY.to_string()
}

/// Plant identity and per-plant settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantProfile {
    #[serde(default = "default_plant_name")]
    pub name: String,
    #[serde(default, alias = "type", alias = "plantType")]
    pub plant_type: String,
    #[serde(default = "default_personality")]
    pub personality: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl Default for PlantProfile {
    fn default() -> Self {
        Self {
            name: default_plant_name(),
            plant_type: String::new(),
            personality: default_personality(),
            created_at: None,
            thresholds: Thresholds::default(),
        }
    }
}

/// One chat request, as gathered by the caller before the model call.
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    pub user_message: String,
    pub plant: PlantProfile,
    pub latest_reading: Option<TelemetryReading>,
    pub reading_history: Vec<TelemetryReading>,
    pub prediction: Option<Prediction>,
    /// Most recent turns, newest first
    pub stored_conversation: Vec<StoredTurn>,
    /// Already validated
    pub images: Vec<ImageAttachment>,
}

impl ChatContext {
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyOutcome {
    pub reply: String,
    pub needs_photo: bool,
    pub confidence: f64,
    pub needs_follow_up: bool,
    pub follow_up_due_at: Option<DateTime<Utc>>,
    pub decision: ReconciledDecision,
    /// False when the model output could not be parsed
    pub model_parsed: bool,
    pub applied_rules: Vec<GuardrailRule>,
}

pub fn produce_reply(ctx: &ChatContext, raw_model_output: &str, now: DateTime<Utc>) -> ReplyOutcome {
    let model = parse_model_response(raw_model_output);
    if model.is_none() {
        debug!("model output not parseable ({} chars), using defaults", raw_model_output.len());
    }
    let model = model.as_ref();
    let reading = ctx.latest_reading.as_ref();
    let prediction = ctx.prediction.as_ref();
    let thresholds = &ctx.plant.thresholds;

    let core = reconcile(model, reading, thresholds, prediction);
    let resolution = resolve(&ResolveInput {
        model,
        prediction,
        reading,
        thresholds,
        decision: &core,
        now,
    });
    let decision = ReconciledDecision::assemble(&core, &resolution);

    let fallback_summary = sensor_summary(reading);
    let summary = model
        .and_then(ModelDecision::summary)
        .map(sanitize_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback_summary.clone());

    let conversational = intent::respond(&IntentContext {
        message: &ctx.user_message,
        plant_name: &ctx.plant.name,
        plant_type: &ctx.plant.plant_type,
        plant_created_at: ctx.plant.created_at,
        has_images: ctx.has_images(),
        summary: &summary,
        water: decision.water,
        light: decision.light,
        urgency: decision.urgency,
        now,
    });

    let conflict = guardrail::evaluate(reading, thresholds, prediction).note();

    let reply = synthesize(&SynthesisInput {
        decision: &decision,
        model,
        fallback_summary: &fallback_summary,
        conflict_text: conflict.as_deref(),
        conversational: Some(&conversational),
    });

    ReplyOutcome {
        reply,
        needs_photo: decision.needs_photo,
        confidence: decision.confidence,
        needs_follow_up: decision.needs_follow_up,
        follow_up_due_at: decision.follow_up_due_at,
        decision,
        model_parsed: model.is_some(),
        applied_rules: core.applied,
    }
}

/// What gets persisted next to the two chat turns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionAudit {
    pub reading: Option<TelemetryReading>,
    pub thresholds: Thresholds,
    pub prediction: Option<Prediction>,
    pub raw_model_output: String,
    pub reply: String,
    pub decision: ReconciledDecision,
    pub applied_rules: Vec<GuardrailRule>,
    pub model_parsed: bool,
    pub created_at: DateTime<Utc>,
}

impl DecisionAudit {
    pub fn record(ctx: &ChatContext, raw_model_output: &str, outcome: &ReplyOutcome, now: DateTime<Utc>) -> Self {
        Self {
            reading: ctx.latest_reading.clone(),
            thresholds: ctx.plant.thresholds,
            prediction: ctx.prediction.clone(),
            raw_model_output: raw_model_output.to_string(),
            reply: outcome.reply.clone(),
            decision: outcome.decision.clone(),
            applied_rules: outcome.applied_rules.clone(),
            model_parsed: outcome.model_parsed,
            created_at: now,
        }
    }

    /// Sanitized JSON, ready for storage.
    pub fn to_json(&self) -> Result<Value, PiantaError> {
        Ok(sanitize_value(&serde_json::to_value(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_output::{LightAction, Urgency, WaterAction};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_unparsable_output_falls_back_to_defaults() {
        let ctx = ChatContext {
            user_message: "Dimmi qualcosa".into(),
            ..Default::default()
        };
        let out = produce_reply(&ctx, "not json at all", now());
        assert!(!out.model_parsed);
        assert_eq!(out.decision.water, WaterAction::CheckSoon);
        assert_eq!(out.decision.light, LightAction::Ok);
        assert_eq!(out.decision.urgency, Urgency::Medium);
        assert!(out.needs_follow_up);
        assert_eq!(out.follow_up_due_at, Some(now() + chrono::Duration::hours(48)));
        assert!(out.reply.starts_with("Risposta: "));
    }

    #[test]
    fn test_guardrail_overrides_model_and_is_recorded() {
        let ctx = ChatContext {
            user_message: "Devo annaffiarti?".into(),
            latest_reading: Some(TelemetryReading::new(8.0, 5000.0)),
            ..Default::default()
        };
        let raw = r#"Ecco: {"decision":{"water":"wait","light":"ok","urgency":"low","confidence":0.9}}"#;
        let out = produce_reply(&ctx, raw, now());
        assert!(out.model_parsed);
        assert_eq!(out.decision.water, WaterAction::WaterNow);
        assert_eq!(out.decision.urgency, Urgency::High);
        assert!(out.decision.recheck_hours <= 6.0);
        assert_eq!(out.applied_rules, vec![GuardrailRule::DrySoilForcesWatering]);
        assert!(out.reply.contains("Decisione: water=water_now, light=ok, urgency=high"));
    }

    #[test]
    fn test_audit_is_sanitized() {
        let ctx = ChatContext {
            user_message: "ciao".into(),
            ..Default::default()
        };
        let raw = "risposta\u{7}   strana";
        let out = produce_reply(&ctx, raw, now());
        let audit = DecisionAudit::record(&ctx, raw, &out, now()).to_json().unwrap();
        assert_eq!(audit["raw_model_output"], "risposta strana");
        assert_eq!(audit["decision"]["water"], "check_soon");
        assert_eq!(audit["model_parsed"], false);
    }

    #[test]
    fn test_plant_profile_defaults() {
        let p: PlantProfile = serde_json::from_str(r#"{"type": "basilico"}"#).unwrap();
        assert_eq!(p.name, DEFAULT_PLANT_NAME);
        assert_eq!(p.personality, DEFAULT_PERSONALITY);
        assert_eq!(p.plant_type, "basilico");
        assert_eq!(p.thresholds, Thresholds::default());
    }
}
