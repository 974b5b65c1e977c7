//! Prompt construction for the model call.
//!
//! The system prompt carries the plant persona, current sensor values, the
//! moisture trend, the external prediction, the guardrail rules and the JSON
//! shape the model must answer with. Messages are the compacted history plus
//! the current user message (images first, then text).

use crate::attachments::ImageAttachment;
use crate::guardrail;
use crate::history::{compact_history, ConversationTurn, Role};
use crate::pipeline::ChatContext;
use crate::sanitize::sanitize_text;
use crate::telemetry::{Prediction, TelemetryReading};
use serde::{Deserialize, Serialize};

/// Moisture change (percentage points) below which the trend is "stable".
const TREND_DEADBAND: f64 = 2.0;

const RESPONSE_SCHEMA: &str = r#"Rispondi SOLO con un oggetto JSON con questa forma:
{
  "decision": {"water": "water_now|wait|check_soon", "light": "increase|reduce|ok", "urgency": "high|medium|low", "confidence": 0.0-1.0, "recheck_hours": numero},
  "motivation": {"summary": "frase breve", "sensor_consistency": "coerenza tra dati e osservazioni"},
  "actions": [{"title": "...", "details": "...", "when": "..."}],
  "questions": ["..."],
  "needs_photo": true|false
}
Massimo 3 azioni e 2 domande."#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl From<&ImageAttachment> for ContentBlock {
    fn from(image: &ImageAttachment) -> Self {
        ContentBlock::Image {
            source: ImageSource {
                kind: "base64".to_string(),
                media_type: image.media_type.clone(),
                data: image.data.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl PromptMessage {
    fn text(role: Role, text: String) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text }],
        }
    }
}

/// Everything the model invoker needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub system: String,
    pub messages: Vec<PromptMessage>,
}

pub fn build_prompt(ctx: &ChatContext) -> PromptRequest {
    let history = compact_history(&ctx.stored_conversation);
    PromptRequest {
        system: system_prompt(ctx),
        messages: build_messages(&history, &ctx.user_message, &ctx.images),
    }
}

pub fn system_prompt(ctx: &ChatContext) -> String {
    let plant = &ctx.plant;
    let mut parts = vec![
        format!(
            "Sei la pianta '{}'. {}",
            sanitize_text(&plant.name),
            sanitize_text(&plant.personality)
        ),
        "Rispondi in italiano, breve ma espressivo, mantenendo SEMPRE questa personalita e questo tono. \
         Se i dati indicano urgenza, fallo notare con gentilezza."
            .to_string(),
    ];
    if !plant.plant_type.trim().is_empty() {
        parts.push(format!("Tipo di pianta: {}.", sanitize_text(&plant.plant_type)));
    }
    if let Some(line) = sensor_line(ctx.latest_reading.as_ref()) {
        parts.push(line);
    }
    if let Some(line) = moisture_trend(&ctx.reading_history) {
        parts.push(line);
    }
    if let Some(line) = ctx.prediction.as_ref().and_then(prediction_line) {
        parts.push(line);
    }
    parts.push(guardrail::describe(
        &plant.thresholds,
        &plant.plant_type,
        ctx.latest_reading.as_ref(),
        ctx.prediction.as_ref(),
    ));
    if !ctx.images.is_empty() {
        parts.push(format!(
            "L'utente ha allegato {} foto: usale per valutare foglie, fusto e substrato.",
            ctx.images.len()
        ));
    }
    parts.push(RESPONSE_SCHEMA.to_string());
    parts.join("\n\n")
}

/// "Dati sensori: umidita X%, luce Y lx[, temperatura Z°C]."
pub fn sensor_line(reading: Option<&TelemetryReading>) -> Option<String> {
    let r = reading?;
    let mut fields = Vec::new();
    if let Some(m) = r.moisture() {
        fields.push(format!("umidita {}%", trim_number(m)));
    }
    if let Some(l) = r.lux() {
        fields.push(format!("luce {} lx", trim_number(l)));
    }
    if let Some(t) = r.temperature() {
        fields.push(format!("temperatura {}°C", trim_number(t)));
    }
    if fields.is_empty() {
        return None;
    }
    Some(format!("Dati sensori: {}.", fields.join(", ")))
}

/// Moisture direction across the history. Readings with a timestamp are
/// ordered by it; the rest keep their input order.
pub fn moisture_trend(history: &[TelemetryReading]) -> Option<String> {
    let mut ordered: Vec<&TelemetryReading> = history.iter().collect();
    ordered.sort_by_key(|r| r.captured_at);
    let values: Vec<f64> = ordered.iter().filter_map(|r| r.moisture()).collect();
    let (first, last) = match values.as_slice() {
        [first, .., last] => (*first, *last),
        _ => return None,
    };
    let delta = last - first;
    let direction = if delta.abs() < TREND_DEADBAND {
        "stabile"
    } else if delta < 0.0 {
        "in calo"
    } else {
        "in aumento"
    };
    Some(format!(
        "Andamento umidita (ultime {} letture): da {:.1}% a {:.1}%, {}.",
        values.len(),
        first,
        last,
        direction
    ))
}

fn prediction_line(p: &Prediction) -> Option<String> {
    let water = sanitize_text(&p.watering_action);
    let light = sanitize_text(&p.light_action);
    let summary = sanitize_text(&p.summary);
    if water.is_empty() && light.is_empty() && summary.is_empty() {
        return None;
    }
    let mut line = format!("Previsione esterna: acqua '{}', luce '{}'", water, light);
    if let Some(c) = p.confidence.filter(|c| c.is_finite()) {
        line.push_str(&format!(", confidenza {:.2}", c));
    }
    line.push('.');
    if !summary.is_empty() {
        line.push(' ');
        line.push_str(&summary);
    }
    Some(line)
}

/// History plus the new user message, shaped for a strictly alternating
/// user/assistant API: leading assistant turns are dropped and consecutive
/// turns of the same role are merged.
pub fn build_messages(
    history: &[ConversationTurn],
    user_message: &str,
    images: &[ImageAttachment],
) -> Vec<PromptMessage> {
    let mut messages: Vec<PromptMessage> = Vec::new();
    let current = ConversationTurn::user(sanitize_text(user_message));

    for turn in history.iter().chain(std::iter::once(&current)) {
        if messages.is_empty() && turn.role == Role::Assistant {
            continue;
        }
        match messages.last_mut() {
            Some(last) if last.role == turn.role => {
                if let Some(ContentBlock::Text { text }) = last.content.last_mut() {
                    text.push_str("\n\n");
                    text.push_str(&turn.content);
                }
            }
            _ => messages.push(PromptMessage::text(turn.role, turn.content.clone())),
        }
    }

    if let Some(last) = messages.last_mut() {
        let mut blocks: Vec<ContentBlock> = images.iter().map(ContentBlock::from).collect();
        blocks.append(&mut last.content);
        last.content = blocks;
    }
    messages
}

/// 56.0 -> "56", 56.25 -> "56.25"
fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
