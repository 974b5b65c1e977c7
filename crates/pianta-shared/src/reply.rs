//! Reply synthesis: the fixed-structure message shown to the user.
//!
//! Layout:
//! ```text
//! Risposta: <conversational line>
//! Decisione: water=<..>, light=<..>, urgency=<..>
//! Riepilogo: <summary>
//! Coerenza sensori: <..>            (optional)
//!
//! Azioni:
//! 1. Acqua: ...
//! 2. Luce: ...
//! 3. <model action>                 (up to 3, deduplicated)
//! Ricontrollo tra <n> ore.
//!
//! Domande utili:                    (optional, up to 2)
//! - ...
//! Foto: ...                         (when a photo is needed)
//! Follow-up: ...                    (when a follow-up is scheduled)
//! ```
//! The labels `Risposta:` and `Riepilogo:` are what `history` keeps from old turns.

use crate::model_output::{LightAction, ModelAction, ModelDecision, WaterAction, MAX_ACTIONS, MAX_QUESTIONS};
use crate::reconcile::ReconciledDecision;
use crate::sanitize::sanitize_text;
use crate::telemetry::TelemetryReading;

pub const REPLY_LABEL: &str = "Risposta:";
pub const SUMMARY_LABEL: &str = "Riepilogo:";

const PHOTO_HINT: &str =
    "Foto: se puoi, inviami una foto nitida di foglie (fronte/retro) e substrato, con luce naturale.";

/// Inputs to `synthesize`.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub decision: &'a ReconciledDecision,
    pub model: Option<&'a ModelDecision>,
    /// Sensor-derived summary used when the model gave none
    pub fallback_summary: &'a str,
    /// Sensor/prediction conflict note
    pub conflict_text: Option<&'a str>,
    /// Intent responder output, replaces the generic leading line
    pub conversational: Option<&'a str>,
}

pub fn synthesize(input: &SynthesisInput<'_>) -> String {
    let d = input.decision;
    let summary = input
        .model
        .and_then(ModelDecision::summary)
        .map(sanitize_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| sanitize_text(input.fallback_summary));

    let leading = input
        .conversational
        .map(sanitize_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| generic_line(d.water, &summary));

    let mut lines = vec![
        format!("{} {}", REPLY_LABEL, leading),
        format!(
            "Decisione: water={}, light={}, urgency={}",
            d.water, d.light, d.urgency
        ),
        format!("{} {}", SUMMARY_LABEL, summary),
    ];

    let consistency = input
        .conflict_text
        .map(sanitize_text)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            input
                .model
                .and_then(|m| m.motivation.sensor_consistency.as_deref())
                .map(sanitize_text)
                .filter(|s| !s.is_empty())
        });
    if let Some(text) = consistency {
        lines.push(format!("Coerenza sensori: {}", text));
    }

    lines.push(String::new());
    lines.push("Azioni:".to_string());
    let model_actions = input.model.map(|m| m.actions.as_slice()).unwrap_or(&[]);
    for (i, action) in action_lines(d.water, d.light, model_actions).iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, action));
    }
    lines.push(format!("Ricontrollo tra {} ore.", format_hours(d.recheck_hours)));

    let questions: Vec<String> = input
        .model
        .map(|m| {
            m.questions
                .iter()
                .map(|q| sanitize_text(q))
                .filter(|q| !q.is_empty())
                .take(MAX_QUESTIONS)
                .collect()
        })
        .unwrap_or_default();
    if !questions.is_empty() {
        lines.push(String::new());
        lines.push("Domande utili:".to_string());
        lines.extend(questions.iter().map(|q| format!("- {}", q)));
    }

    if d.needs_photo {
        lines.push(PHOTO_HINT.to_string());
    }
    if d.needs_follow_up {
        lines.push(format!(
            "Follow-up: ricontrolliamo entro {} ore.",
            d.urgency.follow_up_hours()
        ));
    }

    sanitize_text(&lines.join("\n"))
}

/// Water and light lines first, then model actions that are not duplicates.
pub fn action_lines(water: WaterAction, light: LightAction, model_actions: &[ModelAction]) -> Vec<String> {
    let mut lines = vec![
        water_action_line(water).to_string(),
        light_action_line(light).to_string(),
    ];
    let mut seen: Vec<String> = lines.iter().map(|l| dedup_key(l)).collect();

    for action in model_actions.iter().take(MAX_ACTIONS) {
        let line = format_action(action);
        let key = dedup_key(&line);
        if line.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        lines.push(line);
    }
    lines
}

pub fn water_action_line(water: WaterAction) -> &'static str {
    match water {
        WaterAction::WaterNow => {
            "Acqua: annaffia ora in modo uniforme finche il substrato e umido, senza lasciare ristagni nel sottovaso."
        }
        WaterAction::Wait => "Acqua: non annaffiare adesso, il substrato e ancora umido.",
        WaterAction::CheckSoon => {
            "Acqua: controlla il substrato a breve e annaffia solo se i primi centimetri sono asciutti."
        }
    }
}

pub fn light_action_line(light: LightAction) -> &'static str {
    match light {
        LightAction::Increase => "Luce: spostami in un punto piu luminoso, con luce indiretta intensa.",
        LightAction::Reduce => "Luce: riparami dalla luce diretta piu forte.",
        LightAction::Ok => "Luce: la posizione attuale va bene.",
    }
}

/// Summary derived from the latest reading.
pub fn sensor_summary(reading: Option<&TelemetryReading>) -> String {
    let Some(r) = reading else {
        return "Non ho letture recenti dai sensori.".to_string();
    };
    let mut parts = Vec::new();
    if let Some(m) = r.moisture() {
        parts.push(format!("umidita del substrato al {:.1}%", m));
    }
    if let Some(l) = r.lux() {
        parts.push(format!("luce {:.0} lx", l));
    }
    if let Some(t) = r.temperature() {
        parts.push(format!("temperatura {:.1}°C", t));
    }
    if parts.is_empty() {
        return "Non ho letture recenti dai sensori.".to_string();
    }
    let text = parts.join(", ");
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

fn generic_line(water: WaterAction, summary: &str) -> String {
    let status = match water {
        WaterAction::WaterNow => "Ho bisogno di acqua.",
        WaterAction::Wait => "Sto bene, per ora niente acqua.",
        WaterAction::CheckSoon => "Tienimi d'occhio nelle prossime ore.",
    };
    format!("{} {}", status, summary).trim().to_string()
}

fn format_action(action: &ModelAction) -> String {
    let title = sanitize_text(&action.title);
    let details = action.details.as_deref().map(sanitize_text).unwrap_or_default();
    let when = action.when.as_deref().map(sanitize_text).unwrap_or_default();

    let mut line = title;
    if !details.is_empty() {
        if line.is_empty() {
            line = details;
        } else {
            line = format!("{}: {}", line, details);
        }
    }
    if !when.is_empty() && !line.is_empty() {
        line = format!("{} ({})", line, when);
    }
    line
}

fn dedup_key(line: &str) -> String {
    line.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{:.0}", hours)
    } else {
        format!("{:.1}", hours)
    }
}
