//! Model output: decision enums, the untrusted `ModelDecision`, and the
//! best-effort parser that pulls a JSON object out of raw model text.
//!
//! Every field is optional. Wrong shapes are dropped field by field instead of
//! failing the whole document, so a half-valid answer still contributes what it can.

use crate::sanitize::sanitize_text;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Maximum model-provided actions honored.
pub const MAX_ACTIONS: usize = 3;
/// Maximum model-provided follow-up questions honored.
pub const MAX_QUESTIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterAction {
    WaterNow,
    Wait,
    CheckSoon,
}

impl WaterAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "water_now" => Some(Self::WaterNow),
            "wait" => Some(Self::Wait),
            "check_soon" => Some(Self::CheckSoon),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaterNow => "water_now",
            Self::Wait => "wait",
            Self::CheckSoon => "check_soon",
        }
    }

    /// Default recheck interval when the model gave none.
    pub fn default_recheck_hours(&self) -> f64 {
        match self {
            Self::WaterNow => 6.0,
            Self::CheckSoon => 12.0,
            Self::Wait => 24.0,
        }
    }
}

impl fmt::Display for WaterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightAction {
    Increase,
    Reduce,
    Ok,
}

impl LightAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "increase" => Some(Self::Increase),
            "reduce" => Some(Self::Reduce),
            "ok" => Some(Self::Ok),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Reduce => "reduce",
            Self::Ok => "ok",
        }
    }
}

impl fmt::Display for LightAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    #[default]
    Medium,
    Low,
}

impl Urgency {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Hours until a follow-up is due at this urgency.
    pub fn follow_up_hours(&self) -> i64 {
        match self {
            Self::High => 24,
            Self::Medium => 48,
            Self::Low => 72,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `decision` block of the model answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionFields {
    pub water: Option<WaterAction>,
    pub light: Option<LightAction>,
    pub urgency: Option<Urgency>,
    pub confidence: Option<f64>,
    pub recheck_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Motivation {
    pub summary: Option<String>,
    pub sensor_consistency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAction {
    pub title: String,
    pub details: Option<String>,
    pub when: Option<String>,
}

/// Parsed, untrusted model answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDecision {
    pub decision: DecisionFields,
    pub motivation: Motivation,
    /// At most `MAX_ACTIONS`
    pub actions: Vec<ModelAction>,
    /// At most `MAX_QUESTIONS`
    pub questions: Vec<String>,
    pub needs_photo: bool,
}

impl ModelDecision {
    /// Build from an already-parsed JSON object, dropping malformed fields.
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let decision = obj
            .get("decision")
            .and_then(Value::as_object)
            .map(decision_fields)
            .unwrap_or_default();

        let motivation = obj
            .get("motivation")
            .and_then(Value::as_object)
            .map(|m| Motivation {
                summary: text_field(m, &["summary"]),
                sensor_consistency: text_field(m, &["sensor_consistency", "sensorConsistency"]),
            })
            .unwrap_or_default();

        let actions = obj
            .get("actions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(action_from_object)
                    .take(MAX_ACTIONS)
                    .collect()
            })
            .unwrap_or_default();

        let questions = obj
            .get("questions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(sanitize_text)
                    .filter(|q| !q.is_empty())
                    .take(MAX_QUESTIONS)
                    .collect()
            })
            .unwrap_or_default();

        let needs_photo = ["needs_photo", "needsPhoto"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_bool))
            .unwrap_or(false);

        Self {
            decision,
            motivation,
            actions,
            questions,
            needs_photo,
        }
    }

    /// Model summary, if non-empty.
    pub fn summary(&self) -> Option<&str> {
        self.motivation.summary.as_deref().filter(|s| !s.is_empty())
    }
}

fn decision_fields(d: &Map<String, Value>) -> DecisionFields {
    DecisionFields {
        water: d.get("water").and_then(Value::as_str).and_then(WaterAction::parse),
        light: d.get("light").and_then(Value::as_str).and_then(LightAction::parse),
        urgency: d.get("urgency").and_then(Value::as_str).and_then(Urgency::parse),
        confidence: d.get("confidence").and_then(Value::as_f64),
        recheck_hours: ["recheck_hours", "recheckHours"]
            .iter()
            .find_map(|k| d.get(*k).and_then(Value::as_f64)),
    }
}

fn action_from_object(a: &Map<String, Value>) -> Option<ModelAction> {
    let title = text_field(a, &["title"])?;
    Some(ModelAction {
        title,
        details: text_field(a, &["details"]),
        when: text_field(a, &["when"]),
    })
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(sanitize_text)
        .filter(|s| !s.is_empty())
}

/// Parse raw model text into a `ModelDecision`.
///
/// Tries the whole text first, then the span between the first `{` and the
/// last `}`. Returns `None` when neither yields a JSON object.
pub fn parse_model_response(raw: &str) -> Option<ModelDecision> {
    parse_object(raw.trim())
        .or_else(|| extract_json(raw).and_then(parse_object))
        .map(|obj| ModelDecision::from_object(&obj))
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strict_json() {
        let raw = r#"{"decision":{"water":"water_now","light":"ok","urgency":"high","confidence":0.9,"recheck_hours":4}}"#;
        let d = parse_model_response(raw).unwrap();
        assert_eq!(d.decision.water, Some(WaterAction::WaterNow));
        assert_eq!(d.decision.urgency, Some(Urgency::High));
        assert_eq!(d.decision.recheck_hours, Some(4.0));
    }

    #[test]
    fn test_parse_json_surrounded_by_prose() {
        let raw = "Ecco la mia analisi:\n{\"decision\":{\"water\":\"wait\"}}\nSpero aiuti!";
        let d = parse_model_response(raw).unwrap();
        assert_eq!(d.decision.water, Some(WaterAction::Wait));
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_model_response("not json at all").is_none());
        assert!(parse_model_response("} backwards {").is_none());
        assert!(parse_model_response("{ broken").is_none());
        assert!(parse_model_response("").is_none());
    }

    #[test]
    fn test_non_object_json_is_none() {
        assert!(parse_model_response("42").is_none());
        assert!(parse_model_response("[1, 2]").is_none());
    }

    #[test]
    fn test_wrong_shapes_become_missing() {
        let raw = r#"{
            "decision": {"water": "flood", "light": 3, "urgency": "URGENT", "confidence": "high"},
            "motivation": "not an object",
            "actions": [{"title": "Ruota il vaso"}, {"details": "no title"}, "str"],
            "questions": [1, "Da quanto non annaffi?", ""],
            "needs_photo": "yes"
        }"#;
        let d = parse_model_response(raw).unwrap();
        assert_eq!(d.decision.water, None);
        assert_eq!(d.decision.light, None);
        assert_eq!(d.decision.urgency, None);
        assert_eq!(d.decision.confidence, None);
        assert_eq!(d.motivation, Motivation::default());
        assert_eq!(d.actions.len(), 1);
        assert_eq!(d.questions, vec!["Da quanto non annaffi?".to_string()]);
        assert!(!d.needs_photo);
    }

    #[test]
    fn test_caps_actions_and_questions() {
        let raw = r#"{
            "actions": [{"title":"a"},{"title":"b"},{"title":"c"},{"title":"d"}],
            "questions": ["q1","q2","q3"],
            "needsPhoto": true
        }"#;
        let d = parse_model_response(raw).unwrap();
        assert_eq!(d.actions.len(), MAX_ACTIONS);
        assert_eq!(d.questions.len(), MAX_QUESTIONS);
        assert!(d.needs_photo);
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!(WaterAction::parse(" Check_Soon "), Some(WaterAction::CheckSoon));
        assert_eq!(LightAction::parse("OK"), Some(LightAction::Ok));
        assert_eq!(Urgency::parse("Low"), Some(Urgency::Low));
    }
}
