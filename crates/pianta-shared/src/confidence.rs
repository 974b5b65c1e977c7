//! Confidence, photo request and follow-up scheduling.
//!
//! Pure function over the reconciled decision. Every branch has a default;
//! there is no failure mode.

use crate::guardrail;
use crate::model_output::{ModelDecision, Urgency};
use crate::reconcile::DecisionCore;
use crate::telemetry::{moisture_of, Prediction, TelemetryReading, Thresholds};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Confidence when neither the model nor the prediction states one.
pub const DEFAULT_CONFIDENCE: f64 = 0.45;
/// Below this, a model photo request is honored and a follow-up is scheduled.
pub const FOLLOW_UP_THRESHOLD: f64 = 0.62;
/// Below this, a borderline reading with a conflict asks for a photo.
pub const BORDERLINE_THRESHOLD: f64 = 0.7;
/// Below this, a photo is always requested.
pub const PHOTO_THRESHOLD: f64 = 0.5;

/// Output of the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// In [0, 1], rounded to 3 decimals
    pub confidence: f64,
    pub needs_photo: bool,
    pub needs_follow_up: bool,
    pub follow_up_due_at: Option<DateTime<Utc>>,
}

/// Everything the resolver looks at.
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    /// `None` when the model output did not parse
    pub model: Option<&'a ModelDecision>,
    pub prediction: Option<&'a Prediction>,
    pub reading: Option<&'a TelemetryReading>,
    pub thresholds: &'a Thresholds,
    pub decision: &'a DecisionCore,
    pub now: DateTime<Utc>,
}

/// Model confidence, else prediction confidence, else the default; clamped
/// to [0, 1] and rounded to 3 decimals.
pub fn resolve_confidence(model: Option<&ModelDecision>, prediction: Option<&Prediction>) -> f64 {
    let raw = model
        .and_then(|m| m.decision.confidence)
        .filter(|c| c.is_finite())
        .or_else(|| prediction.and_then(|p| p.confidence).filter(|c| c.is_finite()))
        .unwrap_or(DEFAULT_CONFIDENCE);
    (raw.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
}

pub fn resolve(input: &ResolveInput<'_>) -> Resolution {
    let confidence = resolve_confidence(input.model, input.prediction);
    let conflict = guardrail::sensor_conflict(input.reading, input.thresholds, input.prediction);

    let model_asked = input.model.map(|m| m.needs_photo).unwrap_or(false);
    let borderline = moisture_of(input.reading)
        .map(|m| m > input.thresholds.moisture_low && m < input.thresholds.moisture_ok)
        .unwrap_or(false);

    let needs_photo = (model_asked && (confidence < FOLLOW_UP_THRESHOLD || conflict))
        || (borderline && conflict && confidence < BORDERLINE_THRESHOLD)
        || confidence < PHOTO_THRESHOLD;

    let needs_follow_up = needs_photo || confidence < FOLLOW_UP_THRESHOLD || input.model.is_none();

    let follow_up_due_at =
        needs_follow_up.then(|| follow_up_due(input.decision.urgency, input.now));

    Resolution {
        confidence,
        needs_photo,
        needs_follow_up,
        follow_up_due_at,
    }
}

/// now + 24/48/72h for high/medium/low urgency.
pub fn follow_up_due(urgency: Urgency, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(urgency.follow_up_hours())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_output::{DecisionFields, LightAction, WaterAction};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn core(urgency: Urgency) -> DecisionCore {
        DecisionCore {
            water: WaterAction::Wait,
            light: LightAction::Ok,
            urgency,
            recheck_hours: 24.0,
            applied: vec![],
        }
    }

    fn model_with(confidence: Option<f64>, needs_photo: bool) -> ModelDecision {
        ModelDecision {
            decision: DecisionFields {
                confidence,
                ..Default::default()
            },
            needs_photo,
            ..Default::default()
        }
    }

    #[test]
    fn test_confidence_sources_in_order() {
        let p = Prediction {
            confidence: Some(0.7),
            ..Default::default()
        };
        let m = model_with(Some(0.9), false);
        assert_eq!(resolve_confidence(Some(&m), Some(&p)), 0.9);
        let m = model_with(None, false);
        assert_eq!(resolve_confidence(Some(&m), Some(&p)), 0.7);
        assert_eq!(resolve_confidence(None, None), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_confidence_clamped_and_rounded() {
        assert_eq!(resolve_confidence(Some(&model_with(Some(7.0), false)), None), 1.0);
        assert_eq!(resolve_confidence(Some(&model_with(Some(-2.0), false)), None), 0.0);
        assert_eq!(resolve_confidence(Some(&model_with(Some(0.123456), false)), None), 0.123);
        // non-finite falls through to the default
        assert_eq!(
            resolve_confidence(Some(&model_with(Some(f64::NAN), false)), None),
            DEFAULT_CONFIDENCE
        );
    }

    #[test]
    fn test_model_photo_request_needs_low_confidence_or_conflict() {
        let t = Thresholds::default();
        let d = core(Urgency::Medium);
        let m = model_with(Some(0.9), true);
        let r = resolve(&ResolveInput {
            model: Some(&m),
            prediction: None,
            reading: None,
            thresholds: &t,
            decision: &d,
            now: now(),
        });
        assert!(!r.needs_photo);
        assert!(!r.needs_follow_up);
        assert!(r.follow_up_due_at.is_none());

        let m = model_with(Some(0.6), true);
        let r = resolve(&ResolveInput {
            model: Some(&m),
            prediction: None,
            reading: None,
            thresholds: &t,
            decision: &d,
            now: now(),
        });
        assert!(r.needs_photo);
        assert!(r.needs_follow_up);
    }

    #[test]
    fn test_borderline_conflict_asks_for_photo() {
        let t = Thresholds::default();
        let d = core(Urgency::Medium);
        let reading = TelemetryReading::new(22.0, 5000.0);
        // "water" with moisture 22 is not a conflict; use a light conflict
        let p = Prediction {
            light_action: "increase".into(),
            ..Default::default()
        };
        let bright = TelemetryReading::new(22.0, 25000.0);
        let m = model_with(Some(0.65), false);

        let r = resolve(&ResolveInput {
            model: Some(&m),
            prediction: Some(&p),
            reading: Some(&bright),
            thresholds: &t,
            decision: &d,
            now: now(),
        });
        assert!(r.needs_photo);

        let r = resolve(&ResolveInput {
            model: Some(&m),
            prediction: Some(&p),
            reading: Some(&reading),
            thresholds: &t,
            decision: &d,
            now: now(),
        });
        assert!(!r.needs_photo);
    }

    #[test]
    fn test_low_confidence_always_asks_for_photo() {
        let t = Thresholds::default();
        let d = core(Urgency::Low);
        let m = model_with(Some(0.3), false);
        let r = resolve(&ResolveInput {
            model: Some(&m),
            prediction: None,
            reading: None,
            thresholds: &t,
            decision: &d,
            now: now(),
        });
        assert!(r.needs_photo);
        assert_eq!(r.follow_up_due_at, Some(now() + Duration::hours(72)));
    }

    #[test]
    fn test_unparsed_model_always_follows_up() {
        let t = Thresholds::default();
        let d = core(Urgency::High);
        let p = Prediction {
            confidence: Some(0.95),
            ..Default::default()
        };
        let r = resolve(&ResolveInput {
            model: None,
            prediction: Some(&p),
            reading: None,
            thresholds: &t,
            decision: &d,
            now: now(),
        });
        assert!(!r.needs_photo);
        assert!(r.needs_follow_up);
        assert_eq!(r.follow_up_due_at, Some(now() + Duration::hours(24)));
    }
}
