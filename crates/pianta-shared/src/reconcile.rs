//! Decision reconciliation: merge the model's proposed decision with the
//! sensor guardrails into one committed water/light/urgency/recheck decision.
//!
//! # Override order (later rules win)
//!
//! 1. moisture >= ok and model says `water_now` → `wait`
//! 2. moisture <= low → `water_now` (dryness always wins over rule 1)
//! 3. prediction says "do not water" and moisture > low → `wait`
//! 4. prediction says "water" and moisture < ok → `water_now` if <= low, else `check_soon`
//!
//! Known lux always decides light; prediction text only fills in when lux is unknown.
//! Sensor truth outranks the model, and the prediction only fills gaps.

use crate::confidence::Resolution;
use crate::guardrail::{light_tag, watering_tag, AdvisoryTag};
use crate::model_output::{LightAction, ModelDecision, Urgency, WaterAction};
use crate::telemetry::{lux_of, moisture_of, Prediction, TelemetryReading, Thresholds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Recheck cap when the soil is dry.
pub const DRY_RECHECK_CAP_HOURS: f64 = 6.0;
/// Recheck floor when the soil is wet and we wait.
pub const WET_RECHECK_FLOOR_HOURS: f64 = 18.0;

/// Guardrail that changed the decision, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailRule {
    WetSoilBlocksWatering,
    DrySoilForcesWatering,
    PredictionHoldsWatering,
    PredictionRequestsWatering,
    LuxBelowLow,
    LuxAboveHigh,
    LuxInRange,
    PredictionLight,
}

/// Water/light/urgency/recheck after guardrails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionCore {
    pub water: WaterAction,
    pub light: LightAction,
    pub urgency: Urgency,
    /// Always finite and positive
    pub recheck_hours: f64,
    /// Rules that actually changed a value
    pub applied: Vec<GuardrailRule>,
}

/// The engine's committed output. Always fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledDecision {
    pub water: WaterAction,
    pub light: LightAction,
    pub urgency: Urgency,
    pub recheck_hours: f64,
    pub confidence: f64,
    pub needs_photo: bool,
    pub needs_follow_up: bool,
    pub follow_up_due_at: Option<DateTime<Utc>>,
}

impl ReconciledDecision {
    pub fn assemble(core: &DecisionCore, resolution: &Resolution) -> Self {
        Self {
            water: core.water,
            light: core.light,
            urgency: core.urgency,
            recheck_hours: core.recheck_hours,
            confidence: resolution.confidence,
            needs_photo: resolution.needs_photo,
            needs_follow_up: resolution.needs_follow_up,
            follow_up_due_at: resolution.follow_up_due_at,
        }
    }
}

/// Reconcile a (possibly absent) model decision with sensors and prediction.
pub fn reconcile(
    model: Option<&ModelDecision>,
    reading: Option<&TelemetryReading>,
    thresholds: &Thresholds,
    prediction: Option<&Prediction>,
) -> DecisionCore {
    let seed = model.map(|m| m.decision.clone()).unwrap_or_default();
    let mut water = seed.water.unwrap_or(WaterAction::CheckSoon);
    let mut light = seed.light.unwrap_or(LightAction::Ok);
    let mut urgency = seed.urgency.unwrap_or_default();
    let mut applied = Vec::new();

    let moisture = moisture_of(reading);
    let lux = lux_of(reading);
    let watering_advice = prediction.and_then(|p| watering_tag(&p.watering_action));

    let mut set_water = |value: WaterAction, rule: GuardrailRule, water: &mut WaterAction| {
        if *water != value {
            debug!("guardrail {:?}: water {} -> {}", rule, water, value);
            *water = value;
            applied.push(rule);
        }
    };

    if let Some(m) = moisture {
        // 1
        if m >= thresholds.moisture_ok && water == WaterAction::WaterNow {
            set_water(WaterAction::Wait, GuardrailRule::WetSoilBlocksWatering, &mut water);
        }
        // 2
        if m <= thresholds.moisture_low {
            set_water(WaterAction::WaterNow, GuardrailRule::DrySoilForcesWatering, &mut water);
        }
        // 3
        if watering_advice == Some(AdvisoryTag::DoNotWater) && m > thresholds.moisture_low {
            set_water(WaterAction::Wait, GuardrailRule::PredictionHoldsWatering, &mut water);
        }
        // 4
        if watering_advice == Some(AdvisoryTag::Water) && m < thresholds.moisture_ok {
            let forced = if m <= thresholds.moisture_low {
                WaterAction::WaterNow
            } else {
                WaterAction::CheckSoon
            };
            set_water(forced, GuardrailRule::PredictionRequestsWatering, &mut water);
        }
    }

    let (new_light, light_rule) = reconcile_light(light, lux, thresholds, prediction);
    if new_light != light {
        debug!("guardrail {:?}: light {} -> {}", light_rule, light, new_light);
        applied.push(light_rule);
        light = new_light;
    }

    let mut recheck_hours = seed
        .recheck_hours
        .filter(|h| h.is_finite() && *h > 0.0)
        .unwrap_or_else(|| water.default_recheck_hours());

    if let Some(m) = moisture {
        if m <= thresholds.moisture_low {
            urgency = Urgency::High;
            recheck_hours = recheck_hours.min(DRY_RECHECK_CAP_HOURS);
        } else if m >= thresholds.moisture_ok && water == WaterAction::Wait {
            recheck_hours = recheck_hours.max(WET_RECHECK_FLOOR_HOURS);
            if urgency != Urgency::High {
                urgency = Urgency::Medium;
            }
        }
    }

    DecisionCore {
        water,
        light,
        urgency,
        recheck_hours,
        applied,
    }
}

fn reconcile_light(
    current: LightAction,
    lux: Option<f64>,
    thresholds: &Thresholds,
    prediction: Option<&Prediction>,
) -> (LightAction, GuardrailRule) {
    if let Some(l) = lux {
        return if l < thresholds.lux_low {
            (LightAction::Increase, GuardrailRule::LuxBelowLow)
        } else if l > thresholds.lux_high {
            (LightAction::Reduce, GuardrailRule::LuxAboveHigh)
        } else {
            (LightAction::Ok, GuardrailRule::LuxInRange)
        };
    }

    let advised = prediction
        .and_then(|p| light_tag(&p.light_action))
        .map(|tag| match tag {
            AdvisoryTag::ReduceLight => LightAction::Reduce,
            _ => LightAction::Increase,
        });
    (advised.unwrap_or(current), GuardrailRule::PredictionLight)
}
