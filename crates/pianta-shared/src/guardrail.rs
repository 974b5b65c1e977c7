//! GUARDRAIL: sensor-derived rules and prediction conflict detection.
//!
//! Prediction action fields are free text. They are mapped to advisory tags
//! through `PHRASE_TABLE` by case-insensitive substring match, in table order,
//! so negative phrases ("do not water") are listed before the affirmative
//! phrases they contain ("water").
//!
//! A missing or non-finite reading never registers a conflict on its axis.

use crate::telemetry::{lux_of, moisture_of, Prediction, TelemetryReading, Thresholds};
use serde::{Deserialize, Serialize};

/// Semantic tag carried by a prediction phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryTag {
    DoNotWater,
    Water,
    IncreaseLight,
    ReduceLight,
}

impl AdvisoryTag {
    fn is_watering(&self) -> bool {
        matches!(self, Self::DoNotWater | Self::Water)
    }
}

/// Phrase -> tag. Order matters within each axis: first match wins.
pub const PHRASE_TABLE: &[(&str, AdvisoryTag)] = &[
    // Watering, negative first
    ("do not water", AdvisoryTag::DoNotWater),
    ("don't water", AdvisoryTag::DoNotWater),
    ("dont water", AdvisoryTag::DoNotWater),
    ("no water", AdvisoryTag::DoNotWater),
    ("skip watering", AdvisoryTag::DoNotWater),
    ("hold watering", AdvisoryTag::DoNotWater),
    ("non annaffiare", AdvisoryTag::DoNotWater),
    ("non innaffiare", AdvisoryTag::DoNotWater),
    ("non irrigare", AdvisoryTag::DoNotWater),
    ("niente acqua", AdvisoryTag::DoNotWater),
    ("wait", AdvisoryTag::DoNotWater),
    ("aspetta", AdvisoryTag::DoNotWater),
    // Watering, affirmative
    ("water", AdvisoryTag::Water),
    ("annaffia", AdvisoryTag::Water),
    ("innaffia", AdvisoryTag::Water),
    ("irriga", AdvisoryTag::Water),
    // Light
    ("increase", AdvisoryTag::IncreaseLight),
    ("more light", AdvisoryTag::IncreaseLight),
    ("aumenta", AdvisoryTag::IncreaseLight),
    ("piu luce", AdvisoryTag::IncreaseLight),
    ("più luce", AdvisoryTag::IncreaseLight),
    ("reduce", AdvisoryTag::ReduceLight),
    ("shade", AdvisoryTag::ReduceLight),
    ("less light", AdvisoryTag::ReduceLight),
    ("riduci", AdvisoryTag::ReduceLight),
    ("meno luce", AdvisoryTag::ReduceLight),
    ("ombra", AdvisoryTag::ReduceLight),
];

/// Watering tag of a free-text action, if any phrase matches.
pub fn watering_tag(text: &str) -> Option<AdvisoryTag> {
    first_tag(text, |tag| tag.is_watering())
}

/// Light tag of a free-text action, if any phrase matches.
pub fn light_tag(text: &str) -> Option<AdvisoryTag> {
    first_tag(text, |tag| !tag.is_watering())
}

fn first_tag(text: &str, axis: impl Fn(&AdvisoryTag) -> bool) -> Option<AdvisoryTag> {
    let lower = text.to_lowercase();
    PHRASE_TABLE
        .iter()
        .filter(|(_, tag)| axis(tag))
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, tag)| *tag)
}

/// Watering conflict: "do not water" while dry, or "water" while wet enough.
pub fn watering_conflict(
    moisture: Option<f64>,
    moisture_low: f64,
    moisture_ok: f64,
    predicted_action: &str,
) -> bool {
    let Some(m) = moisture.filter(|v| v.is_finite()) else {
        return false;
    };
    match watering_tag(predicted_action) {
        Some(AdvisoryTag::DoNotWater) => m <= moisture_low,
        Some(AdvisoryTag::Water) => m >= moisture_ok,
        _ => false,
    }
}

/// Light conflict: "increase" above the high bound, "reduce" below the low one.
pub fn light_conflict(lux: Option<f64>, lux_low: f64, lux_high: f64, predicted_light: &str) -> bool {
    let Some(l) = lux.filter(|v| v.is_finite()) else {
        return false;
    };
    match light_tag(predicted_light) {
        Some(AdvisoryTag::IncreaseLight) => l > lux_high,
        Some(AdvisoryTag::ReduceLight) => l < lux_low,
        _ => false,
    }
}

/// Which axes disagree between the sensors and the prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub watering: bool,
    pub light: bool,
}

impl ConflictReport {
    pub fn any(&self) -> bool {
        self.watering || self.light
    }

    /// Human-readable note for the reply, `None` when nothing conflicts.
    pub fn note(&self) -> Option<String> {
        let text = match (self.watering, self.light) {
            (true, true) => {
                "la previsione su acqua e luce contrasta con i sensori: seguo i dati misurati."
            }
            (true, false) => "la previsione sull'acqua contrasta con l'umidita misurata: seguo il sensore.",
            (false, true) => "la previsione sulla luce contrasta con la luce misurata: seguo il sensore.",
            (false, false) => return None,
        };
        Some(text.to_string())
    }
}

/// Evaluate both axes for a reading/prediction pair.
pub fn evaluate(
    reading: Option<&TelemetryReading>,
    thresholds: &Thresholds,
    prediction: Option<&Prediction>,
) -> ConflictReport {
    let Some(p) = prediction else {
        return ConflictReport::default();
    };
    ConflictReport {
        watering: watering_conflict(
            moisture_of(reading),
            thresholds.moisture_low,
            thresholds.moisture_ok,
            &p.watering_action,
        ),
        light: light_conflict(
            lux_of(reading),
            thresholds.lux_low,
            thresholds.lux_high,
            &p.light_action,
        ),
    }
}

/// True if either axis conflicts.
pub fn sensor_conflict(
    reading: Option<&TelemetryReading>,
    thresholds: &Thresholds,
    prediction: Option<&Prediction>,
) -> bool {
    evaluate(reading, thresholds, prediction).any()
}

/// Care note for a plant type, matched by keyword.
const SPECIES_HINTS: &[(&[&str], &str)] = &[
    (
        &["peperoncin", "chili", "pepper"],
        "Peperoncino: ama il sole pieno (almeno 6 ore), terreno che asciuga tra un'annaffiatura e l'altra, teme i ristagni.",
    ),
    (
        &["pomodor", "tomato"],
        "Pomodoro: molto sole, annaffiature regolari alla base senza bagnare le foglie.",
    ),
    (
        &["basilic", "basil"],
        "Basilico: terreno sempre leggermente umido, luce intensa ma non sole rovente nelle ore centrali.",
    ),
    (
        &["succulent", "cactus", "crass"],
        "Succulenta: annaffia solo a terreno completamente asciutto, tanta luce, mai ristagni.",
    ),
    (
        &["orchide"],
        "Orchidea: luce indiretta luminosa, immersione del vaso solo quando le radici diventano argentate.",
    ),
    (
        &["felce", "fern"],
        "Felce: mezz'ombra, substrato umido ma non zuppo, ama l'umidita dell'aria.",
    ),
];

const DEFAULT_SPECIES_HINT: &str =
    "Pianta generica: annaffia quando i primi centimetri di terreno sono asciutti, luce indiretta luminosa.";

/// Species-specific care note; generic note when the type is unknown.
pub fn species_hint(plant_type: &str) -> &'static str {
    let lower = plant_type.to_lowercase();
    SPECIES_HINTS
        .iter()
        .find(|(keys, _)| keys.iter().any(|k| lower.contains(k)))
        .map(|(_, hint)| *hint)
        .unwrap_or(DEFAULT_SPECIES_HINT)
}

/// Rule listing for the model prompt.
pub fn describe(
    thresholds: &Thresholds,
    plant_type: &str,
    reading: Option<&TelemetryReading>,
    prediction: Option<&Prediction>,
) -> String {
    let mut lines = vec![
        "Regole di sicurezza (i dati dei sensori prevalgono sempre):".to_string(),
        format!(
            "- Umidita <= {:.0}%: annaffiare subito (water_now), urgenza alta, ricontrollo entro 6 ore.",
            thresholds.moisture_low
        ),
        format!(
            "- Umidita >= {:.0}%: non annaffiare (wait), ricontrollo dopo almeno 18 ore.",
            thresholds.moisture_ok
        ),
        format!(
            "- Luce < {:.0} lx: aumentare la luce (increase); luce > {:.0} lx: ridurla (reduce).",
            thresholds.lux_low, thresholds.lux_high
        ),
        format!("- {}", species_hint(plant_type)),
    ];

    if let Some(note) = evaluate(reading, thresholds, prediction).note() {
        lines.push(format!("- Attenzione: {}", note));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_phrase_beats_affirmative() {
        assert_eq!(watering_tag("Do NOT water today"), Some(AdvisoryTag::DoNotWater));
        assert_eq!(watering_tag("non annaffiare"), Some(AdvisoryTag::DoNotWater));
        assert_eq!(watering_tag("Water now"), Some(AdvisoryTag::Water));
        assert_eq!(watering_tag("annaffia domani"), Some(AdvisoryTag::Water));
        assert_eq!(watering_tag("keep"), None);
    }

    #[test]
    fn test_light_tags() {
        assert_eq!(light_tag("Increase light"), Some(AdvisoryTag::IncreaseLight));
        assert_eq!(light_tag("move to shade"), Some(AdvisoryTag::ReduceLight));
        assert_eq!(light_tag("ok"), None);
        // watering phrases never leak into the light axis
        assert_eq!(light_tag("water"), None);
    }

    #[test]
    fn test_watering_conflict_cases() {
        assert!(watering_conflict(Some(10.0), 15.0, 30.0, "do not water"));
        assert!(watering_conflict(Some(15.0), 15.0, 30.0, "do not water"));
        assert!(!watering_conflict(Some(20.0), 15.0, 30.0, "do not water"));
        assert!(watering_conflict(Some(30.0), 15.0, 30.0, "water"));
        assert!(!watering_conflict(Some(29.9), 15.0, 30.0, "water"));
    }

    #[test]
    fn test_unknown_reading_never_conflicts() {
        assert!(!watering_conflict(None, 15.0, 30.0, "do not water"));
        assert!(!watering_conflict(Some(f64::NAN), 15.0, 30.0, "water"));
        assert!(!light_conflict(None, 1000.0, 18000.0, "increase"));
    }

    #[test]
    fn test_light_conflict_cases() {
        assert!(light_conflict(Some(20000.0), 1000.0, 18000.0, "increase"));
        assert!(!light_conflict(Some(18000.0), 1000.0, 18000.0, "increase"));
        assert!(light_conflict(Some(500.0), 1000.0, 18000.0, "shade"));
        assert!(!light_conflict(Some(1000.0), 1000.0, 18000.0, "reduce"));
    }

    #[test]
    fn test_evaluate_without_prediction() {
        let reading = TelemetryReading::new(5.0, 100.0);
        assert!(!sensor_conflict(Some(&reading), &Thresholds::default(), None));
    }

    #[test]
    fn test_conflict_note() {
        let both = ConflictReport { watering: true, light: true };
        assert!(both.note().unwrap().contains("acqua e luce"));
        assert!(ConflictReport::default().note().is_none());
    }

    #[test]
    fn test_species_hint() {
        assert!(species_hint("Peperoncino Habanero").starts_with("Peperoncino"));
        assert!(species_hint("").starts_with("Pianta generica"));
        assert!(species_hint("Crassula ovata").starts_with("Succulenta"));
        assert!(species_hint("lemongrass").starts_with("Pianta generica"));
    }

    #[test]
    fn test_describe_includes_thresholds_and_conflict() {
        let reading = TelemetryReading::new(8.0, 5000.0);
        let prediction = Prediction {
            watering_action: "do not water".into(),
            ..Default::default()
        };
        let text = describe(&Thresholds::default(), "basilico", Some(&reading), Some(&prediction));
        assert!(text.contains("<= 15%"));
        assert!(text.contains(">= 30%"));
        assert!(text.contains("Basilico"));
        assert!(text.contains("Attenzione"));
    }
}
