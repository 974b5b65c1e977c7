//! Sensor telemetry, per-plant thresholds and the optional external prediction.
//!
//! Readings and thresholds arrive from devices and user settings, so numeric
//! fields are deserialized leniently: numbers and numeric strings are accepted,
//! anything else is "unknown" (readings) or the documented default (thresholds).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_MOISTURE_LOW: f64 = 15.0;
pub const DEFAULT_MOISTURE_OK: f64 = 30.0;
pub const DEFAULT_LUX_LOW: f64 = 1000.0;
pub const DEFAULT_LUX_HIGH: f64 = 18000.0;

/// A single moisture/light/temperature measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Soil moisture in percent
    #[serde(default, deserialize_with = "lenient_number")]
    pub moisture: Option<f64>,
    /// Illuminance in lux
    #[serde(default, deserialize_with = "lenient_number")]
    pub lux: Option<f64>,
    /// Air temperature in °C, when the device has a probe
    #[serde(default, deserialize_with = "lenient_number")]
    pub temperature: Option<f64>,
    #[serde(default, alias = "capturedAt", alias = "created_at")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl TelemetryReading {
    pub fn new(moisture: f64, lux: f64) -> Self {
        Self {
            moisture: Some(moisture),
            lux: Some(lux),
            temperature: None,
            captured_at: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// Moisture if present and finite.
    pub fn moisture(&self) -> Option<f64> {
        known(self.moisture)
    }

    /// Lux if present and finite.
    pub fn lux(&self) -> Option<f64> {
        known(self.lux)
    }

    pub fn temperature(&self) -> Option<f64> {
        known(self.temperature)
    }
}

/// Moisture of an optional reading, `None` when absent or non-finite.
pub fn moisture_of(reading: Option<&TelemetryReading>) -> Option<f64> {
    reading.and_then(TelemetryReading::moisture)
}

/// Lux of an optional reading, `None` when absent or non-finite.
pub fn lux_of(reading: Option<&TelemetryReading>) -> Option<f64> {
    reading.and_then(TelemetryReading::lux)
}

fn known(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Per-plant guardrail thresholds.
///
/// Missing or non-numeric values fall back to the defaults, never to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ThresholdsWire")]
pub struct Thresholds {
    pub moisture_low: f64,
    pub moisture_ok: f64,
    pub lux_low: f64,
    pub lux_high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            moisture_low: DEFAULT_MOISTURE_LOW,
            moisture_ok: DEFAULT_MOISTURE_OK,
            lux_low: DEFAULT_LUX_LOW,
            lux_high: DEFAULT_LUX_HIGH,
        }
    }
}

#[derive(Deserialize, Default)]
struct ThresholdsWire {
    #[serde(default, alias = "moistureLow")]
    moisture_low: Option<Value>,
    #[serde(default, alias = "moistureOk")]
    moisture_ok: Option<Value>,
    #[serde(default, alias = "luxLow")]
    lux_low: Option<Value>,
    #[serde(default, alias = "luxHigh")]
    lux_high: Option<Value>,
}

impl From<ThresholdsWire> for Thresholds {
    fn from(wire: ThresholdsWire) -> Self {
        let pick = |v: Option<Value>, default: f64| {
            v.as_ref().and_then(number_from_value).unwrap_or(default)
        };
        Self {
            moisture_low: pick(wire.moisture_low, DEFAULT_MOISTURE_LOW),
            moisture_ok: pick(wire.moisture_ok, DEFAULT_MOISTURE_OK),
            lux_low: pick(wire.lux_low, DEFAULT_LUX_LOW),
            lux_high: pick(wire.lux_high, DEFAULT_LUX_HIGH),
        }
    }
}

/// Externally computed advisory. Action fields are free text and are matched
/// by phrase, see `guardrail::PHRASE_TABLE`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default, alias = "wateringAction")]
    pub watering_action: String,
    #[serde(default, alias = "lightAction")]
    pub light_action: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub summary: String,
}

/// Finite number from a JSON number or numeric string.
pub fn number_from_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}
