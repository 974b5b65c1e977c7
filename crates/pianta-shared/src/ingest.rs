//! Telemetry ingestion payload validation.
//!
//! Devices post loosely typed JSON: numbers may arrive as strings and
//! `plant_id` may be numeric. Checks run in a fixed order so the first
//! failing rule decides the message.

use crate::telemetry::{number_from_value, TelemetryReading};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("moisture and lux must be numbers")]
    NonNumericReading,

    #[error("temperature must be a number")]
    NonNumericTemperature,

    #[error("plant_id is required")]
    MissingPlantId,

    #[error("created_at must be an RFC 3339 timestamp")]
    InvalidTimestamp,
}

/// A reading ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedReading {
    pub plant_id: String,
    pub moisture: f64,
    pub lux: f64,
    pub temperature: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ValidatedReading {
    pub fn to_reading(&self) -> TelemetryReading {
        TelemetryReading {
            moisture: Some(self.moisture),
            lux: Some(self.lux),
            temperature: self.temperature,
            captured_at: self.created_at,
        }
    }
}

pub fn validate_reading(payload: &Value) -> Result<ValidatedReading, IngestError> {
    let obj = payload.as_object().ok_or(IngestError::NotAnObject)?;
    let field = |name: &str| obj.get(name).filter(|v| !v.is_null());

    let moisture = field("moisture").and_then(number_from_value);
    let lux = field("lux").and_then(number_from_value);
    let (Some(moisture), Some(lux)) = (moisture, lux) else {
        return Err(IngestError::NonNumericReading);
    };

    let temperature = match field("temperature") {
        None => None,
        Some(v) => Some(number_from_value(v).ok_or(IngestError::NonNumericTemperature)?),
    };

    let plant_id = field("plant_id")
        .and_then(plant_id_text)
        .ok_or(IngestError::MissingPlantId)?;

    let created_at = match field("created_at").or_else(|| field("capturedAt")) {
        None => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(
            DateTime::parse_from_rfc3339(s.trim())
                .map_err(|_| IngestError::InvalidTimestamp)?
                .with_timezone(&Utc),
        ),
        Some(_) => return Err(IngestError::InvalidTimestamp),
    };

    Ok(ValidatedReading {
        plant_id,
        moisture,
        lux,
        temperature,
        created_at,
    })
}

/// Blank ids count as missing.
pub fn plant_id_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
