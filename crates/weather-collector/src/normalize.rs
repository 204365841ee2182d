//! Validation and assembly of the outbound message schema.
//!
//! A [`NormalizedMessage`] can only be built through [`normalize`], which
//! rejects the reading before anything is assembled. [`check_schema`] is the
//! independent check run on the JSON form just before a message leaves the
//! process.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SerializationError, ValidationError};
use crate::extract::ExtractedReading;

/// Source label attached to messages built from Open-Meteo data.
pub const DEFAULT_SOURCE: &str = "open-meteo";

const TOP_LEVEL_FIELDS: [&str; 4] = ["timestamp", "location", "weather", "source"];
const LOCATION_FIELDS: [&str; 3] = ["city", "latitude", "longitude"];
const WEATHER_FIELDS: [&str; 5] = [
    "temperature",
    "humidity",
    "windSpeed",
    "condition",
    "rainProbability",
];

/// Where the observation was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Observed values, camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weather {
    pub temperature: f64,
    pub humidity: i64,
    pub wind_speed: f64,
    pub condition: String,
    pub rain_probability: i64,
}

/// The message published for every successful cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// RFC 3339 UTC timestamp with explicit offset.
    pub timestamp: String,
    pub location: Location,
    pub weather: Weather,
    pub source: String,
}

/// Validate a reading and build the outbound message around it.
///
/// The timestamp is taken at call time. Errors name the offending field.
pub fn normalize(
    reading: &ExtractedReading,
    city: &str,
    latitude: f64,
    longitude: f64,
    source: &str,
) -> Result<NormalizedMessage, ValidationError> {
    validate_reading(reading)?;
    validate_coordinates(latitude, longitude)?;

    Ok(NormalizedMessage {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        location: Location {
            city: city.to_string(),
            latitude,
            longitude,
        },
        weather: Weather {
            temperature: reading.temperature,
            humidity: reading.humidity,
            wind_speed: reading.wind_speed,
            condition: reading.condition.clone(),
            rain_probability: reading.rain_probability,
        },
        source: source.to_string(),
    })
}

fn validate_reading(reading: &ExtractedReading) -> Result<(), ValidationError> {
    if !reading.temperature.is_finite() {
        return Err(ValidationError::new(
            "temperature",
            format!("{} is not a number", reading.temperature),
        ));
    }
    check_percentage("humidity", reading.humidity)?;
    if !reading.wind_speed.is_finite() || reading.wind_speed < 0.0 {
        return Err(ValidationError::new(
            "wind_speed",
            format!("{} must be a non-negative number", reading.wind_speed),
        ));
    }
    if reading.condition.trim().is_empty() {
        return Err(ValidationError::new("condition", "must not be empty"));
    }
    check_percentage("rain_probability", reading.rain_probability)
}

fn check_percentage(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if (0..=100).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field,
            format!("{value} is outside [0, 100]"),
        ))
    }
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), ValidationError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ValidationError::new(
            "latitude",
            format!("{latitude} is outside [-90, 90]"),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ValidationError::new(
            "longitude",
            format!("{longitude} is outside [-180, 180]"),
        ));
    }
    Ok(())
}

/// Encode a message as UTF-8 JSON. Non-ASCII text is kept as-is.
pub fn serialize(message: &NormalizedMessage) -> Result<String, SerializationError> {
    Ok(serde_json::to_string(message)?)
}

/// Check the JSON form of a message against the published schema.
pub fn check_schema(value: &Value) -> Result<(), ValidationError> {
    let root = value
        .as_object()
        .ok_or_else(|| ValidationError::new("message", "must be a JSON object"))?;

    for field in TOP_LEVEL_FIELDS {
        if !root.contains_key(field) {
            return Err(ValidationError::new(field, "missing top-level field"));
        }
    }

    check_nested(&root["location"], "location", &LOCATION_FIELDS)?;
    check_nested(&root["weather"], "weather", &WEATHER_FIELDS)?;

    let timestamp = root["timestamp"]
        .as_str()
        .ok_or_else(|| ValidationError::new("timestamp", "must be a string"))?;
    DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| ValidationError::new("timestamp", format!("invalid format: {e}")))?;

    Ok(())
}

fn check_nested(
    value: &Value,
    name: &'static str,
    fields: &[&'static str],
) -> Result<(), ValidationError> {
    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::new(name, "must be an object"))?;
    for &field in fields {
        if !object.contains_key(field) {
            return Err(ValidationError::new(
                field,
                format!("missing {name} field"),
            ));
        }
    }
    Ok(())
}

/// Boolean form of [`check_schema`].
pub fn validate_schema(value: &Value) -> bool {
    check_schema(value).is_ok()
}
