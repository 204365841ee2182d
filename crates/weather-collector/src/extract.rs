//! Extraction of a typed reading from a raw Open-Meteo response.

use serde_json::Value;

use crate::error::ExtractionError;
use crate::weather_codes::{condition_for_code, UNKNOWN_CONDITION};

const TEMPERATURE: &str = "temperature_2m";
const HUMIDITY: &str = "relative_humidity_2m";
const WIND_SPEED: &str = "wind_speed_10m";
const WEATHER_CODE: &str = "weather_code";
const PRECIPITATION_PROBABILITY: &str = "precipitation_probability";

/// Code assumed when the response carries none.
const DEFAULT_WEATHER_CODE: i64 = 0;

/// Weather values read out of one provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedReading {
    /// Air temperature at 2 m, °C.
    pub temperature: f64,
    /// Relative humidity at 2 m, percent.
    pub humidity: i64,
    /// Wind speed at 10 m, km/h.
    pub wind_speed: f64,
    /// Condition label from the WMO code table.
    pub condition: String,
    /// Precipitation probability for the current hour, percent.
    pub rain_probability: i64,
}

/// Extract the reading fields from a raw response.
///
/// Temperature, humidity and wind speed are required. A missing weather code
/// counts as clear sky, and missing hourly data yields a rain probability
/// of 0. A `null` first hourly value, which Open-Meteo sends for hours
/// without a forecast, is treated as 0 rather than an error.
pub fn extract(raw: &Value) -> Result<ExtractedReading, ExtractionError> {
    let current = raw.get("current");
    let field = |name: &'static str| current.and_then(|c| c.get(name));

    let temperature = require_f64(TEMPERATURE, field(TEMPERATURE))?;
    let humidity = require_f64(HUMIDITY, field(HUMIDITY))?.trunc() as i64;
    let wind_speed = require_f64(WIND_SPEED, field(WIND_SPEED))?;

    let condition = match field(WEATHER_CODE) {
        None => condition_for_code(DEFAULT_WEATHER_CODE),
        Some(code) => weather_code(code).map_or(UNKNOWN_CONDITION, condition_for_code),
    };

    let rain_probability = match raw
        .get("hourly")
        .and_then(|h| h.get(PRECIPITATION_PROBABILITY))
        .and_then(Value::as_array)
        .and_then(|probs| probs.first())
    {
        None | Some(Value::Null) => 0,
        Some(first) => coerce_f64(first)
            .ok_or_else(|| invalid(PRECIPITATION_PROBABILITY, first))?
            .trunc() as i64,
    };

    Ok(ExtractedReading {
        temperature,
        humidity,
        wind_speed,
        condition: condition.to_string(),
        rain_probability,
    })
}

fn require_f64(name: &'static str, value: Option<&Value>) -> Result<f64, ExtractionError> {
    match value {
        None | Some(Value::Null) => Err(ExtractionError::MissingField(name)),
        Some(v) => coerce_f64(v).ok_or_else(|| invalid(name, v)),
    }
}

/// Numbers pass through; numeric strings are parsed.
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Integral numeric codes only; anything else is not a known code.
fn weather_code(value: &Value) -> Option<i64> {
    if let Some(code) = value.as_i64() {
        return Some(code);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0)
        .map(|f| f as i64)
}

fn invalid(field: &'static str, value: &Value) -> ExtractionError {
    ExtractionError::InvalidField {
        field,
        value: value.to_string(),
    }
}
