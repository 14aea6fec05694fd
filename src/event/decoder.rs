//! Payload decoding for alert events
//!
//! Field names are matched case-insensitively; `_` and `-` inside a field
//! name are ignored so `plotId`, `PlotId` and `plot_id` are equivalent.
//! The Portuguese field names used by the alert producer (`talhaoId`,
//! `tipoAlerta`, `severidade`, ...) are accepted as aliases.

use super::{AlertEvent, AlertKind, PlotId, Severity};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Reasons a payload can never become a valid [`AlertEvent`]
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Nothing to decode
    #[error("empty payload")]
    Empty,

    /// Not JSON, or a field has the wrong type
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON but not an object
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// `plotId` absent or blank
    #[error("missing plotId")]
    MissingPlotId,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Identifier {
    Text(String),
    Number(serde_json::Number),
}

impl Identifier {
    fn into_string(self) -> String {
        match self {
            Identifier::Text(s) => s,
            Identifier::Number(n) => n.to_string(),
        }
    }
}

/// Wire shape after key normalization
#[derive(Debug, Deserialize)]
struct RawAlertEvent {
    #[serde(rename = "alertid", alias = "alertaid")]
    alert_id: Option<Identifier>,
    #[serde(rename = "producerid", alias = "produtorid")]
    producer_id: Option<Identifier>,
    #[serde(rename = "plotid", alias = "talhaoid")]
    plot_id: Option<Identifier>,
    #[serde(rename = "alertkind", alias = "tipoalerta")]
    alert_kind: Option<Value>,
    #[serde(alias = "severidade")]
    severity: Option<Value>,
    #[serde(alias = "titulo")]
    title: Option<String>,
    #[serde(alias = "mensagem")]
    message: Option<String>,
    #[serde(rename = "detectedvalue", alias = "valorleitura")]
    detected_value: Option<f64>,
    #[serde(rename = "thresholdvalue")]
    threshold_value: Option<f64>,
    #[serde(rename = "createdat")]
    created_at: Option<Value>,
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn normalize_keys(object: Map<String, Value>) -> Map<String, Value> {
    let mut normalized = Map::with_capacity(object.len());
    for (key, value) in object {
        // first occurrence wins when two spellings collide
        normalized.entry(normalize_key(&key)).or_insert(value);
    }
    normalized
}

fn token(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// RFC 3339, or a naive ISO timestamp read as UTC. Anything else is dropped.
fn timestamp(value: Option<Value>) -> Option<DateTime<Utc>> {
    let text = token(value)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| text.parse::<NaiveDateTime>().map(|t| t.and_utc()))
        .ok()
}

/// Decode a raw payload into an [`AlertEvent`]
pub fn decode(payload: &[u8]) -> Result<AlertEvent, DecodeError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    let object = match serde_json::from_slice::<Value>(payload)? {
        Value::Object(object) => object,
        _ => return Err(DecodeError::NotAnObject),
    };

    let raw: RawAlertEvent = serde_json::from_value(Value::Object(normalize_keys(object)))?;

    let plot_id = raw
        .plot_id
        .map(Identifier::into_string)
        .and_then(PlotId::new)
        .ok_or(DecodeError::MissingPlotId)?;

    let kind = token(raw.alert_kind)
        .map(|t| AlertKind::parse(&t))
        .unwrap_or_default();
    let severity = token(raw.severity)
        .map(|t| Severity::parse(&t))
        .unwrap_or_default();

    Ok(AlertEvent {
        alert_id: raw.alert_id.map(Identifier::into_string),
        producer_id: raw.producer_id.map(Identifier::into_string),
        plot_id,
        kind,
        severity,
        title: raw.title,
        message: raw.message,
        detected_value: raw.detected_value,
        threshold_value: raw.threshold_value,
        created_at: timestamp(raw.created_at),
    })
}
