//! Alert events published by the monitoring system
//!
//! An [`AlertEvent`] is the strongly-typed form of an "alert created"
//! notification. Kind and severity are closed enumerations with a catch-all
//! variant so that an unknown token never aborts processing; it simply maps
//! to the lowest status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod decoder;

pub use decoder::{decode, DecodeError};

/// Identifier of the plot an alert refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlotId(String);

impl PlotId {
    /// Build a plot id, rejecting empty or whitespace-only values
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.len() == raw.len() {
            Some(Self(raw))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monitored condition that raised the alert
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertKind {
    /// Soil moisture (drought)
    SoilMoisture,
    /// Air or soil temperature
    Temperature,
    /// Rainfall
    Precipitation,
    /// Any token this service does not know about
    Other(String),
}

impl AlertKind {
    /// Parse a kind token. Matching ignores case and surrounding whitespace.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "moisture" | "soil_moisture" | "soil-moisture" | "soilmoisture" | "humidity"
            | "umidade" | "umidade_solo" => AlertKind::SoilMoisture,
            "temperature" | "temperatura" => AlertKind::Temperature,
            "precipitation" | "rainfall" | "precipitacao" | "precipitação" => {
                AlertKind::Precipitation
            }
            other => AlertKind::Other(other.to_string()),
        }
    }

    /// Canonical token for logs
    pub fn as_str(&self) -> &str {
        match self {
            AlertKind::SoilMoisture => "moisture",
            AlertKind::Temperature => "temperature",
            AlertKind::Precipitation => "precipitation",
            AlertKind::Other(raw) => raw,
        }
    }
}

impl Default for AlertKind {
    fn default() -> Self {
        AlertKind::Other(String::new())
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered seriousness of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Severity {
    /// Unknown or missing severity, ranked below `Low`
    #[default]
    Unrecognized,
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
}

impl Severity {
    /// Parse a severity token. Unknown tokens become [`Severity::Unrecognized`].
    pub fn parse(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "low" | "baixa" => Severity::Low,
            "medium" | "media" | "média" => Severity::Medium,
            "high" | "alta" => Severity::High,
            _ => Severity::Unrecognized,
        }
    }

    /// Canonical token for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unrecognized => "unrecognized",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded "alert created" notification
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    /// Upstream alert identifier, kept for traceability
    pub alert_id: Option<String>,
    /// Upstream producer identifier, kept for traceability
    pub producer_id: Option<String>,
    /// Target plot
    pub plot_id: PlotId,
    /// Monitored condition
    pub kind: AlertKind,
    /// Seriousness
    pub severity: Severity,
    /// Short title
    pub title: Option<String>,
    /// Free-text message
    pub message: Option<String>,
    /// Reading that triggered the alert
    pub detected_value: Option<f64>,
    /// Threshold the reading crossed
    pub threshold_value: Option<f64>,
    /// Creation time upstream
    pub created_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    /// Minimal event for a plot; everything else unset
    pub fn new(plot_id: PlotId, kind: AlertKind, severity: Severity) -> Self {
        Self {
            alert_id: None,
            producer_id: None,
            plot_id,
            kind,
            severity,
            title: None,
            message: None,
            detected_value: None,
            threshold_value: None,
            created_at: None,
        }
    }
}
