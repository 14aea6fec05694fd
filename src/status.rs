//! Plot status derived from alert severity

use crate::event::{AlertKind, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Plot status code, persisted as its ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum StatusCode {
    /// 0
    #[default]
    Normal,
    /// 1
    Alert,
    /// 2
    Critical,
}

impl StatusCode {
    /// Stored ordinal
    pub fn ordinal(self) -> u8 {
        match self {
            StatusCode::Normal => 0,
            StatusCode::Alert => 1,
            StatusCode::Critical => 2,
        }
    }

    /// Default description when no specific text is available
    pub fn label(self) -> &'static str {
        match self {
            StatusCode::Normal => "Normal",
            StatusCode::Alert => "Alert",
            StatusCode::Critical => "Critical",
        }
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> Self {
        code.ordinal()
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Normal),
            1 => Ok(StatusCode::Alert),
            2 => Ok(StatusCode::Critical),
            other => Err(format!("invalid status ordinal {}", other)),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status written to a plot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotStatus {
    /// Status code
    pub code: StatusCode,
    /// Human-readable description
    pub description: String,
    /// Time of the write
    pub updated_at: DateTime<Utc>,
}

impl PlotStatus {
    /// Build a status, defaulting a blank description to the code label
    pub fn new(code: StatusCode, description: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        let description = description.into();
        let description = if description.trim().is_empty() {
            code.label().to_string()
        } else {
            description
        };
        Self {
            code,
            description,
            updated_at,
        }
    }
}

/// Map a severity to the plot status code
pub fn status_code(severity: Severity) -> StatusCode {
    match severity {
        Severity::Low | Severity::Unrecognized => StatusCode::Normal,
        Severity::Medium => StatusCode::Alert,
        Severity::High => StatusCode::Critical,
    }
}

/// Map kind and severity to a description
pub fn status_description(kind: &AlertKind, severity: Severity) -> &'static str {
    match (kind, severity) {
        (AlertKind::SoilMoisture, Severity::Medium) => "Alert – drought risk",
        (AlertKind::SoilMoisture, Severity::High) => "Critical – drought detected",
        (AlertKind::Temperature, Severity::Medium) => "Alert – abnormal temperature",
        (AlertKind::Temperature, Severity::High) => "Critical – thermal stress",
        (AlertKind::Precipitation, Severity::Medium) => "Alert – abnormal precipitation",
        (AlertKind::Precipitation, Severity::High) => "Critical – flood risk",
        (AlertKind::SoilMoisture, Severity::Low | Severity::Unrecognized)
        | (AlertKind::Temperature, Severity::Low | Severity::Unrecognized)
        | (AlertKind::Precipitation, Severity::Low | Severity::Unrecognized)
        | (AlertKind::Other(_), _) => "Normal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(Severity::Low, StatusCode::Normal)]
    #[case(Severity::Medium, StatusCode::Alert)]
    #[case(Severity::High, StatusCode::Critical)]
    #[case(Severity::Unrecognized, StatusCode::Normal)]
    fn test_status_code(#[case] severity: Severity, #[case] expected: StatusCode) {
        assert_eq!(status_code(severity), expected);
    }

    #[rstest]
    #[case(AlertKind::SoilMoisture, Severity::Medium, "Alert – drought risk")]
    #[case(AlertKind::SoilMoisture, Severity::High, "Critical – drought detected")]
    #[case(AlertKind::Temperature, Severity::Medium, "Alert – abnormal temperature")]
    #[case(AlertKind::Temperature, Severity::High, "Critical – thermal stress")]
    #[case(AlertKind::Precipitation, Severity::Medium, "Alert – abnormal precipitation")]
    #[case(AlertKind::Precipitation, Severity::High, "Critical – flood risk")]
    #[case(AlertKind::SoilMoisture, Severity::Low, "Normal")]
    #[case(AlertKind::Temperature, Severity::Low, "Normal")]
    #[case(AlertKind::Precipitation, Severity::Low, "Normal")]
    #[case(AlertKind::SoilMoisture, Severity::Unrecognized, "Normal")]
    #[case(AlertKind::Temperature, Severity::Unrecognized, "Normal")]
    #[case(AlertKind::Precipitation, Severity::Unrecognized, "Normal")]
    #[case(AlertKind::Other("wind".into()), Severity::Low, "Normal")]
    #[case(AlertKind::Other("wind".into()), Severity::Medium, "Normal")]
    #[case(AlertKind::Other("wind".into()), Severity::High, "Normal")]
    #[case(AlertKind::Other(String::new()), Severity::Unrecognized, "Normal")]
    fn test_status_description(
        #[case] kind: AlertKind,
        #[case] severity: Severity,
        #[case] expected: &str,
    ) {
        assert_eq!(status_description(&kind, severity), expected);
    }

    #[test]
    fn test_ordinals_round_trip_through_serde() {
        let json = serde_json::to_string(&StatusCode::Critical).unwrap();
        assert_eq!(json, "2");
        let code: StatusCode = serde_json::from_str("1").unwrap();
        assert_eq!(code, StatusCode::Alert);
        assert!(serde_json::from_str::<StatusCode>("7").is_err());
    }

    #[test]
    fn test_blank_description_defaults_to_label() {
        let status = PlotStatus::new(StatusCode::Alert, "  ", Utc::now());
        assert_eq!(status.description, "Alert");
    }

    proptest! {
        #[test]
        fn unknown_severity_tokens_map_to_normal(token in "[a-z]{1,12}") {
            prop_assume!(!matches!(token.as_str(), "low" | "baixa" | "medium" | "media" | "high" | "alta"));
            prop_assert_eq!(status_code(Severity::parse(&token)), StatusCode::Normal);
        }

        #[test]
        fn unknown_kinds_describe_as_normal(token in "[a-z]{1,12}", sev in 0u8..4) {
            let kind = AlertKind::parse(&token);
            prop_assume!(matches!(kind, AlertKind::Other(_)));
            let severity = match sev {
                0 => Severity::Unrecognized,
                1 => Severity::Low,
                2 => Severity::Medium,
                _ => Severity::High,
            };
            prop_assert_eq!(status_description(&kind, severity), "Normal");
        }
    }
}
