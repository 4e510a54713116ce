//! Error records, wire reports and node registrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage and wire encoding of "no valve".
pub const VALVE_NONE: i64 = -1;

/// Decode a stored/wire valve number; any negative value means no valve.
pub fn valve_from_sentinel(raw: i64) -> Option<u32> {
    if raw < 0 {
        return None;
    }
    u32::try_from(raw).ok()
}

pub fn valve_to_sentinel(valve: Option<u32>) -> i64 {
    valve.map_or(VALVE_NONE, i64::from)
}

/// Node-supplied unix seconds; `None` when out of range.
pub fn reported_time_from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Convert unix seconds to a UTC timestamp, clamping out-of-range values to the epoch.
pub fn timestamp_from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    Hardware,
    Software,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Software => "software",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hardware => "Hardware",
            Self::Software => "Software",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hardware" | "hw" => Ok(Self::Hardware),
            "software" | "sw" => Ok(Self::Software),
            other => Err(format!("invalid error kind: {other}")),
        }
    }
}

/// Read-only snapshot of one persisted error, as returned by a store query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub id: i64,
    /// When the monitor received the report. Records are ordered by this.
    pub received_at: DateTime<Utc>,
    /// The node's own stamp, if it sent one that fits a timestamp.
    pub reported_at: Option<DateTime<Utc>>,
    /// Rendered text, e.g. `Hardware Error: Valve 2 exploded`.
    pub message: String,
    pub rack: u32,
    pub chassis: u32,
    pub valve: Option<u32>,
    /// Whether the reporting node is enabled. Errors from unknown nodes count as enabled.
    pub enabled: bool,
}

/// Render the message text stored alongside a record.
pub fn render_message(kind: ErrorKind, text: &str) -> String {
    format!("{} Error: {}", kind.label(), text.trim())
}

/// An error report as it arrives from a node over the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub rack: u32,
    pub chassis: u32,
    #[serde(default = "default_valve")]
    pub valve: i64,
    /// Unix seconds stamped by the node; the receipt time is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub kind: ErrorKind,
    pub message: String,
}

fn default_valve() -> i64 {
    VALVE_NONE
}

impl ErrorReport {
    pub fn new(rack: u32, chassis: u32, valve: Option<u32>, kind: ErrorKind, message: &str) -> Self {
        Self {
            rack,
            chassis,
            valve: valve_to_sentinel(valve),
            timestamp: None,
            kind,
            message: message.to_string(),
        }
    }

    pub fn valve(&self) -> Option<u32> {
        valve_from_sentinel(self.valve)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("error message is required".to_string());
        }
        if self.valve > i64::from(u32::MAX) {
            return Err(format!("valve number out of range: {}", self.valve));
        }
        Ok(())
    }

    /// The node's own stamp. Out-of-range values read as absent.
    pub fn reported_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(reported_time_from_unix)
    }

    pub fn rendered_message(&self) -> String {
        render_message(self.kind, &self.message)
    }
}

/// A registered rig node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub rack: u32,
    pub chassis: u32,
    pub mac_address: String,
    pub enabled: bool,
    pub config_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_valve_sentinel_means_none() {
        assert_eq!(valve_from_sentinel(-1), None);
        assert_eq!(valve_from_sentinel(-42), None);
        assert_eq!(valve_from_sentinel(3), Some(3));
        assert_eq!(valve_to_sentinel(None), VALVE_NONE);
        assert_eq!(valve_to_sentinel(Some(7)), 7);
    }

    #[test]
    fn report_defaults_missing_valve_and_kind() {
        let report: ErrorReport =
            match serde_json::from_str(r#"{"rack":0,"chassis":22,"message":"hi"}"#) {
                Ok(value) => value,
                Err(err) => panic!("decode report: {err}"),
            };
        assert_eq!(report.valve(), None);
        assert_eq!(report.kind, ErrorKind::Hardware);
        assert_eq!(report.rendered_message(), "Hardware Error: hi");
    }

    #[test]
    fn report_validation_rejects_blank_message() {
        let report = ErrorReport::new(1, 2, None, ErrorKind::Software, "   ");
        assert!(report.validate().is_err());
        let report = ErrorReport::new(1, 2, Some(3), ErrorKind::Software, "boom");
        assert!(report.validate().is_ok());
    }

    #[test]
    fn reported_time_drops_out_of_range_stamps() {
        let mut report = ErrorReport::new(1, 2, None, ErrorKind::Hardware, "x");
        assert_eq!(report.reported_time(), None);
        report.timestamp = Some(1_000);
        assert_eq!(report.reported_time(), Some(timestamp_from_unix(1_000)));
        report.timestamp = Some(i64::MAX);
        assert_eq!(report.reported_time(), None);
    }

    #[test]
    fn error_kind_parse_accepts_short_forms() {
        assert_eq!(ErrorKind::parse("SW"), Ok(ErrorKind::Software));
        assert_eq!(ErrorKind::parse("hardware"), Ok(ErrorKind::Hardware));
        assert!(ErrorKind::parse("firmware").is_err());
    }
}
