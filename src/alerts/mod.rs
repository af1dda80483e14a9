//! Alert rows: kinds, severities, and the append/notify pipeline.

pub mod feed;
pub mod notifier;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use feed::{AlertFeed, AnomalyFeed, JsonFeed};
pub use notifier::{AlertProcessor, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    EconomicCalendar,
    WhiteHouse,
    Anomaly,
    StrategyMonitor,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::EconomicCalendar => "economic_calendar",
            AlertKind::WhiteHouse => "white_house",
            AlertKind::Anomaly => "anomaly",
            AlertKind::StrategyMonitor => "strategy_monitor",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "economic_calendar" => Ok(AlertKind::EconomicCalendar),
            "white_house" => Ok(AlertKind::WhiteHouse),
            "anomaly" => Ok(AlertKind::Anomaly),
            "strategy_monitor" => Ok(AlertKind::StrategyMonitor),
            other => Err(format!("unknown alert kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Lenient parse for upstream payloads. Unknown values read as `Info`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "high" | "error" => Severity::Critical,
            "warning" | "warn" | "medium" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAlert {
    pub kind: AlertKind,
    pub external_id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub payload: serde_json::Value,
}
