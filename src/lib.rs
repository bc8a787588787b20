pub mod actors;
pub mod config;
pub mod history;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One successfully parsed measurement triple plus the time it was taken.
///
/// Produced only by the poller on a successful fetch and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    pub timestamp: DateTime<Utc>,
}

/// Wire format of the device's `/sensors` endpoint.
///
/// The firmware reports the soil probe under the shorter `soil` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorPayload {
    pub temperature: f64,
    pub humidity: f64,
    pub soil: f64,
}

impl SensorPayload {
    pub fn into_reading(self, timestamp: DateTime<Utc>) -> SensorReading {
        SensorReading {
            temperature: self.temperature,
            humidity: self.humidity,
            soil_moisture: self.soil,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Temperature,
    Humidity,
    Soil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A single threshold violation raised by the alert engine.
///
/// Only the `active` flag is ever mutated (via dismissal); everything else is
/// fixed at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl Alert {
    pub fn new(kind: AlertKind, severity: Severity, message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            message,
            severity,
            created_at: Utc::now(),
            active: true,
        }
    }
}
