// Alert model types.
//
// The JSON shape (camelCase, `type` field) is what the responder endpoint
// and the UI consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::model::{CaptureStatus, Location, MediaKind, TelemetrySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Sos,
    Panic,
    Medical,
    Fire,
    Police,
}

impl AlertType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sos => "SOS",
            Self::Panic => "Panic",
            Self::Medical => "Medical",
            Self::Fire => "Fire",
            Self::Police => "Police",
        }
    }

    /// Message sent along with the alert
    pub fn message(&self) -> String {
        format!("{} alert triggered", self.display_name())
    }

    pub fn all() -> &'static [AlertType] {
        &[
            Self::Sos,
            Self::Panic,
            Self::Medical,
            Self::Fire,
            Self::Police,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
    Cancelled,
}

/// Someone to notify when an alert goes out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub id: u64,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    /// Higher is notified first
    #[serde(default)]
    pub priority: i32,
}

/// Contact names in notification order: priority descending, ties keep
/// their configured order.
pub fn notification_order(contacts: &[EmergencyContact]) -> Vec<String> {
    let mut ordered: Vec<&EmergencyContact> = contacts.iter().collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
    ordered.into_iter().map(|c| c.name.clone()).collect()
}

/// Everything the escalation machine knows at the moment it commits to
/// dispatching.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerContext {
    /// Escalation cycle this dispatch belongs to
    pub cycle: u64,
    pub alert_type: AlertType,
    pub location: Option<Location>,
    pub telemetry: TelemetrySnapshot,
    pub capture: CaptureStatus,
}

/// A dispatched alert. Built once by the dispatcher and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub location: Option<Location>,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub status: AlertStatus,
    pub is_recording: bool,
    pub media_type: Option<MediaKind>,
    pub telemetry: TelemetrySnapshot,
    pub notified_contacts: Vec<String>,
    pub nearest_safe_spaces: Vec<String>,
}
