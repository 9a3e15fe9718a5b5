use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reading from the platform accelerometer (m/s² per axis).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelerationSample {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Sum of absolute per-axis differences to `other`.
    pub fn delta(&self, other: &Self) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs() + (self.z - other.z).abs()
    }

    /// Length of the acceleration vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            timestamp: Utc::now(),
        }
    }

    /// True when the fix is older than `max_age` relative to `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.timestamp) > max_age
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Last known battery/network state of the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// `None` when the battery capability is missing.
    pub battery_percent: Option<u8>,
    pub online: bool,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        // Without a connectivity capability we assume the network is reachable.
        Self {
            battery_percent: None,
            online: true,
        }
    }
}

/// What the UI and the dispatcher see of the capture session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub active: bool,
    pub media_kind: Option<MediaKind>,
}

impl CaptureStatus {
    pub const fn idle() -> Self {
        Self {
            active: false,
            media_kind: None,
        }
    }

    pub const fn recording(kind: MediaKind) -> Self {
        Self {
            active: true,
            media_kind: Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_sums_absolute_axis_changes() {
        let a = AccelerationSample::new(1.0, -2.0, 9.8);
        let b = AccelerationSample::new(-1.0, 2.0, 9.8);
        assert!((a.delta(&b) - 6.0).abs() < 1e-9);
        assert!(a.delta(&a).abs() < 1e-9);
    }

    #[test]
    fn test_location_staleness() {
        let now = Utc::now();
        let mut loc = Location::new(37.76, -122.41);
        loc.timestamp = now - chrono::Duration::seconds(120);
        assert!(loc.is_stale(now, chrono::Duration::seconds(60)));
        assert!(!loc.is_stale(now, chrono::Duration::seconds(300)));
    }

    #[test]
    fn test_telemetry_serializes_camel_case() {
        let snap = TelemetrySnapshot {
            battery_percent: Some(42),
            online: true,
        };
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["batteryPercent"], 42);
        assert_eq!(json["online"], true);
    }
}
