use tokio::sync::watch;

use super::model::TelemetrySnapshot;

/// Process-wide battery/network state, refreshed by platform notifications.
///
/// Cloning gives another handle onto the same state. Readers never block
/// writers: the latest value simply replaces the previous one.
#[derive(Clone)]
pub struct TelemetryMonitor {
    state: watch::Sender<TelemetrySnapshot>,
}

impl Default for TelemetryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryMonitor {
    pub fn new() -> Self {
        let (state, _) = watch::channel(TelemetrySnapshot::default());
        Self { state }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        *self.state.borrow()
    }

    /// Records a battery level in percent. Out-of-range values are clamped,
    /// non-finite ones ignored.
    pub fn on_battery_level(&self, percent: f32) {
        if !percent.is_finite() {
            log::debug!("Ignoring non-finite battery reading");
            return;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let level = percent.clamp(0.0, 100.0).round() as u8;
        self.state.send_if_modified(|snap| {
            let changed = snap.battery_percent != Some(level);
            snap.battery_percent = Some(level);
            changed
        });
    }

    pub fn on_connectivity(&self, online: bool) {
        self.state.send_if_modified(|snap| {
            if snap.online == online {
                return false;
            }
            log::info!("Network is now {}", if online { "online" } else { "offline" });
            snap.online = online;
            true
        });
    }
}
