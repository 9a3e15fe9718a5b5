// Alert dispatcher - builds the alert and fans it out.
//
// Building is synchronous: the alert exists, the device feedback has been
// kicked off and the UI callback has fired before any network I/O starts.
// Responder delivery is a separate future so a slow or failing endpoint
// never hides the alert from the user.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::feedback::{Chime, NoFeedback, Vibrator};
use super::model::{notification_order, Alert, AlertStatus, EmergencyContact, TriggerContext};
use super::responder::{DispatchError, Responder};

/// Receives every alert the moment it is created.
pub type AlertCallback = Box<dyn Fn(&Alert) + Send + Sync>;

/// Static data copied onto every alert, plus feedback preferences.
#[derive(Debug, Clone, Default)]
pub struct DispatchProfile {
    pub contacts: Vec<EmergencyContact>,
    pub safe_spaces: Vec<String>,
    pub vibration_pattern: Vec<Duration>,
    pub chime: bool,
}

/// Outcome of one dispatch: the alert that was shown locally and whether
/// the responder accepted it.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub alert: Alert,
    pub delivery: Result<(), DispatchError>,
}

impl DispatchReport {
    pub const fn delivered(&self) -> bool {
        self.delivery.is_ok()
    }
}

pub struct AlertDispatcher {
    responder: Arc<dyn Responder>,
    vibrator: Arc<dyn Vibrator>,
    chime: Arc<dyn Chime>,
    on_alert: AlertCallback,
    profile: DispatchProfile,
}

impl AlertDispatcher {
    pub fn new(responder: Arc<dyn Responder>, on_alert: AlertCallback) -> Self {
        Self {
            responder,
            vibrator: Arc::new(NoFeedback),
            chime: Arc::new(NoFeedback),
            on_alert,
            profile: DispatchProfile::default(),
        }
    }

    pub fn with_feedback(mut self, vibrator: Arc<dyn Vibrator>, chime: Arc<dyn Chime>) -> Self {
        self.vibrator = vibrator;
        self.chime = chime;
        self
    }

    pub fn with_profile(mut self, profile: DispatchProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Creates the alert from the context, fires feedback and the UI
    /// callback. Never waits on anything.
    pub fn prepare(&self, ctx: &TriggerContext) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            location: ctx.location.clone(),
            alert_type: ctx.alert_type,
            message: ctx.alert_type.message(),
            timestamp: Utc::now(),
            status: AlertStatus::Active,
            is_recording: ctx.capture.active,
            media_type: ctx.capture.media_kind,
            telemetry: ctx.telemetry,
            notified_contacts: notification_order(&self.profile.contacts),
            nearest_safe_spaces: self.profile.safe_spaces.clone(),
        };

        log::info!(
            "Dispatching {} alert {} (recording: {})",
            alert.alert_type.display_name(),
            alert.id,
            alert.is_recording
        );

        self.fire_feedback();
        (self.on_alert)(&alert);
        alert
    }

    /// Submits `alert` to the responder. The returned future owns
    /// everything it needs, so the caller may keep it in flight while it
    /// handles other events.
    pub fn deliver(&self, alert: Alert) -> impl Future<Output = DispatchReport> + Send + 'static {
        let responder = Arc::clone(&self.responder);
        async move {
            let delivery = responder.submit(&alert).await;
            match &delivery {
                Ok(()) => log::info!("Alert {} delivered to responder", alert.id),
                Err(e) => log::warn!("Alert {} not delivered: {}", alert.id, e),
            }
            DispatchReport { alert, delivery }
        }
    }

    fn fire_feedback(&self) {
        if !self.profile.vibration_pattern.is_empty() {
            if let Err(e) = self.vibrator.vibrate(&self.profile.vibration_pattern) {
                log::debug!("Vibration skipped: {}", e);
            }
        }
        if self.profile.chime {
            if let Err(e) = self.chime.play() {
                log::debug!("Chime skipped: {}", e);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::testing::ScriptedResponder;
    use super::*;
    use crate::core::alerts::feedback::FeedbackError;
    use crate::core::alerts::model::AlertType;
    use crate::core::model::{CaptureStatus, Location, MediaKind, TelemetrySnapshot};

    #[derive(Default)]
    struct RecordingVibrator {
        patterns: Mutex<Vec<Vec<Duration>>>,
    }

    impl Vibrator for RecordingVibrator {
        fn vibrate(&self, pattern: &[Duration]) -> Result<(), FeedbackError> {
            self.patterns.lock().unwrap().push(pattern.to_vec());
            Ok(())
        }
    }

    fn collecting_callback() -> (AlertCallback, Arc<Mutex<Vec<Alert>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: AlertCallback = Box::new(move |alert: &Alert| sink.lock().unwrap().push(alert.clone()));
        (callback, seen)
    }

    fn context(capture: CaptureStatus) -> TriggerContext {
        TriggerContext {
            cycle: 1,
            alert_type: AlertType::Sos,
            location: Some(Location::new(37.76, -122.41)),
            telemetry: TelemetrySnapshot {
                battery_percent: Some(42),
                online: true,
            },
            capture,
        }
    }

    #[tokio::test]
    async fn test_callback_fires_even_when_responder_fails() {
        let responder = Arc::new(ScriptedResponder::failing(DispatchError::Rejected { status: 500 }));
        let (callback, seen) = collecting_callback();
        let dispatcher = AlertDispatcher::new(responder.clone(), callback);

        let alert = dispatcher.prepare(&context(CaptureStatus::idle()));
        let report = dispatcher.deliver(alert).await;

        assert!(!report.delivered());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let alert = &seen[0];
        assert!(!alert.is_recording);
        assert_eq!(alert.media_type, None);
        assert_eq!(
            alert.telemetry,
            TelemetrySnapshot {
                battery_percent: Some(42),
                online: true
            }
        );
        let location = alert.location.as_ref().unwrap();
        assert!((location.lat - 37.76).abs() < 1e-9);
        assert!((location.lng + 122.41).abs() < 1e-9);
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(report.alert.id, alert.id);
        assert_eq!(responder.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_in_progress_capture_is_tagged() {
        let responder = Arc::new(ScriptedResponder::accepting());
        let (callback, seen) = collecting_callback();
        let dispatcher = AlertDispatcher::new(responder, callback);

        let alert = dispatcher.prepare(&context(CaptureStatus::recording(MediaKind::Video)));
        let report = dispatcher.deliver(alert).await;

        assert!(report.delivered());
        assert!(report.alert.is_recording);
        assert_eq!(report.alert.media_type, Some(MediaKind::Video));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_prepare_fires_feedback_and_copies_profile() {
        let vibrator = Arc::new(RecordingVibrator::default());
        let (callback, seen) = collecting_callback();
        let profile = DispatchProfile {
            contacts: vec![EmergencyContact {
                id: 1,
                name: "Alex".to_string(),
                phone: "555-0100".to_string(),
                email: None,
                relationship: Some("sibling".to_string()),
                priority: 1,
            }],
            safe_spaces: vec!["24h pharmacy".to_string()],
            vibration_pattern: vec![Duration::from_millis(200)],
            chime: true,
        };
        let dispatcher = AlertDispatcher::new(Arc::new(ScriptedResponder::accepting()), callback)
            .with_feedback(vibrator.clone(), Arc::new(NoFeedback))
            .with_profile(profile);

        let alert = dispatcher.prepare(&context(CaptureStatus::idle()));

        assert_eq!(alert.notified_contacts, vec!["Alex"]);
        assert_eq!(alert.nearest_safe_spaces, vec!["24h pharmacy"]);
        assert_eq!(vibrator.patterns.lock().unwrap().len(), 1);
        // The chime is unsupported here; dispatch still went through.
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let (callback, _) = collecting_callback();
        let dispatcher = AlertDispatcher::new(Arc::new(ScriptedResponder::accepting()), callback);
        let a = dispatcher.prepare(&context(CaptureStatus::idle()));
        let b = dispatcher.prepare(&context(CaptureStatus::idle()));
        assert_ne!(a.id, b.id);
    }
}
