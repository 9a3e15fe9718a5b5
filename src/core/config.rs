use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::alerts::dispatcher::DispatchProfile;
use super::alerts::model::EmergencyContact;
use super::motion::MotionConfig;

/// Engine settings. Every field has a default so partial files load.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Alerts are posted to `<responder_url>/alert`
    pub responder_url: String,
    pub countdown_seconds: u32,
    pub motion: MotionConfig,
    pub capture: CaptureSettings,
    pub feedback: FeedbackSettings,
    /// Older fixes are still sent, with a warning
    pub location_max_age_secs: u64,
    /// How long shutdown waits for an alert still being delivered
    pub shutdown_grace_ms: u64,
    /// A delivery still pending after this long counts as failed
    pub delivery_timeout_ms: u64,
    pub tick_ms: u64,
    pub contacts: Vec<EmergencyContact>,
    pub safe_spaces: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            responder_url: "http://127.0.0.1:8000/api/emergency".to_string(),
            countdown_seconds: 5,
            motion: MotionConfig::default(),
            capture: CaptureSettings::default(),
            feedback: FeedbackSettings::default(),
            location_max_age_secs: 60,
            shutdown_grace_ms: 2000,
            delivery_timeout_ms: 15_000,
            tick_ms: 100,
            contacts: Vec::new(),
            safe_spaces: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureSettings {
    /// Interval at which device chunks are pulled into the session
    pub chunk_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self { chunk_ms: 1000 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FeedbackSettings {
    pub vibration_pattern_ms: Vec<u64>,
    pub chime: bool,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            vibration_pattern_ms: vec![200, 100, 200],
            chime: true,
        }
    }
}

impl Settings {
    pub const fn tick(&self) -> Duration {
        // A zero tick would spin the event loop.
        Duration::from_millis(if self.tick_ms == 0 { 1 } else { self.tick_ms })
    }

    pub const fn chunk_interval(&self) -> Duration {
        Duration::from_millis(if self.capture.chunk_ms == 0 { 1 } else { self.capture.chunk_ms })
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub const fn location_max_age(&self) -> Duration {
        Duration::from_secs(self.location_max_age_secs)
    }

    pub fn dispatch_profile(&self) -> DispatchProfile {
        DispatchProfile {
            contacts: self.contacts.clone(),
            safe_spaces: self.safe_spaces.clone(),
            vibration_pattern: self
                .feedback
                .vibration_pattern_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            chime: self.feedback.chime,
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!(
                        "Ignoring malformed {}: {}",
                        self.config_path.display(),
                        e
                    ),
                },
                Err(e) => log::warn!("Could not read {}: {}", self.config_path.display(), e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
