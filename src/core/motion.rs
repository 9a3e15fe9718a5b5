//! Shake gesture detection over the accelerometer stream.
//!
//! Every sample is compared with the previous accepted one. A jump larger
//! than the jolt threshold counts as a jolt; `quorum` jolts without the
//! window timer running out produce one trigger signal.
//!
//! The threshold can be calibrated from a recording of ordinary movement:
//! twice the standard deviation of the sample magnitudes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::escalation::TriggerSignal;
use super::model::AccelerationSample;
use super::platform::SensorError;
use super::timer::Deadline;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Summed per-axis delta (m/s²) that counts as a jolt
    #[serde(default = "default_jolt_threshold")]
    pub jolt_threshold: f64,
    /// Jolts needed inside one window
    #[serde(default = "default_quorum")]
    pub quorum: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Samples closer together than this are sensor noise
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_jolt_threshold() -> f64 {
    15.0
}

fn default_quorum() -> u32 {
    5
}

fn default_window_ms() -> u64 {
    3000
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            jolt_threshold: default_jolt_threshold(),
            quorum: default_quorum(),
            window_ms: default_window_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl MotionConfig {
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ShakeWindow {
    count: u32,
    window_start: Duration,
}

pub struct MotionAnomalyDetector {
    config: MotionConfig,
    enabled: bool,
    last_sample: Option<AccelerationSample>,
    last_sample_time: Option<Duration>,
    window: ShakeWindow,
    expiry: Deadline,
}

impl MotionAnomalyDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            enabled: true,
            last_sample: None,
            last_sample_time: None,
            window: ShakeWindow::default(),
            expiry: Deadline::new(),
        }
    }

    /// Turns the detector off for good, e.g. when the motion sensor is
    /// missing or permission was refused.
    pub fn disable(&mut self, reason: &SensorError) {
        if self.enabled {
            log::info!("Shake detection disabled: {}", reason);
        }
        self.enabled = false;
        self.last_sample = None;
        self.last_sample_time = None;
        self.window = ShakeWindow::default();
        self.expiry.cancel();
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn shake_count(&self) -> u32 {
        self.window.count
    }

    pub const fn jolt_threshold(&self) -> f64 {
        self.config.jolt_threshold
    }

    /// How close the current window is to a trigger, from 0.0 to 1.0.
    pub fn confidence(&self) -> f64 {
        (f64::from(self.window.count) / f64::from(self.config.quorum.max(1))).min(1.0)
    }

    /// Sets the jolt threshold to twice the standard deviation of the
    /// training magnitudes and returns the threshold now in effect.
    /// Too few finite samples, or a flat recording, keep the old threshold.
    pub fn calibrate(&mut self, training: &[AccelerationSample]) -> f64 {
        let magnitudes: Vec<f64> = training
            .iter()
            .filter(|s| s.is_finite())
            .map(AccelerationSample::magnitude)
            .collect();
        if magnitudes.len() < 2 {
            log::warn!(
                "Calibration needs at least 2 samples, got {}; keeping threshold {:.2}",
                magnitudes.len(),
                self.config.jolt_threshold
            );
            return self.config.jolt_threshold;
        }

        #[allow(clippy::cast_precision_loss)]
        let n = magnitudes.len() as f64;
        let mean = magnitudes.iter().sum::<f64>() / n;
        let variance = magnitudes.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / n;
        let threshold = 2.0 * variance.sqrt();
        if !threshold.is_finite() || threshold <= 0.0 {
            log::warn!(
                "Calibration data has no spread; keeping threshold {:.2}",
                self.config.jolt_threshold
            );
            return self.config.jolt_threshold;
        }

        log::info!(
            "Jolt threshold calibrated from {} samples: {:.2} -> {:.2}",
            magnitudes.len(),
            self.config.jolt_threshold,
            threshold
        );
        self.config.jolt_threshold = threshold;
        threshold
    }

    pub fn on_sample(&mut self, sample: AccelerationSample, now: Duration) -> Option<TriggerSignal> {
        if !self.enabled || !sample.is_finite() {
            return None;
        }

        self.expire(now);

        if let Some(last_time) = self.last_sample_time {
            if now.saturating_sub(last_time) < self.config.debounce() {
                return None;
            }
        }

        let previous = self.last_sample.replace(sample);
        self.last_sample_time = Some(now);
        let previous = previous?;

        let delta = sample.delta(&previous);
        if delta <= self.config.jolt_threshold {
            return None;
        }

        if self.window.count == 0 {
            self.window.window_start = now;
        }
        self.window.count += 1;
        self.expiry.arm(now, self.config.window());
        log::debug!(
            "Jolt {}/{} (delta {:.1})",
            self.window.count,
            self.config.quorum,
            delta
        );

        if self.window.count >= self.config.quorum {
            log::info!(
                "Shake gesture detected ({} jolts in {:?})",
                self.window.count,
                now.saturating_sub(self.window.window_start)
            );
            self.window = ShakeWindow {
                count: 0,
                window_start: now,
            };
            self.expiry.cancel();
            return Some(TriggerSignal::motion());
        }

        None
    }

    /// Lets the window timer fire when no samples are arriving.
    pub fn advance(&mut self, now: Duration) {
        self.expire(now);
    }

    fn expire(&mut self, now: Duration) {
        if self.expiry.fire_if_due(now) {
            log::debug!(
                "Shake window opened at {:?} expired after {} jolts",
                self.window.window_start,
                self.window.count
            );
            self.window = ShakeWindow {
                count: 0,
                window_start: now,
            };
        }
    }
}
