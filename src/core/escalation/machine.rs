//! Escalation state machine.
//!
//! ```text
//! Idle --open/trigger--> ActionMenu --confirming action--> Confirming(n)
//!                          |      |                          | tick: n -> n-1
//!                          |      +--immediate action--+     | n == 0 or confirm_now
//!                          |                           v     v
//!                          +--cancel--> Cancelled    Dispatching
//!                                          |              | complete_dispatch
//!                                          v              v
//!                                         Idle <------ Resolved
//! ```
//!
//! `cancel` from `Confirming(n)` with `n > 0` also goes through `Cancelled`.
//!
//! The machine never waits on the network. Entering `Dispatching` yields a
//! [`TriggerContext`]; the owner delivers it and reports back through
//! [`AlertEscalationStateMachine::complete_dispatch`] with the cycle number,
//! which is also the de-duplication key: one dispatch per cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::actions::{ActionEffect, ActionKind};
use crate::core::alerts::model::{AlertType, TriggerContext};
use crate::core::capture::{CaptureArtifact, EvidenceCaptureSession};
use crate::core::model::{CaptureStatus, Location};
use crate::core::platform::LocationProvider;
use crate::core::telemetry::TelemetryMonitor;
use crate::core::timer::{Countdown, CountdownEvent};

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EscalationState {
    Idle,
    ActionMenu,
    /// Seconds left before the alert goes out
    Confirming(u32),
    Dispatching,
    Resolved,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Motion,
    Voice,
}

/// Request to open the action menu without user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSignal {
    pub source: TriggerSource,
    /// Alert type suggested by the trigger, used for this cycle
    pub alert_hint: Option<AlertType>,
}

impl TriggerSignal {
    pub const fn motion() -> Self {
        Self {
            source: TriggerSource::Motion,
            alert_hint: None,
        }
    }

    pub const fn voice(alert_hint: Option<AlertType>) -> Self {
        Self {
            source: TriggerSource::Voice,
            alert_hint,
        }
    }
}

/// How the most recent escalation cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum CycleOutcome {
    Resolved { delivered: bool },
    Cancelled,
}

pub struct AlertEscalationStateMachine {
    state: EscalationState,
    countdown: Countdown,
    capture: EvidenceCaptureSession,
    telemetry: TelemetryMonitor,
    location: Arc<dyn LocationProvider>,
    last_location: Option<Location>,
    location_max_age: chrono::Duration,
    /// Current escalation cycle; bumped whenever the menu opens
    cycle: u64,
    dispatched_cycle: Option<u64>,
    /// Cycle whose record action started the running capture
    capture_cycle: Option<u64>,
    cycle_hint: Option<AlertType>,
    last_outcome: Option<CycleOutcome>,
    last_error: Option<String>,
    torn_down: bool,
}

impl AlertEscalationStateMachine {
    pub fn new(
        countdown_seconds: u32,
        capture: EvidenceCaptureSession,
        telemetry: TelemetryMonitor,
        location: Arc<dyn LocationProvider>,
    ) -> Self {
        Self {
            state: EscalationState::Idle,
            countdown: Countdown::new(countdown_seconds, COUNTDOWN_PERIOD),
            capture,
            telemetry,
            location,
            last_location: None,
            location_max_age: chrono::Duration::seconds(60),
            cycle: 0,
            dispatched_cycle: None,
            capture_cycle: None,
            cycle_hint: None,
            last_outcome: None,
            last_error: None,
            torn_down: false,
        }
    }

    pub fn with_location_max_age(mut self, max_age: Duration) -> Self {
        self.location_max_age =
            chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::seconds(60));
        self
    }

    pub const fn state(&self) -> EscalationState {
        self.state
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.capture.status()
    }

    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    pub const fn last_outcome(&self) -> Option<CycleOutcome> {
        self.last_outcome
    }

    /// Latest transient error for the UI (failed capture, failed delivery).
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn take_artifacts(&mut self) -> Vec<CaptureArtifact> {
        self.capture.take_artifacts()
    }

    /// User opened the menu.
    pub fn open_menu(&mut self) {
        if self.torn_down {
            return;
        }
        if self.state != EscalationState::Idle {
            log::debug!("open_menu ignored in {:?}", self.state);
            return;
        }
        self.cycle += 1;
        self.cycle_hint = None;
        self.last_error = None;
        self.transition(EscalationState::ActionMenu);
    }

    /// Trigger from the shake detector or a voice command. Ignored while a
    /// countdown or dispatch is under way.
    pub fn on_trigger(&mut self, signal: TriggerSignal) {
        match self.state {
            EscalationState::Idle => {
                log::info!("Auto-opening action menu ({:?} trigger)", signal.source);
                self.open_menu();
                if self.state == EscalationState::ActionMenu {
                    self.cycle_hint = signal.alert_hint;
                }
            }
            EscalationState::ActionMenu => {
                if signal.alert_hint.is_some() {
                    self.cycle_hint = signal.alert_hint;
                }
            }
            other => log::debug!("{:?} trigger ignored in {:?}", signal.source, other),
        }
    }

    /// Runs the handler of `kind`. Returns the dispatch context when the
    /// action commits to sending an alert.
    pub async fn select_action(&mut self, kind: ActionKind, now: Duration) -> Option<TriggerContext> {
        if self.torn_down || self.state != EscalationState::ActionMenu {
            log::debug!("{:?} ignored in {:?}", kind, self.state);
            return None;
        }

        match kind.handler().effect {
            ActionEffect::Confirm(alert_type) => {
                if self.cycle_hint.is_none() {
                    self.cycle_hint = Some(alert_type);
                }
                self.countdown.start(now);
                self.transition(EscalationState::Confirming(self.countdown.remaining()));
                self.advance(now)
            }
            ActionEffect::Dispatch(alert_type) => self.begin_dispatch(alert_type),
            ActionEffect::Record(media_kind) => {
                match self.capture.start(media_kind).await {
                    Ok(()) => {
                        self.capture_cycle = Some(self.cycle);
                        self.last_error = None;
                    }
                    Err(e) => {
                        self.capture_cycle = None;
                        self.last_error = Some(e.to_string());
                    }
                }
                None
            }
        }
    }

    /// Explicit cancel. Valid in `ActionMenu` and while the countdown has
    /// time left; anything else is a no-op.
    pub fn cancel(&mut self) {
        match self.state {
            EscalationState::Confirming(n) if n > 0 => {
                self.countdown.cancel();
                self.finish_cancelled();
            }
            EscalationState::ActionMenu => self.finish_cancelled(),
            other => log::debug!("cancel ignored in {:?}", other),
        }
    }

    /// "Send now" during the countdown.
    pub fn confirm_now(&mut self) -> Option<TriggerContext> {
        match self.state {
            EscalationState::Confirming(_) => {
                self.countdown.cancel();
                let alert_type = self.cycle_hint.unwrap_or(AlertType::Sos);
                self.begin_dispatch(alert_type)
            }
            other => {
                log::debug!("confirm_now ignored in {:?}", other);
                None
            }
        }
    }

    /// Processes countdown ticks due at `now`, one at a time.
    pub fn advance(&mut self, now: Duration) -> Option<TriggerContext> {
        if !matches!(self.state, EscalationState::Confirming(_)) {
            return None;
        }

        while let Some(event) = self.countdown.poll(now) {
            match event {
                CountdownEvent::Tick(remaining) => {
                    self.transition(EscalationState::Confirming(remaining));
                }
                CountdownEvent::Expired => {
                    self.transition(EscalationState::Confirming(0));
                    let alert_type = self.cycle_hint.unwrap_or(AlertType::Sos);
                    return self.begin_dispatch(alert_type);
                }
            }
        }
        None
    }

    /// Result of delivering the alert of `cycle`. Stale or unexpected
    /// reports are ignored.
    pub fn complete_dispatch(&mut self, cycle: u64, delivery_error: Option<String>) {
        if self.state != EscalationState::Dispatching || cycle != self.cycle {
            log::debug!(
                "Ignoring dispatch result for cycle {} (current {}, {:?})",
                cycle,
                self.cycle,
                self.state
            );
            return;
        }

        let delivered = delivery_error.is_none();
        self.last_error = delivery_error;
        self.transition(EscalationState::Resolved);
        self.last_outcome = Some(CycleOutcome::Resolved { delivered });
        self.countdown.reset();
        self.transition(EscalationState::Idle);
    }

    pub fn stop_recording(&mut self) {
        self.capture.stop();
        self.capture_cycle = None;
    }

    /// Pulls buffered chunks out of the capture device.
    pub fn collect_evidence(&mut self) {
        self.capture.collect();
    }

    /// Stops every timer and releases the capture device, whatever the
    /// current state. Safe to call more than once.
    pub fn teardown(&mut self) {
        self.countdown.cancel();
        self.capture.stop();
        self.capture_cycle = None;
        if !self.torn_down {
            log::info!("Escalation engine torn down in {:?}", self.state);
        }
        self.torn_down = true;
        self.state = EscalationState::Idle;
    }

    fn finish_cancelled(&mut self) {
        // Evidence for an earlier, already dispatched cycle keeps recording.
        if self.capture_cycle == Some(self.cycle) {
            self.stop_recording();
        }
        self.transition(EscalationState::Cancelled);
        self.last_outcome = Some(CycleOutcome::Cancelled);
        self.countdown.reset();
        self.transition(EscalationState::Idle);
    }

    fn begin_dispatch(&mut self, fallback_type: AlertType) -> Option<TriggerContext> {
        if self.dispatched_cycle == Some(self.cycle) {
            log::warn!("Alert for cycle {} already dispatched", self.cycle);
            return None;
        }
        self.dispatched_cycle = Some(self.cycle);
        self.transition(EscalationState::Dispatching);

        Some(TriggerContext {
            cycle: self.cycle,
            alert_type: self.cycle_hint.unwrap_or(fallback_type),
            location: self.resolve_location(),
            telemetry: self.telemetry.snapshot(),
            capture: self.capture.status(),
        })
    }

    fn resolve_location(&mut self) -> Option<Location> {
        match self.location.current_location() {
            Some(fix) => {
                if fix.is_stale(Utc::now(), self.location_max_age) {
                    log::warn!("Location fix from {} is stale, sending anyway", fix.timestamp);
                }
                self.last_location = Some(fix.clone());
                Some(fix)
            }
            None => {
                log::warn!("No location fix, falling back to last known location");
                self.last_location.clone()
            }
        }
    }

    fn transition(&mut self, next: EscalationState) {
        if self.state != next {
            log::info!("Escalation: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
