use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::core::{
    alerts::{
        dispatcher::{AlertCallback, AlertDispatcher, DispatchReport},
        feedback::{Chime, NoFeedback, Vibrator},
        model::{Alert, TriggerContext},
        responder::{DispatchError, HttpResponder, Responder},
    },
    capture::{ArtifactCallback, CaptureArtifact, CaptureDevice, EvidenceCaptureSession, NoCaptureDevice},
    config::{ConfigManager, Settings},
    escalation::{ActionKind, AlertEscalationStateMachine, CycleOutcome, EscalationState},
    model::{AccelerationSample, CaptureStatus, Location, TelemetrySnapshot},
    motion::MotionAnomalyDetector,
    platform::{ChannelPlatform, DevicePlatform, LocationProvider, SharedLocation},
    telemetry::TelemetryMonitor,
    voice::VoiceCommandClassifier,
};

const COMMAND_CAPACITY: usize = 32;

type Delivery = Pin<Box<dyn Future<Output = (u64, DispatchReport)> + Send>>;

/// Requests from the UI to the event loop.
pub enum UiCommand {
    OpenMenu,
    SelectAction(ActionKind),
    Cancel,
    ConfirmNow,
    StopRecording,
    /// Recalibrates the jolt threshold from a recording of normal movement
    CalibrateMotion(Vec<AccelerationSample>),
    Shutdown(oneshot::Sender<Vec<CaptureArtifact>>),
}

/// Everything the UI renders, republished after every event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineView {
    pub state: EscalationState,
    pub capture: CaptureStatus,
    pub telemetry: TelemetrySnapshot,
    /// Progress of the current shake window, 0.0 to 1.0
    pub shake_confidence: f64,
    pub last_outcome: Option<CycleOutcome>,
    pub last_error: Option<String>,
}

impl Default for EngineView {
    fn default() -> Self {
        Self {
            state: EscalationState::Idle,
            capture: CaptureStatus::idle(),
            telemetry: TelemetrySnapshot::default(),
            shake_confidence: 0.0,
            last_outcome: None,
            last_error: None,
        }
    }
}

/// Host collaborators injected into the engine.
pub struct EngineServices {
    pub platform: Arc<dyn DevicePlatform>,
    pub location: Arc<dyn LocationProvider>,
    pub capture: Arc<dyn CaptureDevice>,
    pub responder: Arc<dyn Responder>,
    pub vibrator: Arc<dyn Vibrator>,
    pub chime: Arc<dyn Chime>,
    pub on_alert: AlertCallback,
    /// Without a sink, finished artifacts wait for `EngineHandle::shutdown`
    pub on_artifact: Option<ArtifactCallback>,
}

impl EngineServices {
    /// No location, capture or feedback capability.
    pub fn new(platform: Arc<dyn DevicePlatform>, responder: Arc<dyn Responder>, on_alert: AlertCallback) -> Self {
        Self {
            platform,
            location: Arc::new(SharedLocation::default()),
            capture: Arc::new(NoCaptureDevice),
            responder,
            vibrator: Arc::new(NoFeedback),
            chime: Arc::new(NoFeedback),
            on_alert,
            on_artifact: None,
        }
    }

    pub fn with_location(mut self, location: Arc<dyn LocationProvider>) -> Self {
        self.location = location;
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn CaptureDevice>) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_feedback(mut self, vibrator: Arc<dyn Vibrator>, chime: Arc<dyn Chime>) -> Self {
        self.vibrator = vibrator;
        self.chime = chime;
        self
    }

    pub fn with_artifact_sink(mut self, on_artifact: ArtifactCallback) -> Self {
        self.on_artifact = Some(on_artifact);
        self
    }
}

/// Cloneable UI side of a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<UiCommand>,
    view: watch::Receiver<EngineView>,
}

impl EngineHandle {
    pub async fn open_menu(&self) {
        self.send(UiCommand::OpenMenu).await;
    }

    pub async fn select_action(&self, kind: ActionKind) {
        self.send(UiCommand::SelectAction(kind)).await;
    }

    pub async fn cancel(&self) {
        self.send(UiCommand::Cancel).await;
    }

    pub async fn confirm_now(&self) {
        self.send(UiCommand::ConfirmNow).await;
    }

    pub async fn stop_recording(&self) {
        self.send(UiCommand::StopRecording).await;
    }

    pub async fn calibrate_motion(&self, training: Vec<AccelerationSample>) {
        self.send(UiCommand::CalibrateMotion(training)).await;
    }

    pub fn view(&self) -> watch::Receiver<EngineView> {
        self.view.clone()
    }

    /// Tears the engine down and returns the evidence not yet handed to an
    /// artifact sink. Returns nothing if the engine already stopped.
    pub async fn shutdown(&self) -> Vec<CaptureArtifact> {
        let (reply, artifacts) = oneshot::channel();
        if self.commands.send(UiCommand::Shutdown(reply)).await.is_err() {
            return Vec::new();
        }
        artifacts.await.unwrap_or_default()
    }

    async fn send(&self, command: UiCommand) {
        if self.commands.send(command).await.is_err() {
            log::debug!("Engine stopped, command dropped");
        }
    }
}

/// The single event loop: owns the state machine and every subscription.
pub struct EngineRuntime {
    machine: AlertEscalationStateMachine,
    detector: MotionAnomalyDetector,
    telemetry: TelemetryMonitor,
    classifier: VoiceCommandClassifier,
    dispatcher: AlertDispatcher,
    on_artifact: Option<ArtifactCallback>,
    motion: Option<mpsc::Receiver<AccelerationSample>>,
    battery: Option<mpsc::Receiver<f32>>,
    connectivity: Option<mpsc::Receiver<bool>>,
    speech: Option<mpsc::Receiver<String>>,
    commands: mpsc::Receiver<UiCommand>,
    view: watch::Sender<EngineView>,
    started: Instant,
    tick: Duration,
    chunk_interval: Duration,
    delivery_timeout: Duration,
    shutdown_grace: Duration,
}

impl EngineRuntime {
    /// Subscribes to the platform capabilities. Missing ones narrow the
    /// feature set; none of them is fatal.
    pub fn new(settings: &Settings, services: EngineServices) -> (Self, EngineHandle) {
        let EngineServices {
            platform,
            location,
            capture,
            responder,
            vibrator,
            chime,
            on_alert,
            on_artifact,
        } = services;

        let telemetry = TelemetryMonitor::new();
        let mut detector = MotionAnomalyDetector::new(settings.motion.clone());
        let motion = match platform.motion() {
            Ok(rx) => Some(rx),
            Err(e) => {
                detector.disable(&e);
                None
            }
        };
        let battery = platform
            .battery()
            .map_err(|e| log::info!("Battery telemetry disabled: {}", e))
            .ok();
        let connectivity = platform
            .connectivity()
            .map_err(|e| log::info!("Connectivity telemetry disabled: {}", e))
            .ok();
        let speech = platform
            .speech()
            .map_err(|e| log::info!("Voice trigger disabled: {}", e))
            .ok();

        let machine = AlertEscalationStateMachine::new(
            settings.countdown_seconds,
            EvidenceCaptureSession::new(capture),
            telemetry.clone(),
            location,
        )
        .with_location_max_age(settings.location_max_age());

        let dispatcher = AlertDispatcher::new(responder, on_alert)
            .with_feedback(vibrator, chime)
            .with_profile(settings.dispatch_profile());

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (view_tx, view_rx) = watch::channel(EngineView {
            telemetry: telemetry.snapshot(),
            ..EngineView::default()
        });

        let runtime = Self {
            machine,
            detector,
            telemetry,
            classifier: VoiceCommandClassifier::new(),
            dispatcher,
            on_artifact,
            motion,
            battery,
            connectivity,
            speech,
            commands: command_rx,
            view: view_tx,
            started: Instant::now(),
            tick: settings.tick(),
            chunk_interval: settings.chunk_interval(),
            delivery_timeout: settings.delivery_timeout(),
            shutdown_grace: settings.shutdown_grace(),
        };
        let handle = EngineHandle {
            commands: command_tx,
            view: view_rx,
        };
        (runtime, handle)
    }

    /// Starts the engine on the current tokio runtime.
    pub fn spawn(settings: &Settings, services: EngineServices) -> EngineHandle {
        let (runtime, handle) = Self::new(settings, services);
        tokio::spawn(runtime.run());
        handle
    }

    /// Runs until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut chunk_timer = tokio::time::interval(self.chunk_interval);
        chunk_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut delivery: Option<Delivery> = None;

        let reply = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(UiCommand::Shutdown(reply)) => break Some(reply),
                    Some(command) => {
                        if let Some(ctx) = self.handle_command(command).await {
                            self.launch(ctx, &mut delivery);
                        }
                    }
                    None => break None,
                },
                sample = next_from(&mut self.motion), if self.motion.is_some() => match sample {
                    Some(sample) => {
                        let now = self.now();
                        if let Some(signal) = self.detector.on_sample(sample, now) {
                            self.machine.on_trigger(signal);
                        }
                    }
                    None => {
                        log::info!("Motion feed closed");
                        self.motion = None;
                    }
                },
                level = next_from(&mut self.battery), if self.battery.is_some() => match level {
                    Some(level) => self.telemetry.on_battery_level(level),
                    None => self.battery = None,
                },
                online = next_from(&mut self.connectivity), if self.connectivity.is_some() => match online {
                    Some(online) => self.telemetry.on_connectivity(online),
                    None => self.connectivity = None,
                },
                transcript = next_from(&mut self.speech), if self.speech.is_some() => match transcript {
                    Some(transcript) => self.on_transcript(&transcript),
                    None => self.speech = None,
                },
                (cycle, report) = in_flight(&mut delivery), if delivery.is_some() => {
                    delivery = None;
                    self.machine
                        .complete_dispatch(cycle, report.delivery.err().map(|e| e.to_string()));
                },
                _ = ticker.tick() => {
                    let now = self.now();
                    self.detector.advance(now);
                    if let Some(ctx) = self.machine.advance(now) {
                        self.launch(ctx, &mut delivery);
                    }
                },
                _ = chunk_timer.tick() => self.machine.collect_evidence(),
            }
            self.hand_off_artifacts();
            self.publish();
        };

        let artifacts = self.teardown(delivery).await;
        if let Some(reply) = reply {
            let _ = reply.send(artifacts);
        }
    }

    async fn handle_command(&mut self, command: UiCommand) -> Option<TriggerContext> {
        let now = self.now();
        match command {
            UiCommand::OpenMenu => {
                self.machine.open_menu();
                None
            }
            UiCommand::SelectAction(kind) => self.machine.select_action(kind, now).await,
            UiCommand::Cancel => {
                self.machine.cancel();
                None
            }
            UiCommand::ConfirmNow => self.machine.confirm_now(),
            UiCommand::StopRecording => {
                self.machine.stop_recording();
                None
            }
            UiCommand::CalibrateMotion(training) => {
                self.detector.calibrate(&training);
                None
            }
            UiCommand::Shutdown(_) => None,
        }
    }

    fn on_transcript(&mut self, transcript: &str) {
        let command = self.classifier.classify(transcript);
        match command.trigger() {
            Some(signal) => self.machine.on_trigger(signal),
            None => log::debug!("{:?} voice command not handled: {}", command.kind, command.transcript),
        }
    }

    /// Builds the alert now (UI callback fires) and keeps its delivery in
    /// flight. A delivery that outlives `delivery_timeout` fails as a
    /// transport error.
    fn launch(&self, ctx: TriggerContext, delivery: &mut Option<Delivery>) {
        let alert = self.dispatcher.prepare(&ctx);
        let fallback = alert.clone();
        let submit = self.dispatcher.deliver(alert);
        let cycle = ctx.cycle;
        let limit = self.delivery_timeout;
        if delivery.is_some() {
            log::warn!("Replacing an unfinished delivery");
        }
        *delivery = Some(Box::pin(async move {
            let report = match tokio::time::timeout(limit, submit).await {
                Ok(report) => report,
                Err(_) => {
                    log::warn!("Alert {} not delivered within {:?}", fallback.id, limit);
                    DispatchReport {
                        alert: fallback,
                        delivery: Err(DispatchError::Transport("timed out".to_string())),
                    }
                }
            };
            (cycle, report)
        }));
    }

    fn hand_off_artifacts(&mut self) {
        let Some(sink) = &self.on_artifact else {
            return;
        };
        for artifact in self.machine.take_artifacts() {
            sink(artifact);
        }
    }

    async fn teardown(mut self, delivery: Option<Delivery>) -> Vec<CaptureArtifact> {
        self.machine.teardown();
        self.motion = None;
        self.battery = None;
        self.connectivity = None;
        self.speech = None;
        self.publish();

        if let Some(delivery) = delivery {
            match tokio::time::timeout(self.shutdown_grace, delivery).await {
                Ok((_, report)) => log::info!(
                    "Pending alert {} settled during shutdown (delivered: {})",
                    report.alert.id,
                    report.delivered()
                ),
                Err(_) => log::warn!("Abandoning alert delivery after {:?}", self.shutdown_grace),
            }
        }
        self.hand_off_artifacts();
        self.machine.take_artifacts()
    }

    fn publish(&self) {
        let next = EngineView {
            state: self.machine.state(),
            capture: self.machine.capture_status(),
            telemetry: self.telemetry.snapshot(),
            shake_confidence: self.detector.confidence(),
            last_outcome: self.machine.last_outcome(),
            last_error: self.machine.last_error().map(str::to_string),
        };
        self.view.send_if_modified(|view| {
            if *view == next {
                return false;
            }
            *view = next;
            true
        });
    }

    fn now(&self) -> Duration {
        self.started.elapsed()
    }
}

async fn next_from<T>(feed: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn in_flight(delivery: &mut Option<Delivery>) -> (u64, DispatchReport) {
    match delivery {
        Some(delivery) => delivery.await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("could not start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Responder(#[from] DispatchError),
}

/// Headless simulator: loads the settings, plays a scripted shake through
/// an in-memory platform and sends the resulting alert to the configured
/// responder.
pub fn run() -> Result<(), RunError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_dir = std::env::var_os("SAFEWALK_CONFIG_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from);
    let config_manager = ConfigManager::new(config_dir);
    let settings = config_manager.load();
    if let Err(e) = config_manager.save(&settings) {
        log::warn!("Could not write settings: {}", e);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(simulate(settings))
}

async fn simulate(settings: Settings) -> Result<(), RunError> {
    let platform = Arc::new(ChannelPlatform::new());
    let motion = platform.open_motion();
    let battery = platform.open_battery();
    let connectivity = platform.open_connectivity();

    let responder = Arc::new(HttpResponder::new(settings.responder_url.clone())?);
    log::info!("Responder endpoint: {}", responder.endpoint());

    let on_alert: AlertCallback = Box::new(|alert: &Alert| match serde_json::to_string_pretty(alert) {
        Ok(json) => println!("{json}"),
        Err(e) => log::warn!("Could not render alert {}: {}", alert.id, e),
    });

    let services = EngineServices::new(platform, responder, on_alert)
        .with_location(Arc::new(SharedLocation::new(Some(Location::new(37.7749, -122.4194)))));
    #[cfg(feature = "audio")]
    let services = services.with_feedback(
        Arc::new(NoFeedback),
        Arc::new(crate::core::alerts::feedback::RodioChime::default()),
    );

    let handle = EngineRuntime::spawn(&settings, services);
    let mut view = handle.view();

    let _ = battery.send(76.0).await;
    let _ = connectivity.send(true).await;

    // Alternating readings: every one after the first is a jolt.
    let still = AccelerationSample::new(0.0, 0.0, 9.8);
    let jolted = AccelerationSample::new(12.0, 8.0, 9.8);
    for i in 0..=settings.motion.quorum {
        let sample = if i % 2 == 0 { still } else { jolted };
        let _ = motion.send(sample).await;
        tokio::time::sleep(Duration::from_millis(settings.motion.debounce_ms + 100)).await;
    }

    let deadline = Duration::from_secs(u64::from(settings.countdown_seconds) + 15);
    let opened = tokio::time::timeout(deadline, view.wait_for(|v| v.state == EscalationState::ActionMenu))
        .await
        .is_ok_and(|found| found.is_ok());
    if !opened {
        log::warn!("Shake did not open the action menu");
        handle.shutdown().await;
        return Ok(());
    }

    handle.select_action(ActionKind::EmergencyCall).await;
    // Only a finished dispatch brings the menu back to idle here.
    let settled = tokio::time::timeout(deadline, async {
        view.wait_for(|v| v.state == EscalationState::Idle)
            .await
            .map(|v| v.clone())
    })
    .await;

    match settled {
        Ok(Ok(final_view)) => match final_view.last_error {
            Some(e) => log::warn!("Alert shown locally but not delivered: {}", e),
            None => log::info!("Alert delivered"),
        },
        _ => log::warn!("Escalation did not settle in time"),
    }

    handle.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::alerts::dispatcher::testing::ScriptedResponder;
    use crate::core::alerts::model::AlertType;
    use crate::core::capture::testing::FakeCaptureDevice;
    use crate::core::model::MediaKind;
    use crate::core::platform::SensorError;

    fn collecting_callback() -> (AlertCallback, Arc<Mutex<Vec<Alert>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: AlertCallback = Box::new(move |alert: &Alert| sink.lock().unwrap().push(alert.clone()));
        (callback, seen)
    }

    async fn wait_for_state(handle: &EngineHandle, state: EscalationState) -> EngineView {
        let mut view = handle.view();
        let found = tokio::time::timeout(Duration::from_secs(60), view.wait_for(|v| v.state == state))
            .await
            .expect("timed out waiting for state")
            .expect("engine stopped");
        found.clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_shake_then_countdown_dispatches() {
        let platform = Arc::new(ChannelPlatform::new());
        let motion = platform.open_motion();
        let responder = Arc::new(ScriptedResponder::accepting());
        let (callback, seen) = collecting_callback();
        let handle = EngineRuntime::spawn(
            &Settings::default(),
            EngineServices::new(platform, responder.clone(), callback),
        );

        for i in 0..6 {
            let sample = if i % 2 == 0 {
                AccelerationSample::new(0.0, 0.0, 9.8)
            } else {
                AccelerationSample::new(12.0, 8.0, 9.8)
            };
            motion.send(sample).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        wait_for_state(&handle, EscalationState::ActionMenu).await;

        handle.select_action(ActionKind::EmergencyCall).await;
        wait_for_state(&handle, EscalationState::Confirming(5)).await;
        wait_for_state(&handle, EscalationState::Confirming(1)).await;
        let view = wait_for_state(&handle, EscalationState::Idle).await;

        assert!(view.last_error.is_none());
        assert_eq!(view.last_outcome, Some(CycleOutcome::Resolved { delivered: true }));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(responder.submitted().len(), 1);
        assert_eq!(responder.submitted()[0].alert_type, AlertType::Sos);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_countdown_sends_nothing() {
        let responder = Arc::new(ScriptedResponder::accepting());
        let (callback, seen) = collecting_callback();
        let handle = EngineRuntime::spawn(
            &Settings::default(),
            EngineServices::new(Arc::new(ChannelPlatform::new()), responder.clone(), callback),
        );

        handle.open_menu().await;
        handle.select_action(ActionKind::EmergencyCall).await;
        wait_for_state(&handle, EscalationState::Confirming(3)).await;
        handle.cancel().await;
        let view = wait_for_state(&handle, EscalationState::Idle).await;
        assert_eq!(view.last_outcome, Some(CycleOutcome::Cancelled));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(seen.lock().unwrap().is_empty());
        assert!(responder.submitted().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_reaches_view() {
        let platform = Arc::new(ChannelPlatform::new());
        let battery = platform.open_battery();
        let connectivity = platform.open_connectivity();
        let (callback, _) = collecting_callback();
        let handle = EngineRuntime::spawn(
            &Settings::default(),
            EngineServices::new(platform, Arc::new(ScriptedResponder::accepting()), callback),
        );

        battery.send(42.4).await.unwrap();
        connectivity.send(false).await.unwrap();

        let mut view = handle.view();
        let found = tokio::time::timeout(
            Duration::from_secs(5),
            view.wait_for(|v| v.telemetry.battery_percent == Some(42) && !v.telemetry.online),
        )
        .await
        .is_ok_and(|found| found.is_ok());
        assert!(found);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_emergency_opens_menu_with_hint() {
        let platform = Arc::new(ChannelPlatform::new());
        let speech = platform.open_speech();
        let responder = Arc::new(ScriptedResponder::accepting());
        let (callback, _) = collecting_callback();
        let handle = EngineRuntime::spawn(
            &Settings::default(),
            EngineServices::new(platform, responder.clone(), callback),
        );

        speech.send("where is the route home".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.view().borrow().state, EscalationState::Idle);

        speech.send("Help, there's a fire".to_string()).await.unwrap();
        wait_for_state(&handle, EscalationState::ActionMenu).await;
        handle.select_action(ActionKind::AlertContacts).await;
        wait_for_state(&handle, EscalationState::Idle).await;

        assert_eq!(responder.submitted()[0].alert_type, AlertType::Fire);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_capabilities_still_dispatch() {
        let platform = Arc::new(ChannelPlatform::new());
        platform.deny_motion();
        assert_eq!(platform.motion().err(), Some(SensorError::PermissionDenied));

        let responder = Arc::new(ScriptedResponder::accepting());
        let (callback, seen) = collecting_callback();
        let handle = EngineRuntime::spawn(
            &Settings::default(),
            EngineServices::new(platform, responder, callback),
        );

        handle.open_menu().await;
        handle.select_action(ActionKind::RecordAudio).await;
        let view = wait_for_state(&handle, EscalationState::ActionMenu).await;
        assert!(!view.capture.active);

        handle.select_action(ActionKind::AlertContacts).await;
        wait_for_state(&handle, EscalationState::Idle).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].location.is_none());
        assert_eq!(seen[0].telemetry.battery_percent, None);
        assert!(seen[0].telemetry.online);
        drop(seen);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_recording_yields_artifact() {
        let device = FakeCaptureDevice::new();
        let (callback, _) = collecting_callback();
        let handle = EngineRuntime::spawn(
            &Settings::default(),
            EngineServices::new(
                Arc::new(ChannelPlatform::new()),
                Arc::new(ScriptedResponder::accepting()),
                callback,
            )
            .with_capture(Arc::new(device.clone())),
        );

        handle.open_menu().await;
        handle.select_action(ActionKind::RecordVideo).await;
        let mut view = handle.view();
        view.wait_for(|v| v.capture.active).await.unwrap();

        device.push_chunk(b"frame-1");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        device.push_chunk(b"frame-2");
        handle.stop_recording().await;
        view.wait_for(|v| !v.capture.active).await.unwrap();
        assert_eq!(view.borrow().state, EscalationState::ActionMenu);

        let artifacts = handle.shutdown().await;
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].media_kind, MediaKind::Video);
        assert_eq!(artifacts[0].data, b"frame-1frame-2".to_vec());
        assert_eq!(device.released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_artifact_sink_receives_recording_on_stop() {
        let device = FakeCaptureDevice::new();
        let (callback, _) = collecting_callback();
        let stored = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stored);
        let handle = EngineRuntime::spawn(
            &Settings::default(),
            EngineServices::new(
                Arc::new(ChannelPlatform::new()),
                Arc::new(ScriptedResponder::accepting()),
                callback,
            )
            .with_capture(Arc::new(device.clone()))
            .with_artifact_sink(Box::new(move |artifact: CaptureArtifact| sink.lock().unwrap().push(artifact))),
        );

        for kind in [ActionKind::RecordAudio, ActionKind::RecordVideo] {
            handle.open_menu().await;
            handle.select_action(kind).await;
            let mut view = handle.view();
            view.wait_for(|v| v.capture.active).await.unwrap();
            device.push_chunk(b"clip");
            handle.stop_recording().await;
            view.wait_for(|v| !v.capture.active).await.unwrap();
            handle.cancel().await;
        }

        let stored_kinds: Vec<MediaKind> = stored.lock().unwrap().iter().map(|a| a.media_kind).collect();
        assert_eq!(stored_kinds, vec![MediaKind::Audio, MediaKind::Video]);
        assert!(handle.shutdown().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibrated_threshold_detects_gentle_shake() {
        let platform = Arc::new(ChannelPlatform::new());
        let motion = platform.open_motion();
        let (callback, _) = collecting_callback();
        let handle = EngineRuntime::spawn(
            &Settings::default(),
            EngineServices::new(platform, Arc::new(ScriptedResponder::accepting()), callback),
        );

        // Magnitudes 3, 5, 3, 5 put the threshold at 2 m/s².
        handle
            .calibrate_motion(vec![
                AccelerationSample::new(3.0, 0.0, 0.0),
                AccelerationSample::new(3.0, 4.0, 0.0),
                AccelerationSample::new(0.0, 0.0, 3.0),
                AccelerationSample::new(0.0, 3.0, 4.0),
            ])
            .await;

        let mut view = handle.view();
        for i in 0..3 {
            let x = if i % 2 == 0 { 0.0 } else { 3.0 };
            motion.send(AccelerationSample::new(x, 0.0, 9.8)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let building = tokio::time::timeout(
            Duration::from_secs(1),
            view.wait_for(|v| (v.shake_confidence - 0.4).abs() < 1e-9),
        )
        .await
        .is_ok_and(|found| found.is_ok());
        assert!(building);

        for i in 3..6 {
            let x = if i % 2 == 0 { 0.0 } else { 3.0 };
            motion.send(AccelerationSample::new(x, 0.0, 9.8)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let view = wait_for_state(&handle, EscalationState::ActionMenu).await;
        assert!(view.shake_confidence.abs() < f64::EPSILON);
        handle.shutdown().await;
    }
}
