// Device feedback fired when an alert goes out.
//
// Both capabilities are best effort: implementations must return quickly
// and a failure is only logged by the dispatcher.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedbackError {
    #[error("not supported on this device")]
    Unsupported,
    #[error("feedback device error: {0}")]
    Device(String),
}

pub trait Vibrator: Send + Sync {
    /// Alternating on/off durations, starting with "on".
    fn vibrate(&self, pattern: &[Duration]) -> Result<(), FeedbackError>;
}

pub trait Chime: Send + Sync {
    /// Starts the audible cue without waiting for it to finish.
    fn play(&self) -> Result<(), FeedbackError>;
}

/// Stand-in for devices without vibration or audio output.
pub struct NoFeedback;

impl Vibrator for NoFeedback {
    fn vibrate(&self, _pattern: &[Duration]) -> Result<(), FeedbackError> {
        Err(FeedbackError::Unsupported)
    }
}

impl Chime for NoFeedback {
    fn play(&self) -> Result<(), FeedbackError> {
        Err(FeedbackError::Unsupported)
    }
}

/// Two-tone cue on the default audio output.
#[cfg(feature = "audio")]
pub struct RodioChime {
    tones: Vec<(f32, Duration)>,
}

#[cfg(feature = "audio")]
impl Default for RodioChime {
    fn default() -> Self {
        let pulse = Duration::from_millis(200);
        Self {
            tones: vec![(880.0, pulse), (660.0, pulse), (880.0, pulse)],
        }
    }
}

#[cfg(feature = "audio")]
impl Chime for RodioChime {
    fn play(&self) -> Result<(), FeedbackError> {
        use rodio::Source;

        let tones = self.tones.clone();
        // The output stream has to stay alive while the cue plays, so the
        // whole playback lives on its own thread.
        std::thread::Builder::new()
            .name("dispatch-chime".to_string())
            .spawn(move || {
                let stream = match rodio::OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => stream,
                    Err(e) => {
                        log::warn!("No audio output for dispatch chime: {}", e);
                        return;
                    }
                };
                let sink = rodio::Sink::connect_new(stream.mixer());
                for (frequency, length) in tones {
                    sink.append(
                        rodio::source::SineWave::new(frequency)
                            .take_duration(length)
                            .amplify(0.25),
                    );
                }
                sink.sleep_until_end();
            })
            .map(|_| ())
            .map_err(|e| FeedbackError::Device(e.to_string()))
    }
}
