//! Platform collaborators injected into the engine.
//!
//! Each capability is optional. Subscribing hands back a channel receiver;
//! dropping the receiver is the unsubscribe.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;

use super::model::{AccelerationSample, Location};

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("not supported on this device")]
    Unsupported,
}

pub trait DevicePlatform: Send + Sync {
    fn motion(&self) -> Result<mpsc::Receiver<AccelerationSample>, SensorError> {
        Err(SensorError::Unsupported)
    }

    /// Battery level changes, in percent.
    fn battery(&self) -> Result<mpsc::Receiver<f32>, SensorError> {
        Err(SensorError::Unsupported)
    }

    /// Online (`true`) / offline (`false`) notifications.
    fn connectivity(&self) -> Result<mpsc::Receiver<bool>, SensorError> {
        Err(SensorError::Unsupported)
    }

    /// Final speech-to-text transcripts.
    fn speech(&self) -> Result<mpsc::Receiver<String>, SensorError> {
        Err(SensorError::Unsupported)
    }
}

pub trait LocationProvider: Send + Sync {
    /// Latest fix, or `None` when no fix is available.
    fn current_location(&self) -> Option<Location>;
}

/// Location provider backed by a value the host updates.
#[derive(Default)]
pub struct SharedLocation {
    current: Mutex<Option<Location>>,
}

impl SharedLocation {
    pub fn new(initial: Option<Location>) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }

    pub fn set(&self, location: Option<Location>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = location;
    }
}

impl LocationProvider for SharedLocation {
    fn current_location(&self) -> Option<Location> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

enum Feed<T> {
    Ready(mpsc::Receiver<T>),
    Missing(SensorError),
}

impl<T> Feed<T> {
    fn take(&mut self) -> Result<mpsc::Receiver<T>, SensorError> {
        match std::mem::replace(self, Self::Missing(SensorError::Unsupported)) {
            Self::Ready(rx) => Ok(rx),
            Self::Missing(err) => {
                *self = Self::Missing(err.clone());
                Err(err)
            }
        }
    }
}

/// Platform whose capabilities are fed through channels by the host.
///
/// Used by the headless simulator and by tests. A capability that was never
/// opened reports `Unsupported`; one that was denied reports
/// `PermissionDenied`. Each feed can be subscribed to once.
pub struct ChannelPlatform {
    motion: Mutex<Feed<AccelerationSample>>,
    battery: Mutex<Feed<f32>>,
    connectivity: Mutex<Feed<bool>>,
    speech: Mutex<Feed<String>>,
}

impl Default for ChannelPlatform {
    fn default() -> Self {
        Self {
            motion: Mutex::new(Feed::Missing(SensorError::Unsupported)),
            battery: Mutex::new(Feed::Missing(SensorError::Unsupported)),
            connectivity: Mutex::new(Feed::Missing(SensorError::Unsupported)),
            speech: Mutex::new(Feed::Missing(SensorError::Unsupported)),
        }
    }
}

fn open<T>(slot: &Mutex<Feed<T>>) -> mpsc::Sender<T> {
    let (tx, rx) = mpsc::channel(FEED_CAPACITY);
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Feed::Ready(rx);
    tx
}

fn subscribe<T>(slot: &Mutex<Feed<T>>) -> Result<mpsc::Receiver<T>, SensorError> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl ChannelPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_motion(&self) -> mpsc::Sender<AccelerationSample> {
        open(&self.motion)
    }

    pub fn open_battery(&self) -> mpsc::Sender<f32> {
        open(&self.battery)
    }

    pub fn open_connectivity(&self) -> mpsc::Sender<bool> {
        open(&self.connectivity)
    }

    pub fn open_speech(&self) -> mpsc::Sender<String> {
        open(&self.speech)
    }

    pub fn deny_motion(&self) {
        *self.motion.lock().unwrap_or_else(PoisonError::into_inner) =
            Feed::Missing(SensorError::PermissionDenied);
    }
}

impl DevicePlatform for ChannelPlatform {
    fn motion(&self) -> Result<mpsc::Receiver<AccelerationSample>, SensorError> {
        subscribe(&self.motion)
    }

    fn battery(&self) -> Result<mpsc::Receiver<f32>, SensorError> {
        subscribe(&self.battery)
    }

    fn connectivity(&self) -> Result<mpsc::Receiver<bool>, SensorError> {
        subscribe(&self.connectivity)
    }

    fn speech(&self) -> Result<mpsc::Receiver<String>, SensorError> {
        subscribe(&self.speech)
    }
}
