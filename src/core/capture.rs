//! Evidence capture: exclusive ownership of one audio/video device stream.
//!
//! At most one stream is held at a time. Starting a new session stops the
//! previous one first, and the stream is released (not just dropped) on
//! stop, on switch and when the session owner goes away.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::model::{CaptureStatus, MediaKind};

/// Finished artifacts kept until someone takes them; older ones are dropped.
pub const MAX_RETAINED_ARTIFACTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("capture permission denied")]
    PermissionDenied,
    #[error("capture device unavailable")]
    DeviceUnavailable,
    #[error("capture is not supported on this platform")]
    Unsupported,
    #[error("capture device error: {0}")]
    Device(String),
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Opens a stream for `kind`. Must not leave anything acquired on error.
    async fn acquire(&self, kind: MediaKind) -> Result<Box<dyn DeviceStream>, CaptureError>;
}

pub trait DeviceStream: Send {
    /// Drains the chunks produced since the previous call.
    fn take_chunks(&mut self) -> Vec<Vec<u8>>;

    /// Stops the hardware and frees it. Called exactly once per stream.
    fn release(&mut self);
}

/// Device for platforms without any capture API.
pub struct NoCaptureDevice;

#[async_trait]
impl CaptureDevice for NoCaptureDevice {
    async fn acquire(&self, _kind: MediaKind) -> Result<Box<dyn DeviceStream>, CaptureError> {
        Err(CaptureError::Unsupported)
    }
}

/// Releases the stream exactly once, explicitly or on drop.
struct StreamGuard {
    stream: Box<dyn DeviceStream>,
    released: bool,
}

impl StreamGuard {
    fn new(stream: Box<dyn DeviceStream>) -> Self {
        Self {
            stream,
            released: false,
        }
    }

    fn take_chunks(&mut self) -> Vec<Vec<u8>> {
        if self.released {
            return Vec::new();
        }
        self.stream.take_chunks()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stream.release();
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Finished recording: all chunks of one session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureArtifact {
    pub media_kind: MediaKind,
    pub data: Vec<u8>,
    pub chunk_count: usize,
}

/// Takes ownership of each artifact as soon as its session stops.
pub type ArtifactCallback = Box<dyn Fn(CaptureArtifact) + Send + Sync>;

struct ActiveSession {
    kind: MediaKind,
    stream: StreamGuard,
    buffered_chunks: Vec<Vec<u8>>,
}

pub struct EvidenceCaptureSession {
    device: Arc<dyn CaptureDevice>,
    active: Option<ActiveSession>,
    artifacts: Vec<CaptureArtifact>,
}

impl EvidenceCaptureSession {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            active: None,
            artifacts: Vec::new(),
        }
    }

    pub fn status(&self) -> CaptureStatus {
        match &self.active {
            Some(session) => CaptureStatus::recording(session.kind),
            None => CaptureStatus::idle(),
        }
    }

    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Starts recording `kind`, stopping any current session first.
    ///
    /// On error the session is left inactive.
    pub async fn start(&mut self, kind: MediaKind) -> Result<(), CaptureError> {
        self.stop();

        let stream = match self.device.acquire(kind).await {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Could not start {} capture: {}", kind.display_name(), e);
                return Err(e);
            }
        };

        log::info!("Started {} capture", kind.display_name());
        self.active = Some(ActiveSession {
            kind,
            stream: StreamGuard::new(stream),
            buffered_chunks: Vec::new(),
        });
        Ok(())
    }

    /// Moves chunks produced by the device into the session buffer.
    pub fn collect(&mut self) {
        if let Some(session) = self.active.as_mut() {
            let chunks = session.stream.take_chunks();
            session
                .buffered_chunks
                .extend(chunks.into_iter().filter(|c| !c.is_empty()));
        }
    }

    /// Ends the session: flushes the buffer into an artifact and releases
    /// the device. Does nothing when no session is active.
    pub fn stop(&mut self) {
        let Some(mut session) = self.active.take() else {
            return;
        };

        let tail = session.stream.take_chunks();
        session
            .buffered_chunks
            .extend(tail.into_iter().filter(|c| !c.is_empty()));
        session.stream.release();

        let chunk_count = session.buffered_chunks.len();
        let data = session.buffered_chunks.concat();
        log::info!(
            "Stopped {} capture ({} chunks, {} bytes)",
            session.kind.display_name(),
            chunk_count,
            data.len()
        );
        self.artifacts.push(CaptureArtifact {
            media_kind: session.kind,
            data,
            chunk_count,
        });
        if self.artifacts.len() > MAX_RETAINED_ARTIFACTS {
            let excess = self.artifacts.len() - MAX_RETAINED_ARTIFACTS;
            log::warn!("Dropping {} unclaimed capture artifacts", excess);
            self.artifacts.drain(..excess);
        }
    }

    /// Hands over the artifacts of all sessions stopped so far.
    pub fn take_artifacts(&mut self) -> Vec<CaptureArtifact> {
        std::mem::take(&mut self.artifacts)
    }
}
