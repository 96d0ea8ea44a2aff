pub mod sampler;
pub mod source;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::camera::CameraSource;
use crate::manager::StopSignal;
use crate::recovery::ReconnectPolicy;

pub use sampler::{FpsCounter, FrameSampler};
pub use source::GstBackend;

/// Decoded frame, packed RGB.
pub type Frame = image::RgbImage;

#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("Failed to open stream: {0}")]
    Open(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("End of stream")]
    Eos,

    #[error("Stream read failed: {0}")]
    Read(String),
}

/// Opens camera streams.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    async fn open(
        &self,
        source: &CameraSource,
        buffer_frames: u32,
    ) -> Result<Box<dyn FrameStream>, ConnectivityError>;
}

/// An open stream. Dropping it releases the underlying session.
#[async_trait]
pub trait FrameStream: Send {
    async fn read_frame(&mut self) -> Result<Frame, ConnectivityError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Streaming,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectorStats {
    pub open_attempts: u64,
    pub open_failures: u64,
    pub read_failures: u64,
    pub frames: u64,
}

/// Keeps one camera stream open, reconnecting at a fixed delay for as long
/// as the stop signal allows.
pub struct StreamConnector {
    source: CameraSource,
    backend: Arc<dyn StreamBackend>,
    buffer_frames: u32,
    policy: ReconnectPolicy,
    stop: StopSignal,
    state: ConnectorState,
    stream: Option<Box<dyn FrameStream>>,
    connected_at: Option<Instant>,
    stats: ConnectorStats,
}

impl StreamConnector {
    pub fn new(
        source: CameraSource,
        backend: Arc<dyn StreamBackend>,
        buffer_frames: u32,
        reconnect_delay: Duration,
        stop: StopSignal,
    ) -> Self {
        Self {
            source,
            backend,
            buffer_frames,
            policy: ReconnectPolicy::fixed(reconnect_delay),
            stop,
            state: ConnectorState::Disconnected,
            stream: None,
            connected_at: None,
            stats: ConnectorStats::default(),
        }
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    pub fn stats(&self) -> ConnectorStats {
        self.stats
    }

    /// When the current stream finished opening, if one is open.
    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    /// Next frame, connecting first if needed. `None` once stopped.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if self.stop.is_stopped() {
                self.shut();
                return None;
            }

            let Some(stream) = self.stream.as_mut() else {
                self.connect().await;
                continue;
            };

            match stream.read_frame().await {
                Ok(frame) => {
                    self.stats.frames += 1;
                    return Some(frame);
                }
                Err(e) => {
                    self.stats.read_failures += 1;
                    warn!(camera = %self.source.name, "Stream lost: {}", e);
                    self.back_off().await;
                }
            }
        }
    }

    async fn connect(&mut self) {
        self.state = ConnectorState::Connecting;
        self.stats.open_attempts += 1;
        debug!(camera = %self.source.name, uri = %self.source.uri, "Opening stream");

        match self.backend.open(&self.source, self.buffer_frames).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.connected_at = Some(Instant::now());
                self.state = ConnectorState::Streaming;
                if self.policy.attempt() > 0 {
                    info!(
                        camera = %self.source.name,
                        "Stream connected after {} failed attempts",
                        self.policy.attempt()
                    );
                } else {
                    info!(camera = %self.source.name, "Stream connected");
                }
                self.policy.reset();
            }
            Err(e) => {
                self.stats.open_failures += 1;
                warn!(
                    camera = %self.source.name,
                    "Cannot open stream (attempt {}): {}",
                    self.policy.attempt() + 1,
                    e
                );
                self.back_off().await;
            }
        }
    }

    /// Release the stream and wait the reconnect delay. Returns early if the
    /// stop signal fires during the wait.
    pub async fn back_off(&mut self) {
        self.release();
        let delay = self.policy.next_delay();
        debug!(camera = %self.source.name, "Retrying in {:?}", delay);
        self.stop.sleep(delay).await;
    }

    pub fn release(&mut self) {
        self.connected_at = None;
        if self.stream.take().is_some() {
            debug!(camera = %self.source.name, "Stream released");
        }
        if self.state != ConnectorState::Stopped {
            self.state = ConnectorState::Disconnected;
        }
    }

    fn shut(&mut self) {
        self.release();
        self.state = ConnectorState::Stopped;
    }
}
