use image::imageops::{self, FilterType};
use std::time::Duration;
use tokio::time::Instant;

use super::Frame;

/// Realized frames per second over one-second windows.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
    last_fps: Option<f64>,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            last_fps: None,
        }
    }

    /// Count one frame. Returns the rate when a window closes.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < Self::WINDOW {
            return None;
        }

        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.window_start = Some(now);
        self.frames = 0;
        self.last_fps = Some(fps);
        Some(fps)
    }

    pub fn last_fps(&self) -> Option<f64> {
        self.last_fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes frame size and paces the loop to the target rate. Frames that
/// arrive while the loop is busy are simply never read; nothing is queued and
/// a slow iteration is not made up for.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    width: u32,
    height: u32,
    interval: Duration,
    fps: FpsCounter,
}

impl FrameSampler {
    pub fn new(width: u32, height: u32, interval: Duration) -> Self {
        Self {
            width,
            height,
            interval,
            fps: FpsCounter::new(),
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize to the detector input size. Cheap when already there.
    pub fn normalize(&self, frame: Frame) -> Frame {
        if frame.dimensions() == (self.width, self.height) {
            return frame;
        }
        imageops::resize(&frame, self.width, self.height, FilterType::Triangle)
    }

    /// Time left in the current interval for an iteration that began at
    /// `started`. Zero when the iteration overran.
    pub fn remaining(&self, started: Instant, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(started))
    }

    pub fn record_frame(&mut self, now: Instant) -> Option<f64> {
        self.fps.tick(now)
    }

    pub fn fps(&self) -> Option<f64> {
        self.fps.last_fps()
    }
}
