use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::camera::CameraSource;
use crate::config::Config;
use crate::events::{DetectionEvent, Debouncer, EventOutcome, EventPipeline};
use crate::inference::{candidate_events, ClassMap, Detector, DetectorError};
use crate::manager::StopSignal;
use crate::stream::{Frame, FrameSampler, StreamBackend, StreamConnector};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Detector failed: {0}")]
    Detector(#[from] DetectorError),

    #[error("Frame task failed: {0}")]
    TaskFailed(String),
}

/// Everything a worker needs from the configuration, resolved up front.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_interval: Duration,
    pub buffer_frames: u32,
    pub reconnect_delay: Duration,
    pub confidence_threshold: f32,
    pub cooldown: Duration,
    pub class_map: ClassMap,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_width: config.stream.frame_width,
            frame_height: config.stream.frame_height,
            frame_interval: config.stream.frame_interval(),
            buffer_frames: config.stream.buffer_frames,
            reconnect_delay: config.stream.reconnect_delay(),
            confidence_threshold: config.detection.confidence_threshold,
            cooldown: Duration::from_secs(config.detection.cooldown_seconds),
            class_map: ClassMap::from_labels(&config.detection.classes),
        }
    }
}

/// Counters reported when a worker exits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerSummary {
    pub camera: String,
    pub frames: u64,
    pub events_admitted: u64,
    pub events_alerted: u64,
    pub events_dropped: u64,
    pub iteration_errors: u64,
    pub open_failures: u64,
    pub read_failures: u64,
}

/// One camera, end to end: connect, sample, detect, debounce, persist, alert.
pub struct Worker {
    source: CameraSource,
    settings: WorkerSettings,
    backend: Arc<dyn StreamBackend>,
    detector: Arc<dyn Detector>,
    pipeline: Arc<EventPipeline>,
    stop: StopSignal,
}

impl Worker {
    pub fn new(
        source: CameraSource,
        settings: WorkerSettings,
        backend: Arc<dyn StreamBackend>,
        detector: Arc<dyn Detector>,
        pipeline: Arc<EventPipeline>,
        stop: StopSignal,
    ) -> Self {
        Self {
            source,
            settings,
            backend,
            detector,
            pipeline,
            stop,
        }
    }

    pub async fn run(self) -> WorkerSummary {
        let camera = self.source.name.clone();
        info!(camera = %camera, uri = %self.source.uri, "Worker started");

        let mut connector = StreamConnector::new(
            self.source.clone(),
            self.backend.clone(),
            self.settings.buffer_frames,
            self.settings.reconnect_delay,
            self.stop.clone(),
        );
        let mut sampler = FrameSampler::new(
            self.settings.frame_width,
            self.settings.frame_height,
            self.settings.frame_interval,
        );
        let mut debouncer = Debouncer::new(self.settings.cooldown);
        let mut summary = WorkerSummary {
            camera: camera.clone(),
            ..Default::default()
        };

        loop {
            // The read counts against the interval, a reconnect does not
            let mut started = Instant::now();
            let Some(frame) = connector.next_frame().await else {
                break;
            };
            if let Some(connected_at) = connector.connected_at() {
                started = started.max(connected_at);
            }
            summary.frames += 1;

            if let Err(e) = self.process(frame, &sampler, &mut debouncer, &mut summary).await {
                summary.iteration_errors += 1;
                error!(camera = %camera, "Frame processing failed: {}", e);
                connector.back_off().await;
                continue;
            }

            let now = Instant::now();
            if let Some(fps) = sampler.record_frame(now) {
                debug!(camera = %camera, fps, "Sampling rate");
            }

            let wait = sampler.remaining(started, now);
            if !wait.is_zero() && !self.stop.sleep(wait).await {
                break;
            }
        }

        connector.release();
        let stats = connector.stats();
        summary.open_failures = stats.open_failures;
        summary.read_failures = stats.read_failures;

        info!(
            camera = %camera,
            frames = summary.frames,
            events = summary.events_admitted,
            "Worker stopped"
        );
        summary
    }

    async fn process(
        &self,
        frame: Frame,
        sampler: &FrameSampler,
        debouncer: &mut Debouncer,
        summary: &mut WorkerSummary,
    ) -> Result<(), WorkerError> {
        let resizer = sampler.clone();
        let frame = tokio::task::spawn_blocking(move || resizer.normalize(frame))
            .await
            .map_err(|e| WorkerError::TaskFailed(e.to_string()))?;
        let frame = Arc::new(frame);

        let detections = self.detector.detect(frame.clone()).await?;
        let candidates = candidate_events(
            &detections,
            self.settings.confidence_threshold,
            &self.settings.class_map,
        );

        for kind in candidates {
            if !debouncer.admit(kind, Instant::now()) {
                debug!(camera = %self.source.name, kind = %kind, "Suppressed by cooldown");
                continue;
            }

            summary.events_admitted += 1;
            let event = DetectionEvent {
                camera_name: self.source.name.clone(),
                kind,
                frame: frame.clone(),
                captured_at: Local::now(),
            };

            match self.pipeline.handle(event).await {
                EventOutcome::Alerted => summary.events_alerted += 1,
                EventOutcome::StoredOnly => {}
                EventOutcome::Dropped => summary.events_dropped += 1,
            }
        }

        Ok(())
    }
}
