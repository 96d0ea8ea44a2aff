use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::camera::{CameraRecord, CameraRegistry, CameraSource};
use crate::config::Config;
use crate::events::alert::AlertDispatcher;
use crate::events::sink::EventSink;
use crate::events::EventPipeline;
use crate::inference::Detector;
use crate::recovery::ReconnectPolicy;
use crate::stream::StreamBackend;
use crate::worker::{Worker, WorkerSettings, WorkerSummary};
use crate::{HazardWatchError, Result};

pub mod stop;

pub use stop::{stop_signal, StopSignal, StopTrigger};

/// External capabilities shared by every worker.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn CameraRegistry>,
    pub backend: Arc<dyn StreamBackend>,
    pub detector: Arc<dyn Detector>,
    pub sink: Arc<dyn EventSink>,
    pub alerts: Arc<dyn AlertDispatcher>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_cameras: usize,
    pub registry_retry: Duration,
    pub jpeg_quality: u8,
    pub worker: WorkerSettings,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_cameras: config.app.max_cameras,
            registry_retry: Duration::from_secs(config.database.registry_retry_seconds),
            jpeg_quality: config.events.jpeg_quality,
            worker: WorkerSettings::from_config(config),
        }
    }
}

/// Result of turning registry rows into a worker set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerPlan {
    pub sources: Vec<CameraSource>,
    pub disabled: Vec<CameraSource>,
    pub rejected_scheme: Vec<CameraSource>,
    pub duplicates: Vec<CameraSource>,
    pub over_cap: Vec<CameraSource>,
}

/// Keep enabled sources with a supported scheme, one per normalized URI
/// (first in registry order wins), at most `max_cameras` of them.
pub fn plan_workers(records: Vec<CameraRecord>, max_cameras: usize) -> WorkerPlan {
    let mut plan = WorkerPlan::default();
    let mut seen = HashSet::new();

    for source in records.into_iter().map(CameraSource::from) {
        if !source.enabled {
            plan.disabled.push(source);
        } else if !source.source_type().is_supported() {
            plan.rejected_scheme.push(source);
        } else if !seen.insert(source.normalized_uri()) {
            plan.duplicates.push(source);
        } else if plan.sources.len() >= max_cameras {
            plan.over_cap.push(source);
        } else {
            plan.sources.push(source);
        }
    }

    plan
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct OrchestratorStatus {
    pub started: bool,
    pub running_workers: usize,
    pub spawned: usize,
    pub skipped_over_cap: usize,
    pub rejected_scheme: usize,
    pub duplicates: usize,
}

/// Bookkeeping for one spawned worker.
pub struct WorkerHandle {
    pub camera: CameraSource,
    running: Arc<AtomicBool>,
    join: JoinHandle<WorkerSummary>,
}

impl WorkerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Clears the running flag however the worker task ends, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub completed: Vec<WorkerSummary>,
    /// Cameras whose worker was still busy when the timeout expired
    pub stragglers: Vec<String>,
}

#[derive(Default)]
struct State {
    status: OrchestratorStatus,
    handles: Vec<WorkerHandle>,
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    collaborators: Collaborators,
    trigger: StopTrigger,
    signal: StopSignal,
    start_lock: tokio::sync::Mutex<()>,
    state: Mutex<State>,
}

impl Orchestrator {
    pub fn new(settings: OrchestratorSettings, collaborators: Collaborators) -> Self {
        let (trigger, signal) = stop_signal();
        Self {
            settings,
            collaborators,
            trigger,
            signal,
            start_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(State::default()),
        }
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.signal.clone()
    }

    /// Start one worker per planned camera. Safe to call repeatedly and
    /// concurrently; only the first call does any work.
    pub async fn ensure_started(&self) -> Result<usize> {
        let _guard = self.start_lock.lock().await;
        if self.state.lock().status.started {
            return Ok(self.running_count());
        }

        let records = self.load_registry().await?;
        let plan = plan_workers(records, self.settings.max_cameras);

        for source in &plan.rejected_scheme {
            warn!(camera = %source.name, uri = %source.uri, "Skipping camera with unsupported URI scheme");
        }
        for source in &plan.duplicates {
            warn!(camera = %source.name, uri = %source.uri, "Skipping duplicate camera URI");
        }
        for source in &plan.over_cap {
            warn!(
                camera = %source.name,
                "Skipping camera, limit of {} reached",
                self.settings.max_cameras
            );
        }
        for source in &plan.disabled {
            debug!(camera = %source.name, "Camera disabled");
        }

        let pipeline = Arc::new(EventPipeline::new(
            self.collaborators.sink.clone(),
            self.collaborators.alerts.clone(),
            self.settings.jpeg_quality,
        ));

        let mut handles = Vec::with_capacity(plan.sources.len());
        for source in plan.sources.iter().cloned() {
            handles.push(self.spawn_worker(source, pipeline.clone()));
        }

        let mut state = self.state.lock();
        state.status = OrchestratorStatus {
            started: true,
            running_workers: 0,
            spawned: handles.len(),
            skipped_over_cap: plan.over_cap.len(),
            rejected_scheme: plan.rejected_scheme.len(),
            duplicates: plan.duplicates.len(),
        };
        state.handles = handles;

        info!(
            "Started {} camera workers ({} over limit, {} unsupported, {} duplicates)",
            state.status.spawned,
            state.status.skipped_over_cap,
            state.status.rejected_scheme,
            state.status.duplicates
        );
        Ok(state.status.spawned)
    }

    async fn load_registry(&self) -> Result<Vec<CameraRecord>> {
        let mut policy = ReconnectPolicy::fixed(self.settings.registry_retry);

        loop {
            if self.signal.is_stopped() {
                return Err(HazardWatchError::Stopped);
            }

            match self.collaborators.registry.load_cameras().await {
                Ok(records) => {
                    debug!("Camera registry returned {} enabled cameras", records.len());
                    return Ok(records);
                }
                Err(e) => {
                    let delay = policy.next_delay();
                    error!(
                        "Camera registry unavailable (attempt {}), retrying in {:?}: {}",
                        policy.attempt(),
                        delay,
                        e
                    );
                    if !self.signal.sleep(delay).await {
                        return Err(HazardWatchError::Stopped);
                    }
                }
            }
        }
    }

    fn spawn_worker(&self, source: CameraSource, pipeline: Arc<EventPipeline>) -> WorkerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker::new(
            source.clone(),
            self.settings.worker.clone(),
            self.collaborators.backend.clone(),
            self.collaborators.detector.clone(),
            pipeline,
            self.trigger.subscribe(),
        );

        let flag = running.clone();
        let join = tokio::spawn(async move {
            let _running = RunningGuard(flag);
            worker.run().await
        });

        WorkerHandle {
            camera: source,
            running,
            join,
        }
    }

    pub fn running_count(&self) -> usize {
        self.state.lock().handles.iter().filter(|h| h.is_running()).count()
    }

    pub fn status(&self) -> OrchestratorStatus {
        let state = self.state.lock();
        OrchestratorStatus {
            running_workers: state.handles.iter().filter(|h| h.is_running()).count(),
            ..state.status.clone()
        }
    }

    /// Request stop without waiting for workers.
    pub fn stop(&self) {
        if !self.trigger.is_stopped() {
            info!("Stop requested");
        }
        self.trigger.stop();
    }

    /// Stop, then wait up to `timeout` for the workers. Workers still busy
    /// afterwards are reported, stay in the worker table and are left
    /// running until process exit.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        self.stop();

        let handles = std::mem::take(&mut self.state.lock().handles);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut report = ShutdownReport::default();
        let mut busy = Vec::new();

        for mut handle in handles {
            let camera = handle.camera.name.clone();
            match tokio::time::timeout_at(deadline, &mut handle.join).await {
                Ok(Ok(summary)) => report.completed.push(summary),
                Ok(Err(e)) => error!(camera = %camera, "Worker task failed: {}", e),
                Err(_) => {
                    report.stragglers.push(camera);
                    busy.push(handle);
                }
            }
        }
        self.state.lock().handles.extend(busy);

        if report.stragglers.is_empty() {
            info!("All {} workers stopped", report.completed.len());
        } else {
            warn!(
                "{} workers did not stop within {:?}: {}",
                report.stragglers.len(),
                timeout,
                report.stragglers.join(", ")
            );
        }

        report
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.trigger.stop();
    }
}
