use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hazard_watch::camera::{CameraRecord, CameraRegistry, CameraSource, RegistryError};
use hazard_watch::events::alert::{Alert, AlertDispatcher, TransportError};
use hazard_watch::events::sink::{EventRecord, EventSink, PersistenceError};
use hazard_watch::events::HazardKind;
use hazard_watch::inference::{Detection, Detector, DetectorError};
use hazard_watch::manager::{Collaborators, Orchestrator, OrchestratorSettings};
use hazard_watch::stream::{ConnectivityError, Frame, FrameStream, StreamBackend};

pub fn camera(id: i64, name: &str, uri: &str) -> CameraRecord {
    CameraRecord {
        id,
        name: name.to_string(),
        uri: uri.to_string(),
        status: 1,
        install_date: None,
    }
}

/// Registry that fails a set number of times before answering.
pub struct FakeRegistry {
    records: Vec<CameraRecord>,
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(records: Vec<CameraRecord>) -> Self {
        Self::failing(records, 0)
    }

    pub fn failing(records: Vec<CameraRecord>, failures: usize) -> Self {
        Self {
            records,
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CameraRegistry for FakeRegistry {
    async fn load_cameras(&self) -> Result<Vec<CameraRecord>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(RegistryError("database is locked".to_string()));
        }
        Ok(self.records.clone())
    }
}

/// Backend producing blank frames forever, or refusing every open.
#[derive(Default)]
pub struct FakeBackend {
    pub refuse: bool,
    pub opened: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn offline() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }
}

struct BlankStream;

#[async_trait]
impl FrameStream for BlankStream {
    async fn read_frame(&mut self) -> Result<Frame, ConnectivityError> {
        Ok(Frame::new(32, 24))
    }
}

#[async_trait]
impl StreamBackend for FakeBackend {
    async fn open(
        &self,
        source: &CameraSource,
        _buffer_frames: u32,
    ) -> Result<Box<dyn FrameStream>, ConnectivityError> {
        self.opened.lock().push(source.uri.clone());
        if self.refuse {
            return Err(ConnectivityError::Open("connection refused".to_string()));
        }
        Ok(Box::new(BlankStream))
    }
}

/// Returns scripted detections per call, then `fallback` forever.
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Vec<Detection>>>,
    fallback: Vec<Detection>,
    hang: bool,
    panic_on: Option<usize>,
    pub calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn always(kind: HazardKind) -> Self {
        Self::scripted(Vec::new(), vec![hit(kind, 0.9)])
    }

    pub fn scripted(script: Vec<Vec<Detection>>, fallback: Vec<Detection>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            hang: false,
            panic_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Never returns, like an inference call stuck on a device.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::scripted(Vec::new(), Vec::new())
        }
    }

    /// Fire on every call except call `call` (1-based), which panics.
    pub fn panicking_on(call: usize) -> Self {
        Self {
            panic_on: Some(call),
            ..Self::always(HazardKind::Fire)
        }
    }
}

pub fn hit(kind: HazardKind, confidence: f32) -> Detection {
    let class_id = HazardKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_default() as u32;
    Detection { class_id, confidence }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, _frame: Arc<Frame>) -> Result<Vec<Detection>, DetectorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on == Some(call) {
            panic!("inference runtime crashed on call {}", call);
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self.script.lock().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// In-memory sink; fails the call numbers (1-based) listed in `fail_calls`.
#[derive(Default)]
pub struct MemorySink {
    fail_calls: Vec<usize>,
    pub attempts: AtomicUsize,
    pub stored: Mutex<Vec<EventRecord>>,
}

impl MemorySink {
    pub fn failing_on(fail_calls: Vec<usize>) -> Self {
        Self {
            fail_calls,
            ..Default::default()
        }
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().len()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn persist(&self, record: &EventRecord) -> Result<i64, PersistenceError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_calls.contains(&attempt) {
            return Err(PersistenceError::Store("database is locked".to_string()));
        }
        let mut stored = self.stored.lock();
        stored.push(record.clone());
        Ok(stored.len() as i64)
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<Alert>>,
}

impl RecordingDispatcher {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl AlertDispatcher for RecordingDispatcher {
    async fn dispatch(&self, alert: &Alert) -> Result<(), TransportError> {
        self.sent.lock().push(alert.clone());
        Ok(())
    }
}

/// Orchestrator wired to fakes, with handles kept for assertions.
pub struct TestFixture {
    pub registry: Arc<FakeRegistry>,
    pub backend: Arc<FakeBackend>,
    pub detector: Arc<ScriptedDetector>,
    pub sink: Arc<MemorySink>,
    pub alerts: Arc<RecordingDispatcher>,
    pub orchestrator: Arc<Orchestrator>,
}

impl TestFixture {
    pub fn new(records: Vec<CameraRecord>) -> Self {
        Self::with_parts(
            super::create_test_settings(),
            FakeRegistry::new(records),
            FakeBackend::default(),
            ScriptedDetector::always(HazardKind::Fire),
            MemorySink::default(),
        )
    }

    pub fn with_parts(
        settings: OrchestratorSettings,
        registry: FakeRegistry,
        backend: FakeBackend,
        detector: ScriptedDetector,
        sink: MemorySink,
    ) -> Self {
        let registry = Arc::new(registry);
        let backend = Arc::new(backend);
        let detector = Arc::new(detector);
        let sink = Arc::new(sink);
        let alerts = Arc::new(RecordingDispatcher::default());

        let collaborators = Collaborators {
            registry: registry.clone(),
            backend: backend.clone(),
            detector: detector.clone(),
            sink: sink.clone(),
            alerts: alerts.clone(),
        };
        let orchestrator = Arc::new(Orchestrator::new(settings, collaborators));

        Self {
            registry,
            backend,
            detector,
            sink,
            alerts,
            orchestrator,
        }
    }
}
