use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::info;

use hazard_watch::events::alert::TcpAlertDispatcher;
use hazard_watch::events::HazardKind;
use hazard_watch::manager::{Collaborators, Orchestrator};
use hazard_watch::HazardWatchError;

use super::common::*;

/// A failed write drops that event without an alert; the worker keeps going.
#[tokio::test(start_paused = true)]
async fn test_persistence_failure_suppresses_alert() {
    super::init_test_environment();

    let mut settings = super::create_test_settings();
    settings.worker.cooldown = Duration::ZERO;
    let fixture = TestFixture::with_parts(
        settings,
        FakeRegistry::new(vec![camera(1, "Dock", "rtsp://10.0.0.1/live")]),
        FakeBackend::default(),
        ScriptedDetector::always(HazardKind::Fire),
        MemorySink::failing_on(vec![1]),
    );

    fixture.orchestrator.ensure_started().await.unwrap();
    // Frames at t = 0, 1, 2, 3
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(fixture.orchestrator.running_count(), 1);

    let report = fixture.orchestrator.shutdown(Duration::from_secs(1)).await;
    let summary = &report.completed[0];

    assert_eq!(fixture.sink.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(fixture.sink.stored_count(), 3);
    assert_eq!(fixture.alerts.sent_count(), 3);
    assert_eq!(summary.events_admitted, 4);
    assert_eq!(summary.events_dropped, 1);
    assert_eq!(summary.frames, 4);
}

#[tokio::test(start_paused = true)]
async fn test_registry_outage_is_retried() {
    super::init_test_environment();
    let fixture = TestFixture::with_parts(
        super::create_test_settings(),
        FakeRegistry::failing(vec![camera(1, "Gate", "rtsp://10.0.0.1/live")], 3),
        FakeBackend::default(),
        ScriptedDetector::always(HazardKind::Smoke),
        MemorySink::default(),
    );

    let start = Instant::now();
    assert_eq!(fixture.orchestrator.ensure_started().await.unwrap(), 1);

    assert_eq!(fixture.registry.calls.load(Ordering::SeqCst), 4);
    assert_eq!(start.elapsed(), Duration::from_secs(15));

    fixture.orchestrator.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_registry_outage() {
    super::init_test_environment();
    let fixture = TestFixture::with_parts(
        super::create_test_settings(),
        FakeRegistry::failing(Vec::new(), usize::MAX),
        FakeBackend::default(),
        ScriptedDetector::always(HazardKind::Fire),
        MemorySink::default(),
    );

    let orchestrator = fixture.orchestrator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        orchestrator.stop();
    });

    let result = fixture.orchestrator.ensure_started().await;
    assert!(matches!(result, Err(HazardWatchError::Stopped)));
    assert_eq!(fixture.registry.calls.load(Ordering::SeqCst), 2);
    assert!(!fixture.orchestrator.status().started);
}

/// An unreachable camera keeps its worker alive in the reconnect loop.
#[tokio::test(start_paused = true)]
async fn test_offline_camera_keeps_retrying() {
    super::init_test_environment();
    let fixture = TestFixture::with_parts(
        super::create_test_settings(),
        FakeRegistry::new(vec![camera(1, "Roof", "rtsp://10.0.0.66/live")]),
        FakeBackend::offline(),
        ScriptedDetector::always(HazardKind::Fire),
        MemorySink::default(),
    );

    fixture.orchestrator.ensure_started().await.unwrap();
    // Attempts at t = 0, 5, 10, 15, 20
    tokio::time::sleep(Duration::from_millis(22_000)).await;

    assert_eq!(fixture.orchestrator.running_count(), 1);
    assert_eq!(fixture.backend.open_count(), 5);

    let report = fixture.orchestrator.shutdown(Duration::from_secs(1)).await;
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].open_failures, 5);
    assert_eq!(report.completed[0].frames, 0);
    assert_eq!(fixture.detector.calls.load(Ordering::SeqCst), 0);
}

/// Stop does not preempt in-flight work; shutdown reports it and moves on.
#[tokio::test(start_paused = true)]
async fn test_shutdown_reports_stuck_worker() {
    super::init_test_environment();
    let fixture = TestFixture::with_parts(
        super::create_test_settings(),
        FakeRegistry::new(vec![
            camera(1, "Stuck", "rtsp://10.0.0.1/live"),
        ]),
        FakeBackend::default(),
        ScriptedDetector::hanging(),
        MemorySink::default(),
    );

    fixture.orchestrator.ensure_started().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = fixture.orchestrator.shutdown(Duration::from_secs(3)).await;
    assert_eq!(report.stragglers, vec!["Stuck".to_string()]);
    assert!(report.completed.is_empty());

    // The stuck worker is still accounted for
    assert_eq!(fixture.orchestrator.running_count(), 1);
    assert_eq!(fixture.orchestrator.status().running_workers, 1);
}

/// A worker that dies from a panic no longer counts as running.
#[tokio::test(start_paused = true)]
async fn test_panicked_worker_is_not_counted() {
    super::init_test_environment();
    let fixture = TestFixture::with_parts(
        super::create_test_settings(),
        FakeRegistry::new(vec![
            camera(2, "Dock", "rtsp://10.0.0.2/live"),
            camera(1, "Gate", "rtsp://10.0.0.1/live"),
        ]),
        FakeBackend::default(),
        ScriptedDetector::panicking_on(1),
        MemorySink::default(),
    );

    assert_eq!(fixture.orchestrator.ensure_started().await.unwrap(), 2);
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    assert_eq!(fixture.orchestrator.running_count(), 1);
    assert_eq!(fixture.orchestrator.status().running_workers, 1);

    let report = fixture.orchestrator.shutdown(Duration::from_secs(1)).await;
    assert_eq!(report.completed.len(), 1);
    assert!(report.stragglers.is_empty());
    assert_eq!(fixture.orchestrator.running_count(), 0);
}

/// Alerts to a dead endpoint fail quietly; events are still stored.
#[tokio::test]
async fn test_alert_endpoint_down() {
    super::init_test_environment();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    drop(listener);

    let mut settings = super::create_test_settings();
    settings.worker.frame_interval = Duration::from_millis(20);
    settings.worker.cooldown = Duration::ZERO;

    let sink = Arc::new(MemorySink::default());
    let collaborators = Collaborators {
        registry: Arc::new(FakeRegistry::new(vec![camera(1, "Dock", "rtsp://10.0.0.1/live")])),
        backend: Arc::new(FakeBackend::default()),
        detector: Arc::new(ScriptedDetector::always(HazardKind::Fire)),
        sink: sink.clone(),
        alerts: Arc::new(TcpAlertDispatcher::new(endpoint, Duration::from_millis(200))),
    };
    let orchestrator = Orchestrator::new(settings, collaborators);
    orchestrator.ensure_started().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let report = orchestrator.shutdown(Duration::from_secs(2)).await;

    let summary = &report.completed[0];
    info!("Stored {} events with the alert endpoint down", sink.stored_count());
    assert!(sink.stored_count() >= 2);
    assert_eq!(summary.events_alerted, 0);
    assert_eq!(summary.events_dropped, 0);
}
