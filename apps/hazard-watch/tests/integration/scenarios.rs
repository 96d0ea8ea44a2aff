use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::info;

use hazard_watch::database::Database;
use hazard_watch::events::alert::TcpAlertDispatcher;
use hazard_watch::events::sink::StoreEventSink;
use hazard_watch::events::HazardKind;
use hazard_watch::manager::{Collaborators, Orchestrator};

use super::common::*;

/// Fire at t = 0, 3 and 6 s with a 5 s cooldown: events at 0 and 6 only.
#[tokio::test(start_paused = true)]
async fn test_cooldown_suppresses_repeat_detection() {
    super::init_test_environment();

    let fire = vec![hit(HazardKind::Fire, 0.8)];
    let script = vec![
        fire.clone(), vec![], vec![],
        fire.clone(), vec![], vec![],
        fire,
    ];
    let fixture = TestFixture::with_parts(
        super::create_test_settings(),
        FakeRegistry::new(vec![camera(1, "Dock", "rtsp://10.0.0.1/live")]),
        FakeBackend::default(),
        ScriptedDetector::scripted(script, vec![]),
        MemorySink::default(),
    );

    assert_eq!(fixture.orchestrator.ensure_started().await.unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(6_500)).await;
    let report = fixture.orchestrator.shutdown(Duration::from_secs(1)).await;

    assert!(report.stragglers.is_empty());
    assert_eq!(fixture.detector.calls.load(Ordering::SeqCst), 7);
    assert_eq!(fixture.sink.stored_count(), 2);
    assert_eq!(fixture.alerts.sent_count(), 2);
    info!("Cooldown scenario stored {} events", fixture.sink.stored_count());
}

/// `rtsp://A` and `RTSP://A/` are the same camera.
#[tokio::test(start_paused = true)]
async fn test_duplicate_uri_gets_one_worker() {
    super::init_test_environment();
    let fixture = TestFixture::new(vec![
        camera(2, "A", "rtsp://A"),
        camera(1, "A again", "RTSP://A/"),
    ]);

    assert_eq!(fixture.orchestrator.ensure_started().await.unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = fixture.orchestrator.status();
    assert_eq!(status.spawned, 1);
    assert_eq!(status.duplicates, 1);
    assert_eq!(fixture.orchestrator.running_count(), 1);

    let opened: HashSet<_> = fixture.backend.opened.lock().iter().cloned().collect();
    assert_eq!(opened.len(), 1);
    assert!(opened.contains("rtsp://A"));

    fixture.orchestrator.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_worker_cap_skips_excess_cameras() {
    super::init_test_environment();
    let records = (0..25)
        .map(|i| camera(i, &format!("cam{}", i), &format!("rtsp://10.0.1.{}/live", i)))
        .collect();
    let fixture = TestFixture::new(records);

    assert_eq!(fixture.orchestrator.ensure_started().await.unwrap(), 20);

    let status = fixture.orchestrator.status();
    assert_eq!(status.skipped_over_cap, 5);
    assert_eq!(status.running_workers, 20);

    let report = fixture.orchestrator.shutdown(Duration::from_secs(2)).await;
    assert_eq!(report.completed.len(), 20);
    assert_eq!(fixture.orchestrator.running_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_start_happens_once() {
    super::init_test_environment();
    let fixture = TestFixture::new(vec![
        camera(1, "Gate", "rtsp://10.0.0.1/live"),
        camera(2, "Yard", "http://10.0.0.2/mjpeg"),
    ]);

    let orchestrator = fixture.orchestrator.clone();
    let (first, second) = tokio::join!(
        fixture.orchestrator.ensure_started(),
        orchestrator.ensure_started()
    );

    assert_eq!(first.unwrap(), 2);
    assert_eq!(second.unwrap(), 2);
    assert_eq!(fixture.registry.calls.load(Ordering::SeqCst), 1);

    // A later call is a no-op too
    fixture.orchestrator.ensure_started().await.unwrap();
    assert_eq!(fixture.registry.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.orchestrator.status().spawned, 2);

    fixture.orchestrator.shutdown(Duration::from_secs(1)).await;
}

/// Full path against the SQLite store and a TCP alert listener.
#[tokio::test]
async fn test_detection_is_stored_then_alerted() {
    super::init_test_environment();

    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("events.db").display());
    let db = Database::from_url(&url).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();

    let mut settings = super::create_test_settings();
    settings.worker.frame_interval = Duration::from_millis(50);

    let collaborators = Collaborators {
        registry: Arc::new(FakeRegistry::new(vec![camera(1, "Dock", "rtsp://10.0.0.9/live")])),
        backend: Arc::new(FakeBackend::default()),
        detector: Arc::new(ScriptedDetector::always(HazardKind::Spill)),
        sink: Arc::new(StoreEventSink::new(db.clone())),
        alerts: Arc::new(TcpAlertDispatcher::new(endpoint, Duration::from_secs(2))),
    };
    let orchestrator = Orchestrator::new(settings, collaborators);
    orchestrator.ensure_started().await.unwrap();

    let line = tokio::time::timeout(Duration::from_secs(5), async {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut line = String::new();
        socket.read_to_string(&mut line).await.unwrap();
        line
    })
    .await
    .expect("no alert received");

    assert!(line.ends_with(" | CAMERA: Dock | EVENT: SPILL\n"), "unexpected alert: {:?}", line);

    let events = db.recent_events(None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "spill");
    let frame = db.event_frame(events[0].id).await.unwrap();
    assert_eq!(&frame[..2], &[0xFF, 0xD8]);

    let report = orchestrator.shutdown(Duration::from_secs(2)).await;
    assert!(report.stragglers.is_empty());
    db.close().await;
}
