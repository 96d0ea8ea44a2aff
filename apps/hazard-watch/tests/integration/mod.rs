pub mod common;
pub mod failure_injection;
pub mod scenarios;

use std::time::Duration;

use hazard_watch::inference::ClassMap;
use hazard_watch::manager::OrchestratorSettings;
use hazard_watch::worker::WorkerSettings;

pub fn init_test_environment() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// One frame per second, 5 s reconnect and cooldown, 16x12 frames.
pub fn create_test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        max_cameras: 20,
        registry_retry: Duration::from_secs(5),
        jpeg_quality: 80,
        worker: WorkerSettings {
            frame_width: 16,
            frame_height: 12,
            frame_interval: Duration::from_secs(1),
            buffer_frames: 2,
            reconnect_delay: Duration::from_secs(5),
            confidence_threshold: 0.4,
            cooldown: Duration::from_secs(5),
            class_map: ClassMap::default(),
        },
    }
}
