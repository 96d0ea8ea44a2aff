use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::inference::AcceleratorPreference;

/// Slowest sampling rate accepted, one frame every 1000 s
const MIN_TARGET_FPS: f64 = 0.001;
const MAX_TARGET_FPS: f64 = 120.0;
const MAX_INFERENCE_THREADS: usize = 256;

/// Startup configuration. Resolved once; there is no hot-reload, changing the
/// camera set or any of these values requires a restart.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub detection: DetectionConfig,
    pub stream: StreamConfig,
    pub database: DatabaseConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub max_cameras: usize,
    pub shutdown_timeout_seconds: u64,
    pub status_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub cooldown_seconds: u64,
    pub accelerator: AcceleratorPreference,
    pub input_size: u32,
    pub num_threads: usize,
    /// Model output labels by class index. Labels outside fire/smoke/spill
    /// are ignored by the worker.
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    pub reconnect_delay_seconds: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub target_fps: f64,
    pub buffer_frames: u32,
    pub open_timeout_seconds: u64,
    pub read_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
    pub registry_retry_seconds: u64,
    pub enable_wal: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub jpeg_quality: u8,
    pub alert_endpoint: String,
    pub alert_timeout_ms: u64,
}

// Default implementations
impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            detection: DetectionConfig::default(),
            stream: StreamConfig::default(),
            database: DatabaseConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Hazard Watch".to_string(),
            max_cameras: 20,
            shutdown_timeout_seconds: 10,
            status_interval_seconds: 60,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/hazard.onnx"),
            confidence_threshold: 0.4,
            cooldown_seconds: 5,
            accelerator: AcceleratorPreference::Auto,
            input_size: 640,
            num_threads: 4,
            classes: vec!["fire".to_string(), "smoke".to_string(), "spill".to_string()],
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_seconds: 5,
            frame_width: 640,
            frame_height: 480,
            target_fps: 1.0,
            buffer_frames: 2,
            open_timeout_seconds: 10,
            read_timeout_seconds: 10,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://hazard_watch.db".to_string(),
            max_connections: 5,
            connect_timeout_seconds: 5,
            registry_retry_seconds: 5,
            enable_wal: true,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            alert_endpoint: "127.0.0.1:9000".to_string(),
            alert_timeout_ms: 2000,
        }
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_seconds)
    }

    /// Time budget for one sampler iteration.
    pub fn frame_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.target_fps).unwrap_or(Duration::MAX)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.app.max_cameras == 0 {
            return Err("max_cameras must be greater than 0".to_string());
        }

        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(format!("confidence_threshold must be within 0..=1, got {}", threshold));
        }

        if self.detection.input_size == 0 {
            return Err("detection input_size must be greater than 0".to_string());
        }

        if self.detection.num_threads == 0 || self.detection.num_threads > MAX_INFERENCE_THREADS {
            return Err(format!(
                "detection num_threads must be within 1..={}",
                MAX_INFERENCE_THREADS
            ));
        }

        if self.detection.classes.is_empty() {
            return Err("detection classes cannot be empty".to_string());
        }

        if self.stream.frame_width == 0 || self.stream.frame_height == 0 {
            return Err("frame_width and frame_height must be greater than 0".to_string());
        }

        let fps = self.stream.target_fps;
        if !(MIN_TARGET_FPS..=MAX_TARGET_FPS).contains(&fps) {
            return Err(format!(
                "target_fps must be within {}..={}, got {}",
                MIN_TARGET_FPS, MAX_TARGET_FPS, fps
            ));
        }

        if self.stream.buffer_frames == 0 {
            return Err("buffer_frames must be at least 1".to_string());
        }

        if self.database.url.trim().is_empty() {
            return Err("database url cannot be empty".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("database max_connections must be greater than 0".to_string());
        }

        if self.events.jpeg_quality == 0 || self.events.jpeg_quality > 100 {
            return Err("jpeg_quality must be within 1..=100".to_string());
        }

        if self.events.alert_endpoint.trim().is_empty() {
            return Err("alert_endpoint cannot be empty".to_string());
        }

        Ok(())
    }

    pub async fn from_file(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await
            .map_err(|e| crate::HazardWatchError::ConfigError(
                format!("Failed to read configuration file {:?}: {}", path, e)
            ))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::HazardWatchError::ConfigError(
                format!("Failed to parse configuration file {:?}: {}", path, e)
            ))?;

        config.validate().map_err(crate::HazardWatchError::ConfigError)?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub async fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            info!("Loading configuration from {:?}", path);
            Self::from_file(path).await.map_err(|e| {
                error!("Failed to load configuration: {}", e);
                e
            })
        } else {
            warn!("Configuration file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    /// The detector artifact must exist before any worker is spawned.
    pub fn check_model_artifact(&self) -> crate::Result<()> {
        let path = &self.detection.model_path;
        if !path.is_file() {
            return Err(crate::HazardWatchError::ConfigError(format!(
                "Model not found: {:?}",
                path
            )));
        }
        Ok(())
    }
}
