pub mod camera;
pub mod config;
pub mod database;
pub mod events;
pub mod gst_utils;
pub mod inference;
pub mod manager;
pub mod recovery;
pub mod service;
pub mod stream;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use manager::{Orchestrator, StopSignal, StopTrigger};

// Common error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HazardWatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] database::DatabaseError),

    #[error("Detector error: {0}")]
    DetectorError(#[from] inference::DetectorError),

    #[error("Startup aborted by stop signal")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, HazardWatchError>;
