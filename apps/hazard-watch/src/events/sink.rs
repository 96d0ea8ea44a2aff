use async_trait::async_trait;
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

use super::HazardKind;
use crate::database::Database;
use crate::stream::Frame;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Event store write failed: {0}")]
    Store(String),
}

/// One `detection_events` row before insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub camera_name: String,
    pub kind: HazardKind,
    pub detected_at: DateTime<Local>,
    pub jpeg: Vec<u8>,
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Write one record, returning its row id.
    async fn persist(&self, record: &EventRecord) -> Result<i64, PersistenceError>;
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, PersistenceError> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder.encode_image(frame)?;
    Ok(bytes)
}

/// Sink backed by the SQLite event store.
#[derive(Clone)]
pub struct StoreEventSink {
    db: Database,
}

impl StoreEventSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventSink for StoreEventSink {
    async fn persist(&self, record: &EventRecord) -> Result<i64, PersistenceError> {
        self.db
            .insert_event(record)
            .await
            .map_err(|e| PersistenceError::Store(e.to_string()))
    }
}
