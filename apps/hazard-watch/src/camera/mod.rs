use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source type detection based on URI scheme
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceType {
    Rtsp,
    Http,
    Unknown,
}

impl SourceType {
    pub fn from_uri(uri: &str) -> Self {
        let uri = uri.trim();
        match uri.split_once("://") {
            Some((scheme, _)) => match scheme.to_lowercase().as_str() {
                "rtsp" => Self::Rtsp,
                "http" | "https" => Self::Http,
                _ => Self::Unknown,
            },
            None => Self::Unknown,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Registry row as stored in the `cameras` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub id: i64,
    pub name: String,
    pub uri: String,
    /// 1 = enabled, anything else = disabled
    pub status: i64,
    pub install_date: Option<String>,
}

impl CameraRecord {
    pub fn is_enabled(&self) -> bool {
        self.status == 1
    }
}

/// One camera feed as seen by a worker. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraSource {
    pub id: i64,
    pub name: String,
    pub uri: String,
    pub enabled: bool,
}

impl CameraSource {
    pub fn source_type(&self) -> SourceType {
        SourceType::from_uri(&self.uri)
    }

    /// Key used to collapse duplicate registry rows.
    pub fn normalized_uri(&self) -> String {
        normalize_uri(&self.uri)
    }
}

impl From<CameraRecord> for CameraSource {
    fn from(record: CameraRecord) -> Self {
        let enabled = record.is_enabled();
        Self {
            id: record.id,
            name: record.name.trim().to_string(),
            uri: record.uri.trim().to_string(),
            enabled,
        }
    }
}

/// Trimmed, lowercased, without trailing slashes.
pub fn normalize_uri(uri: &str) -> String {
    uri.trim().trim_end_matches('/').to_lowercase()
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct RegistryError(pub String);

/// Read side of the camera store, consumed once at startup.
#[async_trait]
pub trait CameraRegistry: Send + Sync {
    async fn load_cameras(&self) -> Result<Vec<CameraRecord>, RegistryError>;
}

/// Fixed camera list, used when the set comes from somewhere other than the
/// store (and by tests).
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    records: Vec<CameraRecord>,
}

impl StaticRegistry {
    pub fn new(records: Vec<CameraRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl CameraRegistry for StaticRegistry {
    async fn load_cameras(&self) -> Result<Vec<CameraRecord>, RegistryError> {
        Ok(self.records.clone())
    }
}
