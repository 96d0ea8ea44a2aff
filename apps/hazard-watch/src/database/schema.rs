use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::camera::CameraRecord;

#[derive(Debug, FromRow)]
pub struct CameraRow {
    pub id: i64,
    pub camera_name: String,
    pub camera_uri: String,
    pub status: i64,
    pub install_date: Option<String>,
}

impl From<CameraRow> for CameraRecord {
    fn from(row: CameraRow) -> Self {
        Self {
            id: row.id,
            name: row.camera_name,
            uri: row.camera_uri,
            status: row.status,
            install_date: row.install_date,
        }
    }
}

/// Insert/update payload for the camera admin queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCamera {
    pub name: String,
    pub uri: String,
    pub status: i64,
    pub install_date: Option<String>,
}

/// Event row without its image.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredEvent {
    pub id: i64,
    pub camera_name: String,
    pub event_type: String,
    pub detected_at: NaiveDateTime,
}
