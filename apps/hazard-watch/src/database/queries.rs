// Administrative queries over the camera registry and event store

use super::{CameraRow, Database, DatabaseError, NewCamera, Result, StoredEvent};
use crate::camera::CameraRecord;

pub const DEFAULT_EVENT_LIMIT: i64 = 50;

impl Database {
    /// Every registered camera, enabled or not.
    pub async fn list_cameras(&self) -> Result<Vec<CameraRecord>> {
        let rows = sqlx::query_as::<_, CameraRow>(
            "SELECT id, camera_name, camera_uri, status, install_date FROM cameras ORDER BY id DESC"
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(CameraRecord::from).collect())
    }

    pub async fn create_camera(&self, camera: &NewCamera) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO cameras (camera_name, camera_uri, status, install_date) VALUES (?1, ?2, ?3, ?4)"
        )
        .bind(&camera.name)
        .bind(&camera.uri)
        .bind(camera.status)
        .bind(&camera.install_date)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn update_camera(&self, id: i64, camera: &NewCamera) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cameras
            SET camera_name = ?1, camera_uri = ?2, status = ?3, install_date = ?4
            WHERE id = ?5
            "#
        )
        .bind(&camera.name)
        .bind(&camera.uri)
        .bind(camera.status)
        .bind(&camera.install_date)
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Camera {} not found", id)));
        }
        Ok(())
    }

    pub async fn delete_camera(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM cameras WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Camera {} not found", id)));
        }
        Ok(())
    }

    /// Latest events first, `DEFAULT_EVENT_LIMIT` when no limit is given.
    pub async fn recent_events(&self, limit: Option<i64>) -> Result<Vec<StoredEvent>> {
        let rows = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT id, camera_name, event_type, detected_at
            FROM detection_events
            ORDER BY detected_at DESC, id DESC
            LIMIT ?1
            "#
        )
        .bind(limit.unwrap_or(DEFAULT_EVENT_LIMIT))
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    pub async fn event_frame(&self, id: i64) -> Result<Vec<u8>> {
        sqlx::query_scalar::<_, Vec<u8>>("SELECT capture_frame FROM detection_events WHERE id = ?1")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => DatabaseError::NotFound(format!("Event {} not found", id)),
                _ => e.into(),
            })
    }
}
