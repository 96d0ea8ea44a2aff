use async_trait::async_trait;
use sqlx::{SqlitePool, sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous}};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::camera::{CameraRecord, CameraRegistry, RegistryError};
use crate::config::DatabaseConfig;
use crate::events::sink::EventRecord;

pub mod migrations;
pub mod queries;
pub mod schema;

pub use schema::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Camera registry and event store, one SQLite file.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::create_pool(config).await?;
        let db = Self { pool };

        info!("Running database migrations");
        migrations::run_migrations(&db.pool).await?;
        if let Some(version) = migrations::current_version(&db.pool).await? {
            debug!("Database schema at version {}", version);
        }

        Ok(db)
    }

    pub async fn from_url(url: &str) -> Result<Self> {
        let config = DatabaseConfig {
            url: url.to_string(),
            ..Default::default()
        };
        Self::new(&config).await
    }

    async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
        let filename = config.url.trim_start_matches("sqlite://");
        let options = SqliteConnectOptions::new()
            .filename(filename)
            .create_if_missing(true)
            .journal_mode(if config.enable_wal {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            })
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect_with(options)
            .await?;

        Ok(pool)
    }

    /// Enabled cameras, newest registration first.
    pub async fn enabled_cameras(&self) -> Result<Vec<CameraRecord>> {
        let rows = sqlx::query_as::<_, CameraRow>(
            "SELECT id, camera_name, camera_uri, status, install_date FROM cameras WHERE status = 1 ORDER BY id DESC"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CameraRecord::from).collect())
    }

    pub async fn insert_event(&self, record: &EventRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO detection_events (camera_name, event_type, detected_at, capture_frame)
            VALUES (?1, ?2, ?3, ?4)
            "#
        )
        .bind(&record.camera_name)
        .bind(record.kind.as_str())
        .bind(record.detected_at.naive_local())
        .bind(&record.jpeg)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CameraRegistry for Database {
    async fn load_cameras(&self) -> std::result::Result<Vec<CameraRecord>, RegistryError> {
        self.enabled_cameras()
            .await
            .map_err(|e| RegistryError(e.to_string()))
    }
}
