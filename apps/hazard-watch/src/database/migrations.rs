use sqlx::SqlitePool;
use super::Result;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Create camera registry and event store",
        sql: r#"
            CREATE TABLE IF NOT EXISTS cameras (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                camera_name TEXT NOT NULL,
                camera_uri TEXT NOT NULL,
                status INTEGER NOT NULL DEFAULT 1,
                install_date TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_cameras_status ON cameras(status);

            CREATE TABLE IF NOT EXISTS detection_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                camera_name TEXT NOT NULL,
                event_type TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                capture_frame BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_detection_events_detected_at ON detection_events(detected_at);
            CREATE INDEX IF NOT EXISTS idx_detection_events_camera ON detection_events(camera_name);
        "#,
    },
];

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migration_history (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )
        "#
    )
    .execute(pool)
    .await?;

    for migration in MIGRATIONS {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM migration_history WHERE version = ?1)"
        )
        .bind(migration.version)
        .fetch_one(pool)
        .await?;

        if exists {
            continue;
        }

        tracing::info!("Applying migration {}: {}", migration.version, migration.description);

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO migration_history (version, description, applied_at) VALUES (?1, ?2, ?3)"
        )
        .bind(migration.version)
        .bind(migration.description)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    }

    Ok(())
}

pub async fn current_version(pool: &SqlitePool) -> Result<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM migration_history")
        .fetch_one(pool)
        .await?;

    Ok(version)
}
