use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Creates the database file and schema. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // File registry: one row per ingested calibration file
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS calibration_files (
            filename TEXT PRIMARY KEY,
            raw_content BLOB NOT NULL,
            content_hash TEXT NOT NULL,
            pandora_id TEXT,
            spectrometer_id TEXT,
            version INTEGER,
            validity_date TEXT,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Parsed key/value rows, replaced per source_file on re-ingest
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS calibration_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            source_file TEXT NOT NULL,
            line INTEGER NOT NULL,
            FOREIGN KEY (source_file) REFERENCES calibration_files(filename)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_key ON calibration_records(key)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_source_file ON calibration_records(source_file)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
