//! SQLite-backed [`CalibrationStore`] implementation.
//!
//! Two tables: `calibration_files` (registry + raw bytes) and
//! `calibration_records` (parsed rows). See [`crate::migrate`].

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::{CalibrationError, Result};
use crate::migrate;
use crate::models::{CalibrationFile, CalibrationRecord, FileMetadata, FileSummary};

use super::CalibrationStore;

/// Keeps `IN (...)` lists under SQLite's bound-parameter limit.
const KEY_BATCH: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to the configured database and ensures the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl CalibrationStore for SqliteStore {
    async fn save_all(&self, file: &CalibrationFile, records: &[CalibrationRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let meta = file.metadata.as_ref();

        sqlx::query(
            r#"
            INSERT INTO calibration_files (filename, raw_content, content_hash, pandora_id,
                                           spectrometer_id, version, validity_date, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                raw_content = excluded.raw_content,
                content_hash = excluded.content_hash,
                pandora_id = excluded.pandora_id,
                spectrometer_id = excluded.spectrometer_id,
                version = excluded.version,
                validity_date = excluded.validity_date,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&file.filename)
        .bind(&file.raw_content)
        .bind(&file.content_hash)
        .bind(meta.map(|m| m.pandora_id.as_str()))
        .bind(meta.map(|m| m.spectrometer_id.as_str()))
        .bind(meta.map(|m| m.version))
        .bind(meta.map(|m| m.validity_date.as_str()))
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM calibration_records WHERE source_file = ?")
            .bind(&file.filename)
            .execute(&mut *tx)
            .await?;

        for record in records {
            sqlx::query(
                "INSERT INTO calibration_records (key, value, source_file, line) VALUES (?, ?, ?, ?)",
            )
            .bind(&record.key)
            .bind(&record.value)
            .bind(&record.source_file)
            .bind(record.line)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len() as u64)
    }

    async fn find_by_keys(
        &self,
        keys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Vec<CalibrationRecord>>> {
        let mut found: BTreeMap<String, Vec<CalibrationRecord>> =
            keys.iter().map(|k| (k.clone(), Vec::new())).collect();
        let keys: Vec<&String> = keys.iter().collect();

        for batch in keys.chunks(KEY_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT key, value, source_file, line FROM calibration_records \
                 WHERE key IN ({}) ORDER BY source_file ASC, line ASC",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for key in batch {
                query = query.bind(key.as_str());
            }
            let rows = query.fetch_all(&self.pool).await?;

            for row in rows {
                let record = CalibrationRecord {
                    key: row.get("key"),
                    value: row.get("value"),
                    source_file: row.get("source_file"),
                    line: row.get("line"),
                };
                if let Some(bucket) = found.get_mut(&record.key) {
                    bucket.push(record);
                }
            }
        }

        Ok(found)
    }

    async fn list_files(&self) -> Result<Vec<FileSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT f.filename, f.content_hash, f.pandora_id, f.spectrometer_id, f.version,
                   f.validity_date, f.ingested_at,
                   (SELECT COUNT(*) FROM calibration_records r WHERE r.source_file = f.filename)
                       AS record_count
            FROM calibration_files f
            ORDER BY f.filename ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let pandora_id: Option<String> = row.get("pandora_id");
                let spectrometer_id: Option<String> = row.get("spectrometer_id");
                let version: Option<i64> = row.get("version");
                let validity_date: Option<String> = row.get("validity_date");
                let metadata = match (pandora_id, spectrometer_id, version, validity_date) {
                    (Some(pandora_id), Some(spectrometer_id), Some(version), Some(validity_date)) => {
                        Some(FileMetadata {
                            pandora_id,
                            spectrometer_id,
                            version,
                            validity_date,
                        })
                    }
                    _ => None,
                };
                FileSummary {
                    filename: row.get("filename"),
                    metadata,
                    record_count: row.get("record_count"),
                    content_hash: row.get("content_hash"),
                    ingested_at: row.get("ingested_at"),
                }
            })
            .collect())
    }

    async fn get_file_content(&self, filename: &str) -> Result<Vec<u8>> {
        let content: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT raw_content FROM calibration_files WHERE filename = ?")
                .bind(filename)
                .fetch_optional(&self.pool)
                .await?;

        content.ok_or_else(|| CalibrationError::NotFound(format!("calibration file {}", filename)))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
