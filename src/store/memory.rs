//! In-memory [`CalibrationStore`] implementation for tests and embedding.
//!
//! Files and records live behind a single `tokio::sync::RwLock`, so a
//! `save_all` is observed either entirely or not at all.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{CalibrationError, Result};
use crate::models::{CalibrationFile, CalibrationRecord, FileSummary};

use super::CalibrationStore;

struct StoredFile {
    file: CalibrationFile,
    ingested_at: i64,
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, StoredFile>,
    records: Vec<CalibrationRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalibrationStore for InMemoryStore {
    async fn save_all(&self, file: &CalibrationFile, records: &[CalibrationRecord]) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.files.insert(
            file.filename.clone(),
            StoredFile {
                file: file.clone(),
                ingested_at: Utc::now().timestamp(),
            },
        );
        inner.records.retain(|r| r.source_file != file.filename);
        inner.records.extend(records.iter().cloned());
        Ok(records.len() as u64)
    }

    async fn find_by_keys(
        &self,
        keys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Vec<CalibrationRecord>>> {
        let inner = self.inner.read().await;
        let mut found: BTreeMap<String, Vec<CalibrationRecord>> =
            keys.iter().map(|k| (k.clone(), Vec::new())).collect();
        for record in &inner.records {
            if let Some(bucket) = found.get_mut(&record.key) {
                bucket.push(record.clone());
            }
        }
        for bucket in found.values_mut() {
            bucket.sort_by(|a, b| (&a.source_file, a.line).cmp(&(&b.source_file, b.line)));
        }
        Ok(found)
    }

    async fn list_files(&self) -> Result<Vec<FileSummary>> {
        let inner = self.inner.read().await;
        Ok(inner
            .files
            .values()
            .map(|stored| FileSummary {
                filename: stored.file.filename.clone(),
                metadata: stored.file.metadata.clone(),
                record_count: inner
                    .records
                    .iter()
                    .filter(|r| r.source_file == stored.file.filename)
                    .count() as i64,
                content_hash: stored.file.content_hash.clone(),
                ingested_at: stored.ingested_at,
            })
            .collect())
    }

    async fn get_file_content(&self, filename: &str) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;
        inner
            .files
            .get(filename)
            .map(|stored| stored.file.raw_content.clone())
            .ok_or_else(|| CalibrationError::NotFound(format!("calibration file {}", filename)))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
