//! Query service: directory ingest, key lookup, and file retrieval.
//!
//! [`CalibrationService`] owns nothing global. It is built from an explicit
//! [`ServiceSettings`] and a shared [`CalibrationStore`], and every call runs
//! to completion on its own.
//!
//! Ingest isolates failures per file: a file that cannot be read or saved is
//! reported in [`IngestSummary::errors`] and the scan moves on. Each file's
//! records are committed in one transaction, so a failure never leaves a
//! half-ingested file behind.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{CalibrationError, Result};
use crate::models::{FileError, FileSummary, IngestSummary, RecordValue};
use crate::parser::Parser;
use crate::store::CalibrationStore;

/// Everything the service needs from configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub directory: PathBuf,
    pub include_globs: Vec<String>,
    pub recursive: bool,
    pub follow_symlinks: bool,
    pub parser: Parser,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            directory: config.ingest.directory.clone(),
            include_globs: config.ingest.include_globs.clone(),
            recursive: config.ingest.recursive,
            follow_symlinks: config.ingest.follow_symlinks,
            parser: config.parser.build(),
        }
    }

    /// Settings with default globs and parser for `directory`.
    pub fn for_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            include_globs: vec!["*.txt".to_string()],
            recursive: false,
            follow_symlinks: false,
            parser: Parser::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: String,
    pub version: String,
}

pub type QueryResult = BTreeMap<String, Vec<RecordValue>>;

#[derive(Clone)]
pub struct CalibrationService {
    store: Arc<dyn CalibrationStore>,
    settings: Arc<ServiceSettings>,
}

impl CalibrationService {
    pub fn new(store: Arc<dyn CalibrationStore>, settings: ServiceSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Ingests the configured calibration directory.
    pub async fn process_configured_directory(&self) -> Result<IngestSummary> {
        let directory = self.settings.directory.clone();
        self.process_directory(&directory).await
    }

    /// Parses and persists every matching file under `path`.
    ///
    /// Fails as a whole only when the directory itself cannot be read.
    pub async fn process_directory(&self, path: &Path) -> Result<IngestSummary> {
        let (files, scan_errors) = self.scan_directory(path)?;
        info!(directory = %path.display(), files = files.len(), "processing calibration directory");

        let mut summary = IngestSummary {
            errors: scan_errors,
            ..IngestSummary::default()
        };
        for (file_path, filename) in files {
            match self.ingest_file(&file_path, &filename).await {
                Ok(saved) => {
                    debug!(file = %filename, records = saved, "ingested calibration file");
                    summary.files_processed += 1;
                    summary.records_saved += saved;
                }
                Err(e) => {
                    warn!(file = %filename, error = %e, "failed to ingest calibration file");
                    summary.errors.push(FileError {
                        filename,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            files_processed = summary.files_processed,
            records_saved = summary.records_saved,
            errors = summary.errors.len(),
            "calibration directory processed"
        );
        Ok(summary)
    }

    async fn ingest_file(&self, path: &Path, filename: &str) -> Result<u64> {
        let (file, records) = self.settings.parser.parse_file(path, filename)?;
        self.store.save_all(&file, &records).await
    }

    /// Lists matching files as `(path, filename)` pairs sorted by filename,
    /// plus one [`FileError`] per entry the walk could not read.
    fn scan_directory(&self, root: &Path) -> Result<(Vec<(PathBuf, String)>, Vec<FileError>)> {
        let dir_error = |source: std::io::Error| CalibrationError::Directory {
            path: root.to_path_buf(),
            source,
        };

        // Surfaces missing and unreadable directories before walking
        std::fs::read_dir(root).map_err(dir_error)?;

        let include_set = build_globset(&self.settings.include_globs)
            .map_err(|e| CalibrationError::Validation(e.to_string()))?;

        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(self.settings.follow_symlinks);
        if !self.settings.recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        let mut errors = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let filename = e
                        .path()
                        .map(|p| relative_name(root, p))
                        .unwrap_or_else(|| root.display().to_string());
                    warn!(file = %filename, error = %e, "unreadable directory entry");
                    errors.push(FileError {
                        filename,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let filename = relative_name(root, entry.path());
            if !include_set.is_match(&filename) {
                continue;
            }
            files.push((entry.path().to_path_buf(), filename));
        }

        // Sort for deterministic ordering
        files.sort_by(|a, b| a.1.cmp(&b.1));
        errors.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok((files, errors))
    }

    /// Resolves keys to their stored values. Duplicate keys collapse;
    /// an empty key list yields an empty map.
    pub async fn query(&self, keys: &[String]) -> Result<QueryResult> {
        let unique: BTreeSet<String> = keys.iter().cloned().collect();
        if unique.is_empty() {
            return Ok(BTreeMap::new());
        }

        let found = self.store.find_by_keys(&unique).await?;
        Ok(found
            .into_iter()
            .map(|(key, records)| (key, records.into_iter().map(RecordValue::from).collect()))
            .collect())
    }

    /// Liveness plus a store connectivity check.
    pub async fn health(&self) -> Result<Health> {
        self.store.ping().await?;
        Ok(Health {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    pub async fn list_calibration_files(&self) -> Result<Vec<FileSummary>> {
        self.store.list_files().await
    }

    pub async fn get_content(&self, filename: &str) -> Result<Vec<u8>> {
        if filename.trim().is_empty() {
            return Err(CalibrationError::Validation(
                "filename must not be empty".to_string(),
            ));
        }
        self.store.get_file_content(filename).await
    }
}

/// `path` relative to `root`, `/`-separated.
fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> std::result::Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CalibrationFile, CalibrationRecord};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    fn service_for(dir: &Path) -> CalibrationService {
        CalibrationService::new(
            Arc::new(InMemoryStore::new()),
            ServiceSettings::for_directory(dir),
        )
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_end_to_end_single_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("A.txt"), "FOO: 1\nBAR: 2\n").unwrap();
        let service = service_for(tmp.path());

        let summary = service.process_configured_directory().await.unwrap();
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.records_saved, 2);
        assert!(summary.errors.is_empty());

        let result = service.query(&keys(&["FOO"])).await.unwrap();
        assert_eq!(
            result["FOO"],
            vec![RecordValue {
                value: "1".to_string(),
                source_file: "A.txt".to_string(),
            }]
        );
        assert_eq!(result.len(), 1);

        let content = service.get_content("A.txt").await.unwrap();
        assert_eq!(content, b"FOO: 1\nBAR: 2\n");

        let files = service.list_calibration_files().await.unwrap();
        assert!(files.iter().any(|f| f.filename == "A.txt"));
    }

    #[tokio::test]
    async fn test_query_empty_and_duplicates() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("A.txt"), "X: 1\n").unwrap();
        let service = service_for(tmp.path());
        service.process_configured_directory().await.unwrap();

        assert!(service.query(&[]).await.unwrap().is_empty());
        assert_eq!(
            service.query(&keys(&["X", "X"])).await.unwrap(),
            service.query(&keys(&["X"])).await.unwrap()
        );
        assert!(service.query(&keys(&["MISSING"])).await.unwrap()["MISSING"].is_empty());
    }

    #[tokio::test]
    async fn test_reprocess_does_not_duplicate() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("A.txt"), "FOO: 1\n").unwrap();
        fs::write(tmp.path().join("B.txt"), "FOO: 2\n").unwrap();
        let service = service_for(tmp.path());

        service.process_configured_directory().await.unwrap();
        let first = service.query(&keys(&["FOO"])).await.unwrap();
        service.process_configured_directory().await.unwrap();
        let second = service.query(&keys(&["FOO"])).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second["FOO"].len(), 2);
    }

    #[tokio::test]
    async fn test_reprocess_picks_up_edits() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("A.txt");
        fs::write(&path, "FOO: 1\nOLD: x\n").unwrap();
        let service = service_for(tmp.path());
        service.process_configured_directory().await.unwrap();

        fs::write(&path, "FOO: 9\n").unwrap();
        service.process_configured_directory().await.unwrap();

        let result = service.query(&keys(&["FOO", "OLD"])).await.unwrap();
        assert_eq!(result["FOO"][0].value, "9");
        assert!(result["OLD"].is_empty());
    }

    #[tokio::test]
    async fn test_only_included_files_non_recursive() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("A.txt"), "FOO: 1\n").unwrap();
        fs::write(tmp.path().join("notes.md"), "FOO: 2\n").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested/C.txt"), "FOO: 3\n").unwrap();
        let service = service_for(tmp.path());

        let summary = service.process_configured_directory().await.unwrap();
        assert_eq!(summary.files_processed, 1);
    }

    #[tokio::test]
    async fn test_recursive_scan_uses_relative_names() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested/C.txt"), "FOO: 3\n").unwrap();
        let mut settings = ServiceSettings::for_directory(tmp.path());
        settings.recursive = true;
        settings.include_globs = vec!["**/*.txt".to_string()];
        let service = CalibrationService::new(Arc::new(InMemoryStore::new()), settings);

        service.process_configured_directory().await.unwrap();
        let result = service.query(&keys(&["FOO"])).await.unwrap();
        assert_eq!(result["FOO"][0].source_file, "nested/C.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_entry_reported_in_errors() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("A.txt"), "FOO: 1\n").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone.txt"), tmp.path().join("dangling.txt"))
            .unwrap();
        let mut settings = ServiceSettings::for_directory(tmp.path());
        settings.follow_symlinks = true;
        let service = CalibrationService::new(Arc::new(InMemoryStore::new()), settings);

        let summary = service.process_configured_directory().await.unwrap();
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.records_saved, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].filename, "dangling.txt");
        assert!(!summary.errors[0].reason.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_error() {
        let tmp = TempDir::new().unwrap();
        let service = service_for(&tmp.path().join("absent"));
        let err = service.process_configured_directory().await.unwrap_err();
        assert!(matches!(err, CalibrationError::Directory { .. }));
    }

    #[tokio::test]
    async fn test_get_content_validation_and_not_found() {
        let tmp = TempDir::new().unwrap();
        let service = service_for(tmp.path());
        assert!(matches!(
            service.get_content("  ").await.unwrap_err(),
            CalibrationError::Validation(_)
        ));
        assert!(matches!(
            service.get_content("nope.txt").await.unwrap_err(),
            CalibrationError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_health_reports_ok() {
        let tmp = TempDir::new().unwrap();
        let health = service_for(tmp.path()).health().await.unwrap();
        assert_eq!(health.status, "ok");
    }

    /// Rejects saves for one filename, delegating everything else.
    struct FailingStore {
        inner: InMemoryStore,
        reject: String,
    }

    #[async_trait]
    impl CalibrationStore for FailingStore {
        async fn save_all(
            &self,
            file: &CalibrationFile,
            records: &[CalibrationRecord],
        ) -> Result<u64> {
            if file.filename == self.reject {
                return Err(CalibrationError::Storage(sqlx::Error::PoolClosed));
            }
            self.inner.save_all(file, records).await
        }

        async fn find_by_keys(
            &self,
            keys: &BTreeSet<String>,
        ) -> Result<BTreeMap<String, Vec<CalibrationRecord>>> {
            self.inner.find_by_keys(keys).await
        }

        async fn list_files(&self) -> Result<Vec<FileSummary>> {
            self.inner.list_files().await
        }

        async fn get_file_content(&self, filename: &str) -> Result<Vec<u8>> {
            self.inner.get_file_content(filename).await
        }

        async fn ping(&self) -> Result<()> {
            Err(CalibrationError::Storage(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn test_one_failing_file_does_not_abort_the_rest() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("A.txt"), "FOO: 1\n").unwrap();
        fs::write(tmp.path().join("B.txt"), "FOO: 2\n").unwrap();
        fs::write(tmp.path().join("C.txt"), "FOO: 3\n").unwrap();
        let store = FailingStore {
            inner: InMemoryStore::new(),
            reject: "B.txt".to_string(),
        };
        let service =
            CalibrationService::new(Arc::new(store), ServiceSettings::for_directory(tmp.path()));

        let summary = service.process_configured_directory().await.unwrap();
        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.records_saved, 2);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].filename, "B.txt");

        let files = service.list_calibration_files().await.unwrap();
        assert!(files.iter().all(|f| f.filename != "B.txt"));

        assert!(service.health().await.is_err());
    }
}
