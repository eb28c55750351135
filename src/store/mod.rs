//! Storage abstraction for calibration data.
//!
//! The [`CalibrationStore`] trait is the repository seam between the query
//! service and the durable store. [`SqliteStore`] is the production backend;
//! [`InMemoryStore`] backs unit tests and embedded use.
//!
//! Implementations must be `Send + Sync` to be shared across request
//! handlers.

pub mod memory;
pub mod sqlite;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CalibrationFile, CalibrationRecord, FileSummary};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract repository for calibration files and their parsed records.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save_all`](CalibrationStore::save_all) | Register a file and replace its records atomically |
/// | [`find_by_keys`](CalibrationStore::find_by_keys) | Exact-match lookup of records by key |
/// | [`list_files`](CalibrationStore::list_files) | Registry listing |
/// | [`get_file_content`](CalibrationStore::get_file_content) | Raw file bytes |
/// | [`ping`](CalibrationStore::ping) | Connectivity check |
#[async_trait]
pub trait CalibrationStore: Send + Sync {
    /// Upserts `file` and replaces every record previously stored for
    /// `file.filename` with `records`, all in one transaction.
    ///
    /// Returns the number of records persisted.
    async fn save_all(&self, file: &CalibrationFile, records: &[CalibrationRecord]) -> Result<u64>;

    /// Looks up records for each key. Every requested key is present in the
    /// result; unknown keys map to an empty vector. Records are ordered by
    /// source file, then line.
    async fn find_by_keys(
        &self,
        keys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Vec<CalibrationRecord>>>;

    /// Lists registered files ordered by filename.
    async fn list_files(&self) -> Result<Vec<FileSummary>>;

    /// Returns the raw bytes of a registered file, or
    /// [`CalibrationError::NotFound`](crate::error::CalibrationError::NotFound).
    async fn get_file_content(&self, filename: &str) -> Result<Vec<u8>>;

    async fn ping(&self) -> Result<()>;
}
