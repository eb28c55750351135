//! Core data models for calibration ingest and retrieval.
//!
//! A [`CalibrationFile`] is the source of truth for raw content; the
//! [`CalibrationRecord`]s parsed from it are derived data and are replaced
//! wholesale whenever the file is ingested again.

use serde::Serialize;

/// One key/value pair parsed from a calibration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibrationRecord {
    pub key: String,
    pub value: String,
    pub source_file: String,
    /// 1-based line number within `source_file`.
    pub line: i64,
}

/// Instrument metadata decoded from a Pandora-style filename,
/// e.g. `Pandora101s1_CF_v5d20230101.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub pandora_id: String,
    pub spectrometer_id: String,
    pub version: i64,
    pub validity_date: String,
}

/// A calibration file as discovered on disk at ingest time.
#[derive(Debug, Clone)]
pub struct CalibrationFile {
    pub filename: String,
    pub raw_content: Vec<u8>,
    pub content_hash: String,
    pub metadata: Option<FileMetadata>,
}

/// Registry entry for an ingested file, as returned by file listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub filename: String,
    #[serde(flatten)]
    pub metadata: Option<FileMetadata>,
    pub record_count: i64,
    pub content_hash: String,
    pub ingested_at: i64,
}

/// The part of a record a query caller sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordValue {
    pub value: String,
    pub source_file: String,
}

impl From<CalibrationRecord> for RecordValue {
    fn from(record: CalibrationRecord) -> Self {
        Self {
            value: record.value,
            source_file: record.source_file,
        }
    }
}

/// Per-file failure reported by a directory ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub filename: String,
    pub reason: String,
}

/// Outcome of processing a calibration directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub files_processed: u64,
    pub records_saved: u64,
    pub errors: Vec<FileError>,
}
