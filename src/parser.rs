//! Lenient line parser for calibration files.
//!
//! Calibration formats drift between instrument firmware versions, so the
//! parser never rejects content. Each line is offered to a list of
//! [`LinePattern`]s; among those yielding a non-empty key, the one whose
//! delimiter appears earliest wins (list order breaks ties) and the line
//! becomes a [`CalibrationRecord`]. Blank lines, comment lines, and
//! lines no pattern recognizes are skipped.
//!
//! ```text
//! # comment                        -> skipped
//! Instrument type -> Pandora       -> ("Instrument type", "Pandora")
//! FOO: 1                           -> ("FOO", "1")
//! gain = 2.5                       -> ("gain", "2.5")
//! free text without delimiter      -> skipped
//! ```

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{CalibrationError, Result};
use crate::models::{CalibrationFile, CalibrationRecord, FileMetadata};

/// A recognized `key <delimiter> value` line shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinePattern {
    /// `key -> value`, the native Pandora calibration format.
    Arrow,
    /// `key: value`
    Colon,
    /// `key = value`
    Equals,
    /// `key<TAB>value`
    Tab,
}

impl LinePattern {
    pub const DEFAULT_ORDER: [LinePattern; 4] = [
        LinePattern::Arrow,
        LinePattern::Colon,
        LinePattern::Equals,
        LinePattern::Tab,
    ];

    fn delimiter(self) -> &'static str {
        match self {
            LinePattern::Arrow => "->",
            LinePattern::Colon => ":",
            LinePattern::Equals => "=",
            LinePattern::Tab => "\t",
        }
    }

    /// Splits `line` at the first occurrence of this pattern's delimiter.
    ///
    /// Returns `None` when the delimiter is absent or the key is blank.
    pub fn split(self, line: &str) -> Option<(&str, &str)> {
        self.split_at_first(line).map(|(_, key, value)| (key, value))
    }

    /// Like [`split`](Self::split), also returning the delimiter's byte offset.
    fn split_at_first(self, line: &str) -> Option<(usize, &str, &str)> {
        let delimiter = self.delimiter();
        let pos = line.find(delimiter)?;
        let key = line[..pos].trim();
        if key.is_empty() {
            return None;
        }
        Some((pos, key, line[pos + delimiter.len()..].trim()))
    }
}

pub const DEFAULT_COMMENT_MARKERS: [&str; 4] = ["#", "%", ";", "//"];

#[derive(Debug, Clone)]
pub struct Parser {
    patterns: Vec<LinePattern>,
    comment_markers: Vec<String>,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            patterns: LinePattern::DEFAULT_ORDER.to_vec(),
            comment_markers: DEFAULT_COMMENT_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl Parser {
    pub fn new(patterns: Vec<LinePattern>, comment_markers: Vec<String>) -> Self {
        Self {
            patterns,
            comment_markers,
        }
    }

    fn is_comment(&self, trimmed: &str) -> bool {
        self.comment_markers
            .iter()
            .any(|marker| trimmed.starts_with(marker.as_str()))
    }

    /// The delimiter occurring earliest in the line wins; pattern order
    /// only breaks ties.
    fn match_line<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        self.patterns
            .iter()
            .filter_map(|pattern| pattern.split_at_first(line))
            .min_by_key(|(pos, _, _)| *pos)
            .map(|(_, key, value)| (key, value))
    }

    /// Parses file content into records attributed to `filename`.
    pub fn parse(&self, content: &str, filename: &str) -> Vec<CalibrationRecord> {
        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || self.is_comment(trimmed) {
                continue;
            }
            if let Some((key, value)) = self.match_line(trimmed) {
                records.push(CalibrationRecord {
                    key: key.to_string(),
                    value: value.to_string(),
                    source_file: filename.to_string(),
                    line: idx as i64 + 1,
                });
            }
        }
        records
    }

    /// Reads `path` and parses it, keeping the raw bytes for verbatim
    /// retrieval.
    ///
    /// Invalid UTF-8 is decoded lossily for parsing only.
    pub fn parse_file(
        &self,
        path: &Path,
        filename: &str,
    ) -> Result<(CalibrationFile, Vec<CalibrationRecord>)> {
        let raw_content = std::fs::read(path).map_err(|source| CalibrationError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let records = self.parse(&String::from_utf8_lossy(&raw_content), filename);

        let mut hasher = Sha256::new();
        hasher.update(&raw_content);
        let content_hash = format!("{:x}", hasher.finalize());

        let file = CalibrationFile {
            filename: filename.to_string(),
            metadata: parse_filename(filename),
            raw_content,
            content_hash,
        };
        Ok((file, records))
    }
}

/// Parses with the default pattern order and comment markers.
pub fn parse(content: &str, filename: &str) -> Vec<CalibrationRecord> {
    Parser::default().parse(content, filename)
}

fn filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Pandora(\d+)s(\d+)_CF_v(\d+)d(\d{8})\.txt$").expect("valid filename regex")
    })
}

/// Decodes `Pandora<id>s<spectrometer>_CF_v<version>d<YYYYMMDD>.txt`.
///
/// Only the final path component is inspected, so files found by a
/// recursive scan decode the same way.
pub fn parse_filename(filename: &str) -> Option<FileMetadata> {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let caps = filename_regex().captures(base)?;
    Some(FileMetadata {
        pandora_id: caps[1].to_string(),
        spectrometer_id: caps[2].to_string(),
        version: caps[3].parse().ok()?,
        validity_date: caps[4].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(records: &[CalibrationRecord]) -> Vec<(&str, &str)> {
        records
            .iter()
            .map(|r| (r.key.as_str(), r.value.as_str()))
            .collect()
    }

    #[test]
    fn test_colon_lines_one_record_each_in_order() {
        let records = parse("FOO: 1\nBAR: 2\nBAZ: three\n", "A.txt");
        assert_eq!(pairs(&records), vec![("FOO", "1"), ("BAR", "2"), ("BAZ", "three")]);
        assert!(records.iter().all(|r| r.source_file == "A.txt"));
        assert_eq!(records[2].line, 3);
    }

    #[test]
    fn test_comments_and_blanks_do_not_change_records() {
        let plain = "FOO: 1\nBAR: 2\n";
        let noisy = "# header\n\nFOO: 1   \n   \n% note\n; other\n// trailing\nBAR: 2\n\n";
        assert_eq!(pairs(&parse(plain, "x")), pairs(&parse(noisy, "x")));
    }

    #[test]
    fn test_earlier_arrow_wins_over_later_colon() {
        let records = parse("Start time -> 12:30:00\n", "p.txt");
        assert_eq!(pairs(&records), vec![("Start time", "12:30:00")]);
    }

    #[test]
    fn test_colon_key_with_arrow_in_value() {
        let records = parse("Range: 1->5\nWavelength map: pixel->nm\n", "A.txt");
        assert_eq!(
            pairs(&records),
            vec![("Range", "1->5"), ("Wavelength map", "pixel->nm")]
        );
    }

    #[test]
    fn test_equals_key_with_colon_in_value() {
        let records = parse("url = http://host:80\n", "p.txt");
        assert_eq!(pairs(&records), vec![("url", "http://host:80")]);
    }

    #[test]
    fn test_colon_splits_at_first_delimiter() {
        let records = parse("Time: 12:30\n", "p.txt");
        assert_eq!(pairs(&records), vec![("Time", "12:30")]);
    }

    #[test]
    fn test_equals_and_tab_patterns() {
        let records = parse("gain = 2.5\noffset\t-0.1\n", "p.txt");
        assert_eq!(pairs(&records), vec![("gain", "2.5"), ("offset", "-0.1")]);
    }

    #[test]
    fn test_empty_value_kept() {
        let records = parse("EMPTY:\n", "p.txt");
        assert_eq!(pairs(&records), vec![("EMPTY", "")]);
    }

    #[test]
    fn test_unrecognized_and_keyless_lines_skipped() {
        let records = parse("just some text\n: no key\n-> nothing\nOK: yes\n", "p.txt");
        assert_eq!(pairs(&records), vec![("OK", "yes")]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let records = parse("FOO: 1\r\nBAR: 2\r\n", "p.txt");
        assert_eq!(pairs(&records), vec![("FOO", "1"), ("BAR", "2")]);
    }

    #[test]
    fn test_custom_pattern_order() {
        let parser = Parser::new(vec![LinePattern::Equals], vec!["#".to_string()]);
        let records = parser.parse("a = b\nc: d\n", "p.txt");
        assert_eq!(pairs(&records), vec![("a", "b")]);
    }

    #[test]
    fn test_parse_file_keeps_raw_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("raw.txt");
        let bytes = b"FOO: \xff1\nBAR: 2\n".to_vec();
        std::fs::write(&path, &bytes).unwrap();

        let (file, records) = Parser::default().parse_file(&path, "raw.txt").unwrap();
        assert_eq!(file.raw_content, bytes);
        assert_eq!(file.content_hash.len(), 64);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_parse_file_missing_is_file_read_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = Parser::default()
            .parse_file(&tmp.path().join("missing.txt"), "missing.txt")
            .unwrap_err();
        assert!(matches!(err, CalibrationError::FileRead { .. }));
    }

    #[test]
    fn test_parse_filename_pandora() {
        let meta = parse_filename("Pandora101s1_CF_v5d20230115.txt").unwrap();
        assert_eq!(meta.pandora_id, "101");
        assert_eq!(meta.spectrometer_id, "1");
        assert_eq!(meta.version, 5);
        assert_eq!(meta.validity_date, "20230115");

        assert!(parse_filename("sub/Pandora2s2_CF_v1d20200101.txt").is_some());
        assert!(parse_filename("A.txt").is_none());
        assert!(parse_filename("Pandora1s1_CF_v1d2020.txt").is_none());
    }
}
