//! Append-only, date-partitioned line archive of raw observations.
//!
//! Layout: `<root>/raw/<YYYY>/<YYYY-MM>/<YYYY-MM-DD>.txt`, derived from the
//! observation's own timestamp. Existing lines are never rewritten.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::SinkError;
use crate::models::ArchiveRecord;

// ---

const RAW_DIR: &str = "raw";

/// Line archive rooted at a data directory.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    root: PathBuf,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Partition file for an observation taken at `at`.
    pub fn partition(&self, at: DateTime<Utc>) -> PathBuf {
        self.root
            .join(RAW_DIR)
            .join(at.format("%Y").to_string())
            .join(at.format("%Y-%m").to_string())
            .join(at.format("%Y-%m-%d.txt").to_string())
    }

    /// Append one record as a line to its partition file.
    pub fn append(&self, record: &ArchiveRecord) -> Result<PathBuf, SinkError> {
        // ---
        let path = self.partition(record.idx);
        append_line(&path, &record.to_line())?;
        debug!(path = %path.display(), "archive line appended");
        Ok(path)
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), SinkError> {
    // ---
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| SinkError::file(dir, e))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SinkError::file(path, e))?;

    writeln!(file, "{line}").map_err(|e| SinkError::file(path, e))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(at: DateTime<Utc>, temp: f64) -> ArchiveRecord {
        // ---
        ArchiveRecord {
            idx: at,
            delay: 1,
            hum_in: Some(54),
            temp_in: Some(17.5),
            hum_out: Some(97),
            temp_out: Some(temp),
            abs_pressure: Some(1023.8),
            wind_ave: Some(8),
            wind_gust: Some(18),
            wind_dir: Some(227),
            rain: 0.7,
            status: 0,
            illuminance: Some(23.1),
            uv: Some(0),
        }
    }

    #[test]
    fn test_partition_paths() {
        // ---
        let writer = ArchiveWriter::new("/data");
        let at = Utc.with_ymd_and_hms(2024, 12, 24, 14, 1, 20).unwrap();

        assert_eq!(
            writer.partition(at),
            PathBuf::from("/data/raw/2024/2024-12/2024-12-24.txt")
        );
    }

    #[test]
    fn test_appends_never_rewrite() {
        // ---
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path());
        let at = Utc.with_ymd_and_hms(2024, 12, 24, 14, 1, 20).unwrap();

        let first = writer.append(&record(at, 6.4)).unwrap();
        let second = writer
            .append(&record(at + chrono::Duration::minutes(1), 6.5))
            .unwrap();
        assert_eq!(first, second);

        let contents = fs::read_to_string(&first).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("2024-12-24 14:01:20,1,54,17.5,97,6.4,"));
        assert!(lines[1].starts_with("2024-12-24 14:02:20,"));
    }

    #[test]
    fn test_partition_follows_observation_not_wall_clock() {
        // ---
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::new(dir.path());
        let new_year = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 30).unwrap();

        let a = writer.append(&record(new_year, 1.0)).unwrap();
        let b = writer
            .append(&record(new_year + chrono::Duration::minutes(1), 1.0))
            .unwrap();

        assert!(a.ends_with("2024/2024-12/2024-12-31.txt"));
        assert!(b.ends_with("2025/2025-01/2025-01-01.txt"));
    }
}
