use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::extract::LicenseeRecord;

pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to access sink {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to write sink {path}: {source}")]
    Csv { source: csv::Error, path: PathBuf },
}

/// Append-only record store. The header is written exactly once, when the
/// file is first created; existing rows are never rewritten.
#[derive(Debug)]
pub struct RecordSink {
    path: PathBuf,
}

impl RecordSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `records`, creating the file with a header if absent.
    /// Returns the number of rows written; an empty batch touches nothing.
    pub fn append(&self, records: &[LicenseeRecord]) -> SinkResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let exists = self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SinkError::Io {
                source,
                path: self.path.clone(),
            })?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(!exists)
            .from_writer(file);
        for record in records {
            writer.serialize(record).map_err(|source| SinkError::Csv {
                source,
                path: self.path.clone(),
            })?;
        }
        writer.flush().map_err(|source| SinkError::Io {
            source,
            path: self.path.clone(),
        })?;
        info!(path = %self.path.display(), rows = records.len(), "records appended to sink");
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> LicenseeRecord {
        LicenseeRecord {
            name: name.to_string(),
            nmls_id: "123456".to_string(),
            phone: "(555) 555-0100".to_string(),
            ..LicenseeRecord::default()
        }
    }

    #[test]
    fn first_append_creates_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordSink::new(dir.path().join("licensees.csv"));
        let written = sink.append(&[record("JANE DOE")]).unwrap();
        assert_eq!(written, 1);

        let body = std::fs::read_to_string(sink.path()).unwrap();
        let mut lines = body.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Name,NMLS ID,Phone,Company,Company NMLS ID,Type,Street Address,City,State,Zip Code,Start Date"
        );
        assert!(lines.next().unwrap().starts_with("JANE DOE,123456"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn later_appends_keep_prior_rows_and_skip_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordSink::new(dir.path().join("licensees.csv"));
        sink.append(&[record("JANE DOE")]).unwrap();
        let before = std::fs::read_to_string(sink.path()).unwrap();

        sink.append(&[record("JOHN ROE")]).unwrap();
        let after = std::fs::read_to_string(sink.path()).unwrap();

        assert!(after.starts_with(&before));
        assert_eq!(after.matches("Name,NMLS ID").count(), 1);
        assert_eq!(after.lines().count(), 3);
    }

    #[test]
    fn empty_batch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordSink::new(dir.path().join("licensees.csv"));
        assert_eq!(sink.append(&[]).unwrap(), 0);
        assert!(!sink.path().exists());
    }
}
