use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to access ledger {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("ledger {path} is malformed: {source}")]
    Csv { source: csv::Error, path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Done,
}

impl TaskStatus {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("done") {
            TaskStatus::Done
        } else {
            TaskStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Done => "Done",
        }
    }
}

/// One unit of crawl work: a single search query and its detail pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalCodeTask {
    pub code: String,
    pub status: TaskStatus,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    zip_code: String,
    status: String,
}

/// Persisted postal-code status table. Loaded once at startup, mutated in
/// place, and rewritten in full after every completed postal code so a crash
/// never loses a prior completion.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    tasks: Vec<PostalCodeTask>,
}

impl Ledger {
    /// A missing ledger file is fatal: without it there is no work list.
    pub fn load<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path).map_err(|source| LedgerError::Io {
            source,
            path: path.clone(),
        })?;
        let mut reader = csv::Reader::from_reader(file);

        let mut tasks = Vec::new();
        for row in reader.deserialize::<LedgerRow>() {
            let row = row.map_err(|source| LedgerError::Csv {
                source,
                path: path.clone(),
            })?;
            tasks.push(PostalCodeTask {
                code: row.zip_code,
                status: TaskStatus::parse(&row.status),
            });
        }
        info!(
            path = %path.display(),
            total = tasks.len(),
            pending = tasks.iter().filter(|t| t.status == TaskStatus::Pending).count(),
            "ledger loaded"
        );
        Ok(Self { path, tasks })
    }

    pub fn tasks(&self) -> &[PostalCodeTask] {
        &self.tasks
    }

    /// Codes still to crawl, in ledger-file order.
    pub fn pending_codes(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .map(|task| task.code.clone())
            .collect()
    }

    pub fn counts(&self) -> (usize, usize) {
        let done = self
            .tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Done)
            .count();
        (self.tasks.len() - done, done)
    }

    /// Flip the first pending entry for `code` to done and rewrite the file.
    pub fn mark_done(&mut self, code: &str) -> LedgerResult<()> {
        if let Some(task) = self
            .tasks
            .iter_mut()
            .find(|task| task.code == code && task.status == TaskStatus::Pending)
        {
            task.status = TaskStatus::Done;
        }
        self.save()
    }

    fn save(&self) -> LedgerResult<()> {
        let file = std::fs::File::create(&self.path).map_err(|source| LedgerError::Io {
            source,
            path: self.path.clone(),
        })?;
        let mut writer = csv::Writer::from_writer(file);
        for task in &self.tasks {
            writer
                .serialize(LedgerRow {
                    zip_code: task.code.clone(),
                    status: task.status.as_str().to_string(),
                })
                .map_err(|source| LedgerError::Csv {
                    source,
                    path: self.path.clone(),
                })?;
        }
        writer.flush().map_err(|source| LedgerError::Io {
            source,
            path: self.path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_ledger(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("zip_codes.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_tasks_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ledger(
            dir.path(),
            "zip_code,status\n00501,Pending\n00544,Done\n00601,\n",
        );
        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(
            ledger.pending_codes(),
            vec!["00501".to_string(), "00601".to_string()]
        );
        assert_eq!(ledger.counts(), (2, 1));
    }

    #[test]
    fn unknown_status_text_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ledger(dir.path(), "zip_code,status\n00501,in progress\n");
        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.tasks()[0].status, TaskStatus::Pending);
    }

    #[test]
    fn mark_done_rewrites_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ledger(dir.path(), "zip_code,status\n00501,Pending\n00544,Pending\n");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.mark_done("00501").unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body, "zip_code,status\n00501,Done\n00544,Pending\n");

        let reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.pending_codes(), vec!["00544".to_string()]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Ledger::load(dir.path().join("absent.csv")).is_err());
    }
}
