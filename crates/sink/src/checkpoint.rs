//! Append-only checkpoint log: one line per inventory file that has been
//! fully processed by the Process-Metabuf Task (key/value writer drained,
//! data file written), fsync'd before the write returns so a crash never
//! loses a just-recorded checkpoint. On resume, every line already present
//! is skipped rather than reprocessed, per §6's resume replay rule.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::SinkError;

pub struct CheckpointLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl CheckpointLog {
    /// Opens (creating if absent) the checkpoint file at `path` for
    /// appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<CheckpointLog, SinkError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Io { path: path.clone(), source })?;
        Ok(CheckpointLog { path, file: Mutex::new(file) })
    }

    /// Reads back the set of file paths already marked complete, for resume.
    pub fn completed(&self) -> Result<HashSet<String>, SinkError> {
        read_completed(&self.path)
    }

    /// Marks `file_path` complete: appends one line and fsyncs before
    /// returning, so completion is durable the instant this call succeeds.
    pub fn mark_complete(&self, file_path: &Path) -> Result<(), SinkError> {
        let mut file = self.file.lock().expect("checkpoint log mutex poisoned");
        let line = format!("{}\n", file_path.display());
        file.write_all(line.as_bytes()).map_err(|source| SinkError::Io { path: self.path.clone(), source })?;
        file.sync_all().map_err(|source| SinkError::Io { path: self.path.clone(), source })?;
        Ok(())
    }
}

fn read_completed(path: &Path) -> Result<HashSet<String>, SinkError> {
    match File::open(path) {
        Ok(file) => BufReader::new(file)
            .lines()
            .map(|line| line.map_err(|source| SinkError::Io { path: path.to_path_buf(), source }))
            .collect(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(source) => Err(SinkError::Io { path: path.to_path_buf(), source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_log_has_no_completed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = CheckpointLog::open(dir.path().join("checkpoint.log")).unwrap();
        assert!(log.completed().unwrap().is_empty());
    }

    #[test]
    fn marked_entries_are_durable_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.log");
        let log = CheckpointLog::open(&path).unwrap();
        log.mark_complete(Path::new("/tmp/inv_0")).unwrap();
        log.mark_complete(Path::new("/tmp/inv_1")).unwrap();
        let completed = log.completed().unwrap();
        assert!(completed.contains("/tmp/inv_0"));
        assert!(completed.contains("/tmp/inv_1"));
    }

    #[test]
    fn reopening_preserves_prior_entries_for_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.log");
        {
            let log = CheckpointLog::open(&path).unwrap();
            log.mark_complete(Path::new("/tmp/inv_0")).unwrap();
        }
        let reopened = CheckpointLog::open(&path).unwrap();
        assert!(reopened.completed().unwrap().contains("/tmp/inv_0"));
        reopened.mark_complete(Path::new("/tmp/inv_1")).unwrap();
        assert_eq!(reopened.completed().unwrap().len(), 2);
    }
}
