//! Rotating sink for completed data records. Unlike [`crate::InventorySink`]
//! this never needs a mid-buffer split: the Key/Value Writer only ever
//! hands it one whole record at a time, so rotation is decided before the
//! write, not carved out of it.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use cdump_core::McData;

use crate::SinkError;

pub struct DataFileSink {
    prefix: PathBuf,
    max_file_size: u64,
    next_index: u64,
    current: File,
    current_path: PathBuf,
    bytes_written: u64,
}

impl DataFileSink {
    pub fn create(prefix: impl Into<PathBuf>, max_file_size: u64) -> Result<DataFileSink, SinkError> {
        let prefix = prefix.into();
        let current_path = file_path(&prefix, 0);
        let current = File::create(&current_path).map_err(|source| SinkError::Io { path: current_path.clone(), source })?;
        Ok(DataFileSink { prefix, max_file_size, next_index: 1, current, current_path, bytes_written: 0 })
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    /// Writes one completed record, rotating first if it would not fit in
    /// the current file. A record larger than `max_file_size` on its own is
    /// still written whole to an otherwise-empty file rather than dropped.
    pub fn write_record(&mut self, record: &McData) -> Result<Option<PathBuf>, SinkError> {
        let bytes = record.to_record_bytes();
        let mut rotated = None;
        if self.bytes_written > 0 && self.bytes_written + bytes.len() as u64 > self.max_file_size {
            rotated = Some(self.rotate()?);
        }
        self.current
            .write_all(&bytes)
            .map_err(|source| SinkError::Io { path: self.current_path.clone(), source })?;
        self.bytes_written += bytes.len() as u64;
        Ok(rotated)
    }

    fn rotate(&mut self) -> Result<PathBuf, SinkError> {
        self.current.flush().map_err(|source| SinkError::Io { path: self.current_path.clone(), source })?;
        let closed = self.current_path.clone();
        let next_path = file_path(&self.prefix, self.next_index);
        self.current = File::create(&next_path).map_err(|source| SinkError::Io { path: next_path.clone(), source })?;
        self.current_path = next_path;
        self.next_index += 1;
        self.bytes_written = 0;
        Ok(closed)
    }

    pub fn finish(mut self) -> Result<PathBuf, SinkError> {
        self.current.flush().map_err(|source| SinkError::Io { path: self.current_path.clone(), source })?;
        Ok(self.current_path)
    }
}

fn file_path(prefix: &Path, index: u64) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(index.to_string());
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read(path: &Path) -> Vec<u8> {
        let mut buf = Vec::new();
        File::open(path).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    fn record(key: &str, value: &[u8]) -> McData {
        McData { key: key.into(), expiry: 0, flags: 0, size: value.len() as u64, value: value.to_vec(), complete: true }
    }

    #[test]
    fn small_records_stay_in_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("data_");
        let mut sink = DataFileSink::create(&prefix, 1024).unwrap();
        assert!(sink.write_record(&record("a", b"1")).unwrap().is_none());
        assert!(sink.write_record(&record("b", b"2")).unwrap().is_none());
        let path = sink.finish().unwrap();
        assert_eq!(read(&path), b"key=a exp=0 flags=0 size=1 value=1\nkey=b exp=0 flags=0 size=1 value=2\n");
    }

    #[test]
    fn rotates_before_a_record_that_would_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("data_");
        let rec_a = record("a", b"1");
        let limit = rec_a.to_record_bytes().len() as u64;
        let mut sink = DataFileSink::create(&prefix, limit).unwrap();
        assert!(sink.write_record(&rec_a).unwrap().is_none());
        let rotated = sink.write_record(&record("b", b"2")).unwrap();
        assert!(rotated.is_some());
        assert_eq!(read(&rotated.unwrap()), rec_a.to_record_bytes());
        let last = sink.finish().unwrap();
        assert_eq!(read(&last), record("b", b"2").to_record_bytes());
    }

    #[test]
    fn oversized_single_record_is_written_whole() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("data_");
        let mut sink = DataFileSink::create(&prefix, 4).unwrap();
        let big = record("a", &vec![b'x'; 100]);
        assert!(sink.write_record(&big).unwrap().is_none());
        let path = sink.finish().unwrap();
        assert_eq!(read(&path), big.to_record_bytes());
    }
}
