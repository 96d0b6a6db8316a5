//! Rotating sink for the raw metadump byte stream.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::SinkError;

const KEY_MARKER: &[u8] = b"key=";

/// What happened as a result of feeding a chunk to an [`InventorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    /// Paths of any files that were closed out (rotated away from) during
    /// this call, in the order they were closed, ready to be submitted to
    /// the Process-Metabuf Task.
    pub closed_files: Vec<PathBuf>,
}

/// Finds the byte offset at which `buf` can be safely split without cutting
/// an inventory line in half: the offset of the last `key=` marker, since
/// every line begins with one. Bytes from that offset onward belong to the
/// next file. Returns `None` if no marker is present (caller should not
/// rotate mid-buffer in that case).
pub fn locate_safe_split(buf: &[u8]) -> Option<usize> {
    find_last_subslice(buf, KEY_MARKER)
}

fn find_last_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Rotating writer for one metadump run's inventory files, named
/// `<prefix>0`, `<prefix>1`, ...
pub struct InventorySink {
    prefix: PathBuf,
    max_file_size: u64,
    next_index: u64,
    current: File,
    current_path: PathBuf,
    bytes_written: u64,
}

impl InventorySink {
    pub fn create(prefix: impl Into<PathBuf>, max_file_size: u64) -> Result<InventorySink, SinkError> {
        let prefix = prefix.into();
        let current_path = file_path(&prefix, 0);
        let current = File::create(&current_path).map_err(|source| SinkError::Io { path: current_path.clone(), source })?;
        Ok(InventorySink { prefix, max_file_size, next_index: 1, current, current_path, bytes_written: 0 })
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    /// Feeds the next chunk of the metadump stream. At most one rotation
    /// happens per call, at the last `key=` marker in the chunk, mirroring
    /// the cache dumper's long-standing rule: a single oversized `recv()`
    /// can temporarily push one file past `max_file_size`, but a file is
    /// never split anywhere but a line boundary. `reached_end` suppresses
    /// rotation entirely on the final chunk: never rotate away from the
    /// chunk carrying the terminator.
    pub fn feed(&mut self, chunk: &[u8], reached_end: bool) -> Result<RotationOutcome, SinkError> {
        let would_overflow = self.bytes_written + chunk.len() as u64 > self.max_file_size;
        if !would_overflow || reached_end {
            self.write_all(chunk)?;
            return Ok(RotationOutcome { closed_files: Vec::new() });
        }

        let split = match locate_safe_split(chunk) {
            // No marker to split on, or the only marker is at offset 0 (the
            // whole chunk is one line): write it whole rather than corrupt
            // a line; the next chunk will trigger rotation instead.
            None | Some(0) => {
                self.write_all(chunk)?;
                return Ok(RotationOutcome { closed_files: Vec::new() });
            }
            Some(split) => split,
        };

        self.write_all(&chunk[..split])?;
        let closed = self.rotate()?;
        self.write_all(&chunk[split..])?;
        Ok(RotationOutcome { closed_files: vec![closed] })
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.current
            .write_all(bytes)
            .map_err(|source| SinkError::Io { path: self.current_path.clone(), source })?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
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

    /// Closes the current file, returning its path for submission. Call
    /// once at the end of the metadump stream.
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

    #[test]
    fn locate_safe_split_finds_last_marker() {
        let buf = b"key=a exp=1\nkey=b exp=2\nkey=c exp=3\n";
        let idx = locate_safe_split(buf).unwrap();
        assert_eq!(&buf[idx..], b"key=c exp=3\n");
    }

    #[test]
    fn locate_safe_split_none_without_marker() {
        assert_eq!(locate_safe_split(b"no markers here"), None);
    }

    #[test]
    fn small_stream_stays_in_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("inv_");
        let mut sink = InventorySink::create(&prefix, 1024).unwrap();
        let outcome = sink.feed(b"key=a exp=1\nkey=b exp=2\n", true).unwrap();
        assert!(outcome.closed_files.is_empty());
        let path = sink.finish().unwrap();
        assert_eq!(read(&path), b"key=a exp=1\nkey=b exp=2\n");
    }

    #[test]
    fn rotates_at_record_boundary_when_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("inv_");
        let mut sink = InventorySink::create(&prefix, 12).unwrap();
        let outcome = sink.feed(b"key=a exp=1\nkey=b exp=2\n", false).unwrap();
        assert_eq!(outcome.closed_files.len(), 1);
        let first = read(&outcome.closed_files[0]);
        assert_eq!(first, b"key=a exp=1\n");
        let last = sink.finish().unwrap();
        assert_eq!(read(&last), b"key=b exp=2\n");
    }

    #[test]
    fn never_rotates_away_from_the_terminal_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("inv_");
        let mut sink = InventorySink::create(&prefix, 4).unwrap();
        let outcome = sink.feed(b"key=a exp=1\n", true).unwrap();
        assert!(outcome.closed_files.is_empty());
        let path = sink.finish().unwrap();
        assert_eq!(read(&path), b"key=a exp=1\n");
    }

    #[test]
    fn a_single_oversized_chunk_rotates_at_most_once() {
        // One recv() can carry several records past max_file_size; only the
        // last `key=` marker in the chunk is used as the rotation point, so
        // the rotated-out file can itself temporarily exceed max_file_size.
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("inv_");
        let mut sink = InventorySink::create(&prefix, 12).unwrap();
        let outcome = sink.feed(b"key=a exp=1\nkey=b exp=2\nkey=c exp=3\n", false).unwrap();
        assert_eq!(outcome.closed_files.len(), 1);
        assert_eq!(read(&outcome.closed_files[0]), b"key=a exp=1\nkey=b exp=2\n");
        let last = sink.finish().unwrap();
        assert_eq!(read(&last), b"key=c exp=3\n");
    }
}
