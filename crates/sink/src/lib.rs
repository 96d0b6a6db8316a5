#![deny(unsafe_code)]

//! # File Sink (C3)
//!
//! Two rotating writers plus the checkpoint log:
//!
//! - [`InventorySink`] receives raw bytes straight off the metadump socket
//!   in whatever chunking the buffer pool happens to deliver, and must
//!   therefore find its own record-boundary-safe rotation point mid-buffer
//!   (`locate_safe_split`), mirroring the "find the last `key=`, rotate
//!   there" rule the cache dumper's metadump task has always used.
//! - [`DataFileSink`] receives one whole [`McData`] record at a time from
//!   the Key/Value Writer, so it only ever needs to decide whether to
//!   rotate *before* a write, never split one.
//! - [`CheckpointLog`] is an append-only, fsync'd record of inventory files
//!   that have been fully processed, read back on resume to skip work
//!   that already completed.

pub mod checkpoint;
pub mod data;
pub mod inventory;

pub use checkpoint::CheckpointLog;
pub use data::DataFileSink;
pub use inventory::{locate_safe_split, InventorySink, RotationOutcome};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing {path}: {source}")]
    Io { path: std::path::PathBuf, #[source] source: std::io::Error },
}
