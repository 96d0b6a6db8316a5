//! Error kinds shared across the dumper workspace.
//!
//! Every operation in this codebase returns a `Result`; nothing is thrown
//! across task boundaries. `DumperError` covers the cross-cutting kinds from
//! the design (configuration, transient I/O, protocol framing, task-fatal,
//! process-fatal). Component crates may layer their own `thiserror` enum on
//! top and convert into this one at the boundary where it matters (task
//! completion, coordinator reporting).

use std::io;

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type DumperResult<T> = Result<T, DumperError>;

/// Top-level error kinds, matching the taxonomy in the design's error
/// handling section: configuration errors fail fast at startup, transient
/// I/O is retried by the caller before being promoted, protocol framing and
/// task-fatal errors end one task without aborting the scheduler, and
/// process-fatal errors end the whole run.
#[derive(Debug, Error)]
pub enum DumperError {
    /// A configuration or options error, detected at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A transient I/O error that the caller may retry a bounded number of
    /// times before promoting it to task-fatal.
    #[error("transient I/O error: {0}")]
    TransientIo(#[source] io::Error),

    /// The target's wire protocol was violated (malformed header, value
    /// length mismatch, missing terminator at EOS).
    #[error("protocol framing error: {0}")]
    ProtocolFraming(String),

    /// An error that ends the owning task but not the process; the
    /// scheduler continues with remaining tasks.
    #[error("task failed: {0}")]
    TaskFatal(String),

    /// An error that ends the whole process (buffer-pool invariant
    /// violation, output-directory creation failure).
    #[error("fatal error: {0}")]
    ProcessFatal(String),
}

impl From<io::Error> for DumperError {
    fn from(err: io::Error) -> Self {
        DumperError::TransientIo(err)
    }
}

impl DumperError {
    /// True for kinds that should terminate the owning task but let the
    /// scheduler continue draining its queue.
    pub fn is_task_fatal(&self) -> bool {
        matches!(
            self,
            DumperError::ProtocolFraming(_) | DumperError::TaskFatal(_) | DumperError::TransientIo(_)
        )
    }

    /// True for kinds that should terminate the whole process.
    pub fn is_process_fatal(&self) -> bool {
        matches!(self, DumperError::Configuration(_) | DumperError::ProcessFatal(_))
    }
}
