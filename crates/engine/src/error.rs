//! Error kinds local to running a task, converted to a `task-fatal` report
//! (via [`cdump_scheduler::TaskContext::report_failure`]) rather than
//! propagated past `Task::execute`, since one task's failure must never
//! stop the scheduler (§5, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Socket(#[from] cdump_socket::SocketPoolError),
    #[error(transparent)]
    Buffer(#[from] cdump_buffer::BufferPoolError),
    #[error(transparent)]
    Sink(#[from] cdump_sink::SinkError),
    #[error(transparent)]
    Writer(#[from] cdump_writer::WriterError),
    #[error(transparent)]
    Upload(#[from] cdump_upload::UploadError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed before an END terminator was seen")]
    UnexpectedEof,
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<cdump_core::DumperError> for EngineError {
    fn from(err: cdump_core::DumperError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}
