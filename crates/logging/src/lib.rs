#![deny(unsafe_code)]

//! Process-wide logging setup (design notes §9: "model as a process-wide
//! sink with explicit init/teardown rules").
//!
//! The first call to [`init`] installs a global `tracing` subscriber that
//! writes structured `level, timestamp, component, message` lines to the
//! configured log file; subsequent calls are no-ops. The returned
//! [`LogGuard`] must be held for the lifetime of the process: dropping it
//! flushes the non-blocking writer, matching the teardown-at-exit rule.

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Holds the background flush thread for the log file writer. Keep this
/// alive for the duration of the process; its `Drop` impl flushes pending
/// lines.
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Installs the global logger if it has not been installed yet. Returns a
/// guard that must be kept alive for the process's lifetime.
///
/// `log_file_path`'s parent directory must already exist; this function
/// does not create directories (that is the coordinator's job, per the
/// component boundaries in the design).
pub fn init(log_file_path: &Path) -> LogGuard {
    let mut worker = None;
    INSTALLED.get_or_init(|| {
        let file_name = log_file_path
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_else(|| "dumper.log".into());
        let dir = log_file_path.parent().unwrap_or_else(|| Path::new("."));
        let file_appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        worker = Some(guard);

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_target(true)
            .with_level(true)
            .with_ansi(false)
            .init();
    });
    LogGuard { _worker: worker }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("dumper.log");
        let _guard1 = init(&log_path);
        let _guard2 = init(&log_path);
        tracing::info!(component = "test", "hello");
    }
}
