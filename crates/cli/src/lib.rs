#![deny(unsafe_code)]

//! Command-line front-end: parses the flag surface, wires up logging and
//! the optional metrics server, and delegates the run itself to
//! [`cdump_engine::run`].

pub mod args;

use std::ffi::OsString;
use std::io::Write;

use clap::Parser;

use cdump_core::{DumperError, ExitCode};

use args::Args;

/// Parses `raw_args`, runs one dump, and returns the process exit code.
///
/// Argument parsing failures (including `--help`/`--version`) are written to
/// `stdout`/`stderr` by `clap` itself and reported as [`ExitCode::Usage`].
pub fn run<I, Out, Err>(raw_args: I, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let args = match Args::try_parse_from(raw_args) {
        Ok(args) => args,
        Err(clap_err) => {
            let target = if clap_err.kind() == clap::error::ErrorKind::DisplayHelp
                || clap_err.kind() == clap::error::ErrorKind::DisplayVersion
            {
                let _ = write!(stdout, "{clap_err}");
                return ExitCode::Ok;
            } else {
                stderr
            };
            let _ = write!(target, "{clap_err}");
            return ExitCode::Usage;
        }
    };

    let log_level = args.log_level.clone();
    let metrics_addr = args.metrics_addr.clone();
    let opts = args.into_options();

    if let Err(err) = opts.validate() {
        let _ = writeln!(stderr, "{err}");
        return ExitCode::Usage;
    }

    if let Some(parent) = opts.log_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                let _ = writeln!(stderr, "creating log directory: {err}");
                return ExitCode::Fatal;
            }
        }
    }
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &log_level);
    }
    let _log_guard = cdump_logging::init(&opts.log_file_path);

    let mut metrics = None;
    let mut _metrics_handle = None;
    if let Some(addr) = metrics_addr.as_deref() {
        match addr.parse() {
            Ok(addr) => {
                let handle = std::sync::Arc::new(cdump_metrics::DumperMetrics::new());
                _metrics_handle = Some(cdump_metrics::spawn(addr, handle.clone()));
                metrics = Some(handle);
            }
            Err(err) => {
                tracing::warn!(error = %err, addr, "ignoring malformed --metrics-addr");
            }
        }
    }

    match cdump_engine::run_with_metrics(opts, metrics) {
        Ok(exit_code) => exit_code,
        Err(err) => {
            let _ = writeln!(stderr, "{err}");
            exit_code_for(&err)
        }
    }
}

/// Maps a top-level run failure to the process exit code it represents.
pub fn exit_code_for(err: &DumperError) -> ExitCode {
    if err.is_process_fatal() {
        if matches!(err, DumperError::Configuration(_)) {
            ExitCode::Usage
        } else {
            ExitCode::Fatal
        }
    } else {
        ExitCode::PartialFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_flag_reports_success() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = run(["cdump", "--version"], &mut stdout, &mut stderr);
        assert_eq!(exit, ExitCode::Ok);
        assert!(!stdout.is_empty());
        assert!(stderr.is_empty());
    }

    #[test]
    fn missing_required_flags_is_usage_error() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = run(["cdump"], &mut stdout, &mut stderr);
        assert_eq!(exit, ExitCode::Usage);
        assert!(!stderr.is_empty());
    }

    #[test]
    fn invalid_options_combination_is_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = run(
            [
                "cdump",
                "--memcached-hostname",
                "127.0.0.1",
                "--max-memory-limit",
                "10",
                "--log-file",
                dir.path().join("log.txt").to_str().unwrap(),
                "--output-dir-path",
                dir.path().to_str().unwrap(),
            ],
            &mut stdout,
            &mut stderr,
        );
        assert_eq!(exit, ExitCode::Usage);
    }
}
