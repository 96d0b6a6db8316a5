//! Dumper options: the CLI/options surface named in the design's external
//! interfaces section, plus the startup validation rules.

use std::path::{Path, PathBuf};

use crate::error::{DumperError, DumperResult};

/// Default chunk size for pooled buffers: 64 MiB. The `original_source`
/// comment calling this "1MB" is stale; the value, not the comment, is
/// authoritative.
pub const DEFAULT_CHUNK_SIZE: u64 = 67_108_864;

/// Minimum buffer-pool headroom above worker thread count (§4.1): the
/// metadump task and one in-flight rotation hand-off.
pub const POOL_HEADROOM: u64 = 2;

/// Full set of options recognized by the dumper, matching the CLI surface
/// in the design document.
#[derive(Clone, Debug)]
pub struct DumperOptions {
    pub memcached_hostname: String,
    pub memcached_port: u16,
    pub num_threads: usize,
    pub chunk_size: u64,
    pub bulk_get_threshold: u32,
    pub max_memory_limit: u64,
    pub max_key_file_size: u64,
    pub max_data_file_size: u64,
    pub log_file_path: PathBuf,
    pub output_dir_path: PathBuf,
    pub only_expire_after: i64,
    pub resume_mode: bool,
    pub is_s3_dump: bool,
    pub s3_bucket: Option<String>,
    pub s3_path: Option<String>,
    pub req_id: Option<String>,
    pub dest_ips_filepath: Option<PathBuf>,
    pub all_ips_filepath: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub sqs_queue_url: Option<String>,
}

impl DumperOptions {
    /// The buffer-pool capacity implied by these options: `floor(max_memory_limit / chunk_size)`.
    pub fn buffer_pool_capacity(&self) -> u64 {
        self.max_memory_limit / self.chunk_size
    }

    /// Validates the startup invariants from the design document:
    /// the buffer pool must be able to hold `num_threads + POOL_HEADROOM`
    /// buffers, and a non-empty output directory requires resume mode.
    pub fn validate(&self) -> DumperResult<()> {
        if self.chunk_size == 0 {
            return Err(DumperError::Configuration("chunk_size must be non-zero".into()));
        }
        let required = self.num_threads as u64 + POOL_HEADROOM;
        if self.max_memory_limit < self.chunk_size * required {
            return Err(DumperError::Configuration(format!(
                "max_memory_limit ({}) must be at least chunk_size * (num_threads + {}) = {}",
                self.max_memory_limit,
                POOL_HEADROOM,
                self.chunk_size * required
            )));
        }
        if !self.resume_mode && dir_exists_and_nonempty(&self.output_dir_path) {
            return Err(DumperError::Configuration(format!(
                "output_dir_path {:?} exists and is non-empty but resume_mode is false",
                self.output_dir_path
            )));
        }
        if self.is_s3_dump && (self.s3_bucket.is_none() || self.s3_path.is_none()) {
            return Err(DumperError::Configuration(
                "is_s3_dump requires both s3_bucket and s3_path".into(),
            ));
        }
        if self.dest_ips_filepath.is_some() && self.all_ips_filepath.is_none() {
            return Err(DumperError::Configuration(
                "dest_ips_filepath requires all_ips_filepath".into(),
            ));
        }
        Ok(())
    }
}

fn dir_exists_and_nonempty(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_options(dir: &Path) -> DumperOptions {
        DumperOptions {
            memcached_hostname: "127.0.0.1".into(),
            memcached_port: 11211,
            num_threads: 4,
            chunk_size: DEFAULT_CHUNK_SIZE,
            bulk_get_threshold: 200,
            max_memory_limit: DEFAULT_CHUNK_SIZE * 6,
            max_key_file_size: 256 * 1024 * 1024,
            max_data_file_size: 1024 * 1024 * 1024,
            log_file_path: dir.join("log.txt"),
            output_dir_path: dir.to_path_buf(),
            only_expire_after: 0,
            resume_mode: false,
            is_s3_dump: false,
            s3_bucket: None,
            s3_path: None,
            req_id: None,
            dest_ips_filepath: None,
            all_ips_filepath: None,
            metrics_addr: None,
            sqs_queue_url: None,
        }
    }

    #[test]
    fn rejects_undersized_memory_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = base_options(dir.path());
        opts.max_memory_limit = DEFAULT_CHUNK_SIZE * 2;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn accepts_exact_headroom() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = base_options(dir.path());
        opts.max_memory_limit = DEFAULT_CHUNK_SIZE * (opts.num_threads as u64 + POOL_HEADROOM);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn rejects_nonempty_output_dir_without_resume() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stale"), b"x").unwrap();
        let opts = base_options(dir.path());
        assert!(opts.validate().is_err());
    }

    #[test]
    fn allows_nonempty_output_dir_with_resume() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stale"), b"x").unwrap();
        let mut opts = base_options(dir.path());
        opts.resume_mode = true;
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn s3_dump_requires_bucket_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = base_options(dir.path());
        opts.is_s3_dump = true;
        assert!(opts.validate().is_err());
        opts.s3_bucket = Some("bucket".into());
        opts.s3_path = Some("path".into());
        assert!(opts.validate().is_ok());
    }
}
