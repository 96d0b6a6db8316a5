//! `clap` derive definition for the recognized flag surface (§"CLI / options
//! surface" plus the ambient logging/metrics flags every binary in this
//! workspace carries).

use std::path::PathBuf;

use clap::Parser;

use cdump_core::options::DEFAULT_CHUNK_SIZE;
use cdump_core::DumperOptions;

#[derive(Parser, Debug)]
#[command(name = "cdump", version, about = "Snapshots a live Memcached-protocol cache into rotating on-disk files")]
pub struct Args {
    /// Hostname or IP of the cache server to dump.
    #[arg(long)]
    pub memcached_hostname: String,

    /// TCP port of the cache server.
    #[arg(long, default_value_t = 11211)]
    pub memcached_port: u16,

    /// Number of worker threads driving the task scheduler.
    #[arg(long, default_value_t = 4)]
    pub num_threads: usize,

    /// Size, in bytes, of each pooled buffer.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Maximum number of keys per bulk `get` batch.
    #[arg(long, default_value_t = 200)]
    pub bulk_get_threshold: u32,

    /// Upper bound on total buffer-pool memory, in bytes.
    #[arg(long)]
    pub max_memory_limit: u64,

    /// Maximum size, in bytes, of one inventory file before rotation.
    #[arg(long, default_value_t = 256 * 1024 * 1024)]
    pub max_key_file_size: u64,

    /// Maximum size, in bytes, of one data file before rotation.
    #[arg(long, default_value_t = 1024 * 1024 * 1024)]
    pub max_data_file_size: u64,

    /// Path of the log file (alias: `--log-file`).
    #[arg(long = "log-file", alias = "log_file_path")]
    pub log_file_path: PathBuf,

    /// Directory the dumper writes inventory, data, and checkpoint files into.
    #[arg(long)]
    pub output_dir_path: PathBuf,

    /// Minimum remaining TTL, in seconds, required to emit a key.
    #[arg(long, default_value_t = 0)]
    pub only_expire_after: i64,

    /// Resume a prior run: skip inventory files already in the checkpoint log.
    #[arg(long, default_value_t = false)]
    pub resume_mode: bool,

    /// Upload produced artifacts to S3 after each inventory file completes.
    #[arg(long, default_value_t = false)]
    pub is_s3_dump: bool,

    /// S3 bucket to upload to (required with `--is-s3-dump`).
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// S3 key prefix to upload under (required with `--is-s3-dump`).
    #[arg(long)]
    pub s3_path: Option<String>,

    /// Opaque identifier attached to log lines for this run.
    #[arg(long)]
    pub req_id: Option<String>,

    /// Path to the file listing the IP shards this run should dump.
    #[arg(long)]
    pub dest_ips_filepath: Option<PathBuf>,

    /// Path to the file listing every IP shard in the cluster.
    #[arg(long)]
    pub all_ips_filepath: Option<PathBuf>,

    /// `tracing` log level filter, e.g. `info`, `debug`, `warn`.
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Address (`host:port`) to serve `/metrics` and `/healthz` on.
    #[arg(long = "metrics-addr")]
    pub metrics_addr: Option<String>,

    /// SQS queue URL to notify on each completed S3 upload.
    #[arg(long = "sqs-queue-url")]
    pub sqs_queue_url: Option<String>,
}

impl Args {
    pub fn into_options(self) -> DumperOptions {
        DumperOptions {
            memcached_hostname: self.memcached_hostname,
            memcached_port: self.memcached_port,
            num_threads: self.num_threads,
            chunk_size: self.chunk_size,
            bulk_get_threshold: self.bulk_get_threshold,
            max_memory_limit: self.max_memory_limit,
            max_key_file_size: self.max_key_file_size,
            max_data_file_size: self.max_data_file_size,
            log_file_path: self.log_file_path,
            output_dir_path: self.output_dir_path,
            only_expire_after: self.only_expire_after,
            resume_mode: self.resume_mode,
            is_s3_dump: self.is_s3_dump,
            s3_bucket: self.s3_bucket,
            s3_path: self.s3_path,
            req_id: self.req_id,
            dest_ips_filepath: self.dest_ips_filepath,
            all_ips_filepath: self.all_ips_filepath,
            metrics_addr: self.metrics_addr,
            sqs_queue_url: self.sqs_queue_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    #[test]
    fn minimal_required_flags_parse() {
        let args = Args::try_parse_from([
            "cdump",
            "--memcached-hostname",
            "cache.internal",
            "--max-memory-limit",
            "1000000000",
            "--log-file",
            "/tmp/cdump.log",
            "--output-dir-path",
            "/tmp/cdump-out",
        ])
        .unwrap();
        assert_eq!(args.memcached_hostname, "cache.internal");
        assert_eq!(args.memcached_port, 11211);
        assert_eq!(args.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(!args.resume_mode);
    }

    #[test]
    fn missing_required_flag_is_a_usage_error() {
        let result = Args::try_parse_from(["cdump", "--memcached-hostname", "cache.internal"]);
        assert!(result.is_err());
    }

    #[test]
    fn s3_and_ip_shard_flags_round_trip() {
        let args = Args::try_parse_from([
            "cdump",
            "--memcached-hostname",
            "cache.internal",
            "--max-memory-limit",
            "1000000000",
            "--log-file",
            "/tmp/cdump.log",
            "--output-dir-path",
            "/tmp/cdump-out",
            "--is-s3-dump",
            "--s3-bucket",
            "my-bucket",
            "--s3-path",
            "dumps/2026",
            "--dest-ips-filepath",
            "/tmp/dest.txt",
            "--all-ips-filepath",
            "/tmp/all.txt",
            "--metrics-addr",
            "127.0.0.1:9100",
        ])
        .unwrap();
        let opts = args.into_options();
        assert!(opts.is_s3_dump);
        assert_eq!(opts.s3_bucket.as_deref(), Some("my-bucket"));
        assert_eq!(opts.metrics_addr.as_deref(), Some("127.0.0.1:9100"));
    }
}
