//! Configuration and collaborators shared by every task in one dump run.
//! Built once by the coordinator and handed to tasks as an `Arc`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cdump_buffer::BufferPool;
use cdump_metrics::DumperMetrics;
use cdump_sink::CheckpointLog;
use cdump_socket::SocketPool;
use cdump_upload::{SqsNotifier, Uploader};

use crate::filters::IpShardResolver;

pub struct EngineShared {
    pub socket_pool: SocketPool,
    pub buffer_pool: BufferPool,
    pub bulk_get_threshold: u32,
    pub byte_ceiling: u64,
    pub max_key_file_size: u64,
    pub max_data_file_size: u64,
    pub output_dir: PathBuf,
    pub only_expire_after: i64,
    pub checkpoint: CheckpointLog,
    pub resolver: Option<Arc<dyn IpShardResolver>>,
    pub dest_ips: Option<HashSet<SocketAddr>>,
    pub uploader: Option<Arc<dyn Uploader>>,
    pub s3_path_prefix: Option<String>,
    pub sqs_notifier: Option<Arc<SqsNotifier>>,
    pub metrics: Option<Arc<DumperMetrics>>,
    data_file_counter: AtomicU64,
}

impl EngineShared {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket_pool: SocketPool,
        buffer_pool: BufferPool,
        bulk_get_threshold: u32,
        byte_ceiling: u64,
        max_key_file_size: u64,
        max_data_file_size: u64,
        output_dir: PathBuf,
        only_expire_after: i64,
        checkpoint: CheckpointLog,
        resolver: Option<Arc<dyn IpShardResolver>>,
        dest_ips: Option<HashSet<SocketAddr>>,
        uploader: Option<Arc<dyn Uploader>>,
        s3_path_prefix: Option<String>,
        sqs_notifier: Option<Arc<SqsNotifier>>,
        metrics: Option<Arc<DumperMetrics>>,
    ) -> EngineShared {
        EngineShared {
            socket_pool,
            buffer_pool,
            bulk_get_threshold,
            byte_ceiling,
            max_key_file_size,
            max_data_file_size,
            output_dir,
            only_expire_after,
            checkpoint,
            resolver,
            dest_ips,
            uploader,
            s3_path_prefix,
            sqs_notifier,
            metrics,
            data_file_counter: AtomicU64::new(0),
        }
    }

    /// Records `path`'s on-disk size against the `bytes_written` counter, if
    /// metrics are enabled for this run.
    pub fn record_bytes_written(&self, path: &std::path::Path) {
        if let Some(metrics) = &self.metrics {
            if let Ok(meta) = std::fs::metadata(path) {
                metrics.bytes_written.inc_by(meta.len());
            }
        }
    }

    /// A fresh, run-unique prefix for one Process-Metabuf Task's data files.
    pub fn next_data_file_prefix(&self) -> PathBuf {
        let n = self.data_file_counter.fetch_add(1, Ordering::SeqCst);
        self.output_dir.join(format!("data_{n}_"))
    }

    pub fn now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}
