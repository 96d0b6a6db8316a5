//! C9: wires up the pools, scheduler, and shared configuration for one run,
//! submits either a fresh Metadump Task or (on resume) the Process-Metabuf
//! Tasks left over from a prior run, waits for the whole run to drain, and
//! maps the outcome to a process exit code.

use std::net::ToSocketAddrs;
use std::sync::Arc;

use cdump_buffer::BufferPool;
use cdump_core::options::POOL_HEADROOM;
use cdump_core::{DumperError, DumperOptions, DumperResult, ExitCode};
use cdump_metrics::DumperMetrics;
use cdump_scheduler::TaskScheduler;
use cdump_sink::CheckpointLog;
use cdump_socket::SocketPool;
use cdump_upload::{NoopUploader, S3Uploader, SqsNotifier, Uploader};

use crate::filters::{load_dest_ips, RingIpShardResolver};
use crate::metadump_task::MetadumpTask;
use crate::process_metabuf_task::ProcessMetabufTask;
use crate::shared::EngineShared;

/// Runs one dump without an attached metrics collector.
pub fn run(opts: DumperOptions) -> DumperResult<ExitCode> {
    run_with_metrics(opts, None)
}

/// Runs one dump, recording counters into `metrics` when present. The
/// caller owns the `DumperMetrics` instance (and, if it wants a `/metrics`
/// endpoint, the `axum` server serving it) so the same counters observed
/// here are the ones exposed over HTTP.
pub fn run_with_metrics(opts: DumperOptions, metrics: Option<Arc<DumperMetrics>>) -> DumperResult<ExitCode> {
    opts.validate()?;
    std::fs::create_dir_all(&opts.output_dir_path)
        .map_err(|source| DumperError::ProcessFatal(format!("creating output dir: {source}")))?;

    let addr = (opts.memcached_hostname.as_str(), opts.memcached_port)
        .to_socket_addrs()
        .map_err(|source| DumperError::Configuration(format!("resolving {}: {source}", opts.memcached_hostname)))?
        .next()
        .ok_or_else(|| DumperError::Configuration(format!("no address found for {}", opts.memcached_hostname)))?;

    let socket_pool = SocketPool::new(addr, opts.num_threads);
    let capacity = opts.buffer_pool_capacity();
    let buffer_pool = BufferPool::new(opts.chunk_size, capacity, opts.num_threads as u64, POOL_HEADROOM)
        .map_err(|err| DumperError::ProcessFatal(err.to_string()))?;

    let checkpoint_path = opts.output_dir_path.join("checkpoint.log");
    let checkpoint = CheckpointLog::open(checkpoint_path).map_err(|err| DumperError::ProcessFatal(err.to_string()))?;

    let resolver = match &opts.all_ips_filepath {
        Some(path) => Some(Arc::new(RingIpShardResolver::from_file(path)?) as Arc<dyn crate::filters::IpShardResolver>),
        None => None,
    };
    let dest_ips = match &opts.dest_ips_filepath {
        Some(path) => Some(load_dest_ips(path)?),
        None => None,
    };

    let uploader: Option<Arc<dyn Uploader>> = if opts.is_s3_dump {
        let bucket = opts.s3_bucket.clone().ok_or_else(|| DumperError::Configuration("is_s3_dump requires s3_bucket".into()))?;
        match S3Uploader::from_env(bucket) {
            Ok(uploader) => Some(Arc::new(uploader) as Arc<dyn Uploader>),
            Err(err) => {
                tracing::warn!(error = %err, "falling back to a no-op uploader");
                Some(Arc::new(NoopUploader) as Arc<dyn Uploader>)
            }
        }
    } else {
        None
    };

    let sqs_notifier = match &opts.sqs_queue_url {
        Some(queue_url) => match SqsNotifier::from_env(queue_url.clone()) {
            Ok(notifier) => Some(Arc::new(notifier)),
            Err(err) => {
                tracing::warn!(error = %err, "disabling SQS upload notifications");
                None
            }
        },
        None => None,
    };

    let byte_ceiling = opts.chunk_size.saturating_sub(opts.chunk_size / 8);

    let shared = Arc::new(EngineShared::new(
        socket_pool,
        buffer_pool,
        opts.bulk_get_threshold,
        byte_ceiling,
        opts.max_key_file_size,
        opts.max_data_file_size,
        opts.output_dir_path.clone(),
        opts.only_expire_after,
        checkpoint,
        resolver,
        dest_ips,
        uploader,
        opts.s3_path.clone(),
        sqs_notifier,
        metrics,
    ));

    let scheduler = TaskScheduler::new(opts.num_threads);

    if opts.resume_mode {
        // §6 resume replay rule: a prior run's crawl already produced whatever
        // inventory files exist on disk. Re-crawling here would hand this run
        // a different set of inventory boundaries than the one the checkpoint
        // log was written against, making the checkpoint useless. Instead,
        // pick up exactly where the prior run left off: every inventory file
        // on disk not yet marked complete gets its own Process-Metabuf Task.
        for path in pending_inventory_files(&shared)? {
            scheduler.submit(Box::new(ProcessMetabufTask::new(shared.clone(), path)));
        }
    } else {
        scheduler.submit(Box::new(MetadumpTask::new(shared)));
    }

    scheduler.await_quiescence();
    let failures = scheduler.failure_count();
    scheduler.shutdown();

    Ok(if failures == 0 { ExitCode::Ok } else { ExitCode::PartialFailure })
}

/// Lists `inventory_*` files in the output directory, sorted by their
/// rotation index, excluding any already present in the checkpoint log.
fn pending_inventory_files(shared: &EngineShared) -> DumperResult<Vec<std::path::PathBuf>> {
    let completed = shared.checkpoint.completed().map_err(|err| DumperError::ProcessFatal(err.to_string()))?;

    let mut found: Vec<(u64, std::path::PathBuf)> = std::fs::read_dir(&shared.output_dir)
        .map_err(|source| DumperError::ProcessFatal(format!("reading {:?}: {source}", shared.output_dir)))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_str()?;
            let suffix = name.strip_prefix("inventory_")?;
            let index: u64 = suffix.parse().ok()?;
            Some((index, path))
        })
        .filter(|(_, path)| !completed.contains(&path.to_string_lossy().into_owned()))
        .collect();
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}
