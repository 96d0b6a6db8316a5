//! C8: reads one inventory file, applies the TTL and IP-shard filters,
//! bulk-gets the surviving keys, writes their values to a data file, marks
//! the inventory file complete in the checkpoint log, and (when configured)
//! submits upload tasks for the artifacts it produced.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use cdump_core::InventoryRecord;
use cdump_scheduler::{Task, TaskContext};
use cdump_sink::DataFileSink;
use cdump_writer::KeyValueWriter;

use crate::error::EngineError;
use crate::filters::{passes_ip_shard, passes_ttl};
use crate::shared::EngineShared;
use crate::upload_task::UploadTask;

pub struct ProcessMetabufTask {
    shared: Arc<EngineShared>,
    inventory_path: PathBuf,
}

impl ProcessMetabufTask {
    pub fn new(shared: Arc<EngineShared>, inventory_path: PathBuf) -> ProcessMetabufTask {
        ProcessMetabufTask { shared, inventory_path }
    }

    fn run(&mut self, ctx: &TaskContext) -> Result<(), EngineError> {
        let key = self.inventory_path.to_string_lossy().into_owned();
        if self.shared.checkpoint.completed()?.contains(&key) {
            tracing::info!(path = %key, "skipping already-checkpointed inventory file");
            return Ok(());
        }

        let file = std::fs::File::open(&self.inventory_path)?;
        let reader = BufReader::new(file);

        let mut socket = self.shared.socket_pool.checkout()?;
        let data_prefix = self.shared.next_data_file_prefix();
        let mut sink = DataFileSink::create(&data_prefix, self.shared.max_data_file_size)?;
        let mut writer = KeyValueWriter::new(self.shared.bulk_get_threshold, self.shared.byte_ceiling, self.shared.buffer_pool.chunk_size());

        let now = self.shared.now();
        let mut rotated_files = Vec::new();

        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    self.shared.socket_pool.release_broken(socket);
                    return Err(err.into());
                }
            };
            let Some(record) = InventoryRecord::parse(&line) else {
                continue;
            };
            if !passes_ttl(&record, self.shared.only_expire_after, now) {
                if let Some(metrics) = &self.shared.metrics {
                    metrics.keys_filtered.inc();
                }
                continue;
            }
            if let (Some(resolver), Some(dest_ips)) = (&self.shared.resolver, &self.shared.dest_ips) {
                if !passes_ip_shard(&record.decoded_key(), resolver.as_ref(), dest_ips) {
                    if let Some(metrics) = &self.shared.metrics {
                        metrics.keys_filtered.inc();
                    }
                    continue;
                }
            }

            match writer.process_key(&record, &mut socket, &mut sink) {
                Ok(Some(stats)) => rotated_files.extend(stats.rotated_files),
                Ok(None) => {}
                Err(err) => {
                    self.shared.socket_pool.release_broken(socket);
                    return Err(err.into());
                }
            }
        }

        match writer.flush_pending(&mut socket, &mut sink) {
            Ok(stats) => rotated_files.extend(stats.rotated_files),
            Err(err) => {
                self.shared.socket_pool.release_broken(socket);
                return Err(err.into());
            }
        }
        self.shared.socket_pool.release(socket);

        for path in &rotated_files {
            self.shared.record_bytes_written(path);
        }
        let final_data_file = sink.finish()?;
        self.shared.record_bytes_written(&final_data_file);
        rotated_files.push(final_data_file);

        self.shared.checkpoint.mark_complete(&self.inventory_path)?;

        if let Some(metrics) = &self.shared.metrics {
            metrics.data_files_produced.inc_by(rotated_files.len() as u64);
            if let Ok(completed) = self.shared.checkpoint.completed() {
                metrics.checkpoint_size.set(completed.len() as i64);
            }
        }

        if self.shared.uploader.is_some() {
            for path in rotated_files {
                ctx.submit(Box::new(UploadTask::new(self.shared.clone(), path)));
            }
            ctx.submit(Box::new(UploadTask::new(self.shared.clone(), self.inventory_path.clone())));
        }

        Ok(())
    }
}

impl Task for ProcessMetabufTask {
    fn execute(&mut self, ctx: &TaskContext) {
        if let Err(err) = self.run(ctx) {
            tracing::error!(error = %err, path = %self.inventory_path.display(), "process-metabuf task failed");
            if let Some(metrics) = &self.shared.metrics {
                metrics.task_failures.inc();
            }
            ctx.report_failure();
        }
    }
}
