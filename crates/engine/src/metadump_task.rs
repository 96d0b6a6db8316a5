//! C7: sends `lru_crawler metadump all\n` and streams the reply into
//! rotating inventory files, submitting a Process-Metabuf Task for every
//! file it closes out.

use std::io::{Read, Write};
use std::sync::Arc;

use cdump_protocol::MetadumpScanner;
use cdump_scheduler::{Task, TaskContext};
use cdump_sink::InventorySink;

use crate::error::EngineError;
use crate::process_metabuf_task::ProcessMetabufTask;
use crate::shared::EngineShared;

pub struct MetadumpTask {
    shared: Arc<EngineShared>,
}

impl MetadumpTask {
    pub fn new(shared: Arc<EngineShared>) -> MetadumpTask {
        MetadumpTask { shared }
    }

    fn submit_file(&self, path: std::path::PathBuf, ctx: &TaskContext) {
        self.shared.record_bytes_written(&path);
        if let Some(metrics) = &self.shared.metrics {
            metrics.inventory_files_produced.inc();
        }
        ctx.submit(Box::new(ProcessMetabufTask::new(self.shared.clone(), path)));
    }

    fn run(&mut self, ctx: &TaskContext) -> Result<(), EngineError> {
        let mut socket = self.shared.socket_pool.checkout()?;
        if let Err(err) = socket.stream_mut().write_all(b"lru_crawler metadump all\n") {
            self.shared.socket_pool.release_broken(socket);
            return Err(err.into());
        }

        let prefix = self.shared.output_dir.join("inventory_");
        let mut sink = InventorySink::create(&prefix, self.shared.max_key_file_size)?;
        let mut scanner = MetadumpScanner::new();

        loop {
            let mut buffer = match self.shared.buffer_pool.checkout() {
                Ok(buffer) => buffer,
                Err(err) => {
                    self.shared.socket_pool.release_broken(socket);
                    return Err(err.into());
                }
            };
            let n = match socket.stream_mut().read(buffer.as_mut_slice()) {
                Ok(n) => n,
                Err(err) => {
                    self.shared.socket_pool.release_broken(socket);
                    return Err(err.into());
                }
            };
            buffer.set_valid_len(n);

            if n == 0 {
                self.shared.socket_pool.release_broken(socket);
                return Err(EngineError::UnexpectedEof);
            }

            let feed_result = scanner.feed(buffer.as_slice());
            let rotation = match sink.feed(&feed_result.to_write, feed_result.terminated) {
                Ok(rotation) => rotation,
                Err(err) => {
                    self.shared.socket_pool.release_broken(socket);
                    return Err(err.into());
                }
            };
            for closed in rotation.closed_files {
                self.submit_file(closed, ctx);
            }

            if feed_result.terminated {
                self.shared.socket_pool.release(socket);
                let final_path = sink.finish()?;
                self.submit_file(final_path, ctx);
                return Ok(());
            }
        }
    }
}

impl Task for MetadumpTask {
    fn execute(&mut self, ctx: &TaskContext) {
        if let Err(err) = self.run(ctx) {
            tracing::error!(error = %err, "metadump task failed");
            if let Some(metrics) = &self.shared.metrics {
                metrics.task_failures.inc();
            }
            ctx.report_failure();
        }
    }
}
