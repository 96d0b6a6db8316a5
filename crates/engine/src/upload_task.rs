//! Submits one completed artifact to the configured [`cdump_upload::Uploader`].

use std::path::PathBuf;
use std::sync::Arc;

use cdump_scheduler::{Task, TaskContext};

use crate::shared::EngineShared;

pub struct UploadTask {
    shared: Arc<EngineShared>,
    local_path: PathBuf,
}

impl UploadTask {
    pub fn new(shared: Arc<EngineShared>, local_path: PathBuf) -> UploadTask {
        UploadTask { shared, local_path }
    }

    fn remote_path(&self) -> String {
        let file_name = self.local_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match &self.shared.s3_path_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), file_name),
            None => file_name,
        }
    }
}

impl Task for UploadTask {
    fn execute(&mut self, ctx: &TaskContext) {
        let Some(uploader) = &self.shared.uploader else {
            return;
        };
        let remote_path = self.remote_path();
        if let Err(err) = uploader.upload(&self.local_path, &remote_path) {
            tracing::error!(error = %err, local = %self.local_path.display(), remote = %remote_path, "upload task failed");
            if let Some(metrics) = &self.shared.metrics {
                metrics.task_failures.inc();
            }
            ctx.report_failure();
            return;
        }

        if let Some(notifier) = &self.shared.sqs_notifier {
            if let Err(err) = notifier.notify_upload_complete(&remote_path) {
                tracing::warn!(error = %err, remote = %remote_path, "upload completed but SQS notification failed");
            }
        }
    }
}
