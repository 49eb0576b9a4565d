use async_trait::async_trait;

use super::{Job, JobContext, JobError, TaskService};
use crate::download::{Artifact, DownloadOrchestrator, DownloadRequest};
use crate::types::TaskKind;

/// Runs download tasks through a [`DownloadOrchestrator`]
#[derive(Clone, Debug)]
pub struct DownloadJob {
    orchestrator: DownloadOrchestrator,
}

impl DownloadJob {
    /// Wrap an orchestrator
    pub fn new(orchestrator: DownloadOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// The orchestrator every task goes through
    pub fn orchestrator(&self) -> &DownloadOrchestrator {
        &self.orchestrator
    }
}

/// Task service for downloads
pub type DownloadTaskService = TaskService<DownloadJob>;

#[async_trait]
impl Job for DownloadJob {
    type Input = DownloadRequest;
    type Output = Artifact;
    const KIND: TaskKind = TaskKind::Download;

    fn describe(input: &DownloadRequest) -> String {
        format!(
            "download {} to {}",
            input.record.display_label(),
            input.destination.display()
        )
    }

    fn summarize(output: &Artifact) -> String {
        format!("{} from {}", output.path.display(), output.source_id)
    }

    fn output_log(output: &Artifact) -> Vec<String> {
        output.log.clone()
    }

    async fn run(&self, input: DownloadRequest, ctx: JobContext) -> Result<Artifact, JobError> {
        ctx.checkpoint()?;
        let report = |message: &str, percent: u8| ctx.progress(message, Some(percent));
        let artifact = self
            .orchestrator
            .download_with_progress(&input, ctx.cancellation_token(), &report)
            .await?;
        Ok(artifact)
    }
}
