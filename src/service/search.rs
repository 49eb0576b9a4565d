use async_trait::async_trait;

use super::{Job, JobContext, JobError, TaskService};
use crate::search::{SearchOrchestrator, SearchOutcome, SearchQuery, SourceAttempt};
use crate::types::TaskKind;

/// Runs search tasks through a [`SearchOrchestrator`]
#[derive(Clone, Debug)]
pub struct SearchJob {
    orchestrator: SearchOrchestrator,
}

impl SearchJob {
    /// Wrap an orchestrator
    pub fn new(orchestrator: SearchOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// The orchestrator every task goes through
    pub fn orchestrator(&self) -> &SearchOrchestrator {
        &self.orchestrator
    }
}

/// Task service for searches
pub type SearchTaskService = TaskService<SearchJob>;

#[async_trait]
impl Job for SearchJob {
    type Input = SearchQuery;
    type Output = SearchOutcome;
    const KIND: TaskKind = TaskKind::Search;

    fn describe(input: &SearchQuery) -> String {
        match &input.sources {
            Some(sources) => format!("search '{}' on {}", input.keyword, sources.join(", ")),
            None => format!("search '{}'", input.keyword),
        }
    }

    fn summarize(output: &SearchOutcome) -> String {
        match output.no_result() {
            Some(no_result) => no_result.to_string(),
            None => format!("{} record(s) found", output.records.len()),
        }
    }

    async fn run(&self, input: SearchQuery, ctx: JobContext) -> Result<SearchOutcome, JobError> {
        ctx.checkpoint()?;
        let report = |attempt: &SourceAttempt, percent: u8| {
            ctx.progress(attempt.describe(), Some(percent));
        };
        let outcome = self
            .orchestrator
            .search_with_progress(&input, ctx.cancellation_token(), &report)
            .await?;
        Ok(outcome)
    }
}
