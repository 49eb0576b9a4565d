//! Search orchestration
//!
//! A search consults the enabled sources, either all at once
//! ([`Strategy::ParallelBroad`]) or one by one until a hit
//! ([`Strategy::SequentialFallback`]), and merges what comes back.

mod orchestrator;
mod policy;

pub use orchestrator::{SearchOrchestrator, SearchOutcome, SearchReport, SourceAttempt};
pub use policy::{
    AttemptOutcome, FallbackPolicy, PatternClassifier, QueryClass, QueryClassifier, Strategy,
};

use serde::{Deserialize, Serialize};

/// Input of a search task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free text or identifier to look up
    pub keyword: String,
    /// Restrict the search to these source ids (None = configured default)
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

impl SearchQuery {
    /// Query every enabled source
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            sources: None,
        }
    }

    /// Restrict to an allow-list of source ids
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }
}
