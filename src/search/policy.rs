//! Strategy selection and fallback decisions

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{SearchConfig, SearchStrategy};

/// How broad a query is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    /// Likely to match in several sources; worth querying them all at once
    Broad,
    /// A specific lookup; one good answer is enough
    Narrow,
}

/// Decides whether a query is broad or narrow
pub trait QueryClassifier: Send + Sync {
    /// Classify `query`
    fn classify(&self, query: &str) -> QueryClass;
}

/// Regex-driven classifier
///
/// A query is broad when it matches any include pattern and no exclude
/// pattern. Matching is case-insensitive.
#[derive(Clone, Debug)]
pub struct PatternClassifier {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PatternClassifier {
    /// Compile the given patterns
    ///
    /// Invalid patterns are logged and skipped.
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: compile_patterns(include),
            exclude: compile_patterns(exclude),
        }
    }

    /// Classifier for the patterns in a search config
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(&config.broad_patterns, &config.exclude_patterns)
    }
}

impl QueryClassifier for PatternClassifier {
    fn classify(&self, query: &str) -> QueryClass {
        let query = query.trim();
        if self.exclude.iter().any(|re| re.is_match(query)) {
            return QueryClass::Narrow;
        }
        if self.include.iter().any(|re| re.is_match(query)) {
            QueryClass::Broad
        } else {
            QueryClass::Narrow
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| {
            match RegexBuilder::new(pattern)
                .case_insensitive(true)
                .size_limit(1024 * 1024)
                .build()
            {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "invalid classifier pattern, skipping");
                    None
                }
            }
        })
        .collect()
}

/// Execution mode of one search
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Every enabled source concurrently
    ParallelBroad,
    /// One source at a time in priority order, stopping at the first hit
    SequentialFallback,
}

/// What a single source call produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// At least one usable record
    Found {
        /// Number of usable records
        count: usize,
    },
    /// Nothing usable
    Empty,
    /// The source reported an error
    Failed {
        /// Error message
        error: String,
    },
    /// The call exceeded its budget or was abandoned at the overall deadline
    TimedOut,
}

impl AttemptOutcome {
    /// Whether the source produced a usable result
    pub fn is_hit(&self) -> bool {
        matches!(self, AttemptOutcome::Found { .. })
    }
}

/// Chooses the strategy for a query and whether to move past a source
#[derive(Clone)]
pub struct FallbackPolicy {
    classifier: Arc<dyn QueryClassifier>,
    mode: SearchStrategy,
}

impl FallbackPolicy {
    /// Build a policy around a classifier
    pub fn new(classifier: Arc<dyn QueryClassifier>, mode: SearchStrategy) -> Self {
        Self { classifier, mode }
    }

    /// Policy built from the patterns and mode in a search config
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            Arc::new(PatternClassifier::from_config(config)),
            config.strategy,
        )
    }

    /// Strategy for `query`
    pub fn strategy_for(&self, query: &str) -> Strategy {
        match self.mode {
            SearchStrategy::Parallel => Strategy::ParallelBroad,
            SearchStrategy::Sequential => Strategy::SequentialFallback,
            SearchStrategy::Auto => match self.classifier.classify(query) {
                QueryClass::Broad => Strategy::ParallelBroad,
                QueryClass::Narrow => Strategy::SequentialFallback,
            },
        }
    }

    /// Whether sequential fallback should move on to the next source
    pub fn should_advance(&self, outcome: &AttemptOutcome) -> bool {
        !outcome.is_hit()
    }
}

impl std::fmt::Debug for FallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
