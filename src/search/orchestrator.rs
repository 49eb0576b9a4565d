//! Multi-source search: parallel fan-out or sequential fallback under timeouts

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::SearchQuery;
use super::policy::{AttemptOutcome, FallbackPolicy, Strategy};
use crate::config::SearchConfig;
use crate::error::{Error, NoResultError, Result, SourceError};
use crate::merge::{CanonicalRecord, SourceBatch, merge_records};
use crate::normalize::NormalizedKey;
use crate::source::{RawRecord, RegisteredSource, SourceRegistry};

/// One source call and how it went
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttempt {
    /// Source id
    pub source_id: String,
    /// What the call produced
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    /// How long the call took
    pub elapsed: Duration,
}

impl SourceAttempt {
    /// One-line description for progress messages and logs
    pub fn describe(&self) -> String {
        match &self.outcome {
            AttemptOutcome::Found { count } => format!("{}: found {count}", self.source_id),
            AttemptOutcome::Empty => format!("{}: no result", self.source_id),
            AttemptOutcome::Failed { error } => format!("{}: failed: {error}", self.source_id),
            AttemptOutcome::TimedOut => format!("{}: timed out", self.source_id),
        }
    }
}

/// How a search was carried out
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Strategy used
    pub strategy: Strategy,
    /// Every source call, in the order the sources were tried (sequential)
    /// or finished (parallel)
    pub attempts: Vec<SourceAttempt>,
    /// Whether sequential fallback moved past the first source
    pub fell_back: bool,
    /// Whether the overall search timeout cut the search short
    pub deadline_hit: bool,
    /// Wall-clock duration of the whole search
    pub elapsed: Duration,
}

impl SearchReport {
    /// Source ids in attempt order
    pub fn fallback_chain(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.source_id.as_str()).collect()
    }
}

/// Merged records plus the report of how they were obtained
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// One record per normalized identifier, in natural order
    pub records: Vec<CanonicalRecord>,
    /// How the search went
    pub report: SearchReport,
}

impl SearchOutcome {
    /// Whether nothing was found
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The "no result, sources tried: ..." detail, if nothing was found
    pub fn no_result(&self) -> Option<NoResultError> {
        self.is_empty().then(|| NoResultError {
            tried: self
                .report
                .fallback_chain()
                .into_iter()
                .map(String::from)
                .collect(),
        })
    }

    /// The records, or the no-result detail
    pub fn require_results(self) -> std::result::Result<Vec<CanonicalRecord>, NoResultError> {
        match self.no_result() {
            Some(err) => Err(err),
            None => Ok(self.records),
        }
    }
}

/// Runs searches against the registry
#[derive(Clone, Debug)]
pub struct SearchOrchestrator {
    registry: Arc<SourceRegistry>,
    policy: FallbackPolicy,
    enabled: Option<Vec<String>>,
    source_timeout: Duration,
    operation_timeout: Duration,
}

struct Collected {
    batches: Vec<SourceBatch>,
    attempts: Vec<SourceAttempt>,
    deadline_hit: bool,
}

impl SearchOrchestrator {
    /// Build an orchestrator with the policy derived from `config`
    pub fn new(
        registry: Arc<SourceRegistry>,
        config: &SearchConfig,
        enabled: Option<Vec<String>>,
    ) -> Self {
        Self {
            registry,
            policy: FallbackPolicy::from_config(config),
            enabled,
            source_timeout: config.source_timeout,
            operation_timeout: config.operation_timeout,
        }
    }

    /// Replace the fallback policy
    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The registry this orchestrator queries
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Run a search to completion
    pub async fn search(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        self.search_with_progress(query, cancel, &|_: &SourceAttempt, _: u8| {})
            .await
    }

    /// Run a search, calling `on_attempt` after every source call
    ///
    /// The second argument is the share of candidate sources already
    /// consulted, as a percentage.
    ///
    /// Fails only when no searchable source is enabled or when `cancel` fires.
    /// Individual source failures are recorded in the report; an empty
    /// result is a successful outcome.
    pub async fn search_with_progress(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
        on_attempt: &(dyn Fn(&SourceAttempt, u8) + Send + Sync),
    ) -> Result<SearchOutcome> {
        let started = Instant::now();
        let candidates = self.candidates(query);
        if candidates.is_empty() {
            return Err(Error::NoSourcesEnabled);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let keyword = query.keyword.trim();
        let strategy = self.policy.strategy_for(keyword);
        let deadline = started + self.operation_timeout;
        tracing::info!(
            keyword,
            ?strategy,
            sources = candidates.len(),
            "starting search"
        );

        let collected = match strategy {
            Strategy::ParallelBroad => {
                self.fan_out(keyword, &candidates, deadline, cancel, on_attempt)
                    .await?
            }
            Strategy::SequentialFallback => {
                self.fall_back(keyword, &candidates, deadline, cancel, on_attempt)
                    .await?
            }
        };

        let priority: Vec<String> = self
            .registry
            .sources()
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        let records = merge_records(collected.batches, &priority);
        let report = SearchReport {
            strategy,
            fell_back: strategy == Strategy::SequentialFallback && collected.attempts.len() > 1,
            deadline_hit: collected.deadline_hit,
            attempts: collected.attempts,
            elapsed: started.elapsed(),
        };

        if records.is_empty() {
            tracing::info!(keyword, chain = ?report.fallback_chain(), "search found nothing");
        } else {
            tracing::info!(keyword, records = records.len(), "search finished");
        }
        Ok(SearchOutcome { records, report })
    }

    fn candidates(&self, query: &SearchQuery) -> Vec<RegisteredSource> {
        let allow = query.sources.as_deref().or(self.enabled.as_deref());
        self.registry
            .enabled(allow)
            .into_iter()
            .filter(|s| s.descriptor().can_search)
            .cloned()
            .collect()
    }

    async fn fan_out(
        &self,
        keyword: &str,
        candidates: &[RegisteredSource],
        deadline: Instant,
        cancel: &CancellationToken,
        on_attempt: &(dyn Fn(&SourceAttempt, u8) + Send + Sync),
    ) -> Result<Collected> {
        let total = candidates.len();
        let per_source = self.source_timeout;
        let mut pending: FuturesUnordered<_> = candidates
            .iter()
            .map(|source| {
                let capability = Arc::clone(source.capability());
                let id = source.id().to_string();
                async move {
                    let started = Instant::now();
                    let result = tokio::time::timeout(per_source, capability.search(keyword)).await;
                    (id, result, started.elapsed())
                }
            })
            .collect();

        let mut batches = Vec::new();
        let mut attempts = Vec::new();
        let mut finished: HashSet<String> = HashSet::new();
        let mut deadline_hit = false;
        let ceiling = tokio::time::sleep_until(deadline);
        tokio::pin!(ceiling);

        loop {
            tokio::select! {
                next = pending.next() => {
                    let Some((id, result, elapsed)) = next else { break };
                    let (outcome, records) = classify(&id, result, per_source);
                    finished.insert(id.clone());
                    if let Some(records) = records {
                        batches.push(SourceBatch::new(id.clone(), records));
                    }
                    let attempt = SourceAttempt { source_id: id, outcome, elapsed };
                    on_attempt(&attempt, percent(finished.len(), total));
                    attempts.push(attempt);
                }
                _ = &mut ceiling => {
                    deadline_hit = true;
                    break;
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("search cancelled during fan-out");
                    return Err(Error::Cancelled);
                }
            }
        }

        if deadline_hit {
            let waited = self.operation_timeout;
            for source in candidates.iter().filter(|s| !finished.contains(s.id())) {
                tracing::warn!(source = %source.id(), "abandoned at search deadline");
                attempts.push(SourceAttempt {
                    source_id: source.id().to_string(),
                    outcome: AttemptOutcome::TimedOut,
                    elapsed: waited,
                });
            }
        }

        Ok(Collected {
            batches,
            attempts,
            deadline_hit,
        })
    }

    async fn fall_back(
        &self,
        keyword: &str,
        candidates: &[RegisteredSource],
        deadline: Instant,
        cancel: &CancellationToken,
        on_attempt: &(dyn Fn(&SourceAttempt, u8) + Send + Sync),
    ) -> Result<Collected> {
        let total = candidates.len();
        let mut batches = Vec::new();
        let mut attempts = Vec::new();
        let mut deadline_hit = false;

        for (idx, source) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                deadline_hit = true;
                tracing::warn!(source = %source.id(), "search deadline reached, not trying further sources");
                break;
            }
            let budget = self.source_timeout.min(remaining);

            let started = Instant::now();
            let result = tokio::select! {
                r = tokio::time::timeout(budget, source.capability().search(keyword)) => r,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            };
            let (outcome, records) = classify(source.id(), result, budget);
            let attempt = SourceAttempt {
                source_id: source.id().to_string(),
                outcome,
                elapsed: started.elapsed(),
            };
            on_attempt(&attempt, percent(idx + 1, total));
            let advance = self.policy.should_advance(&attempt.outcome);
            attempts.push(attempt);

            if let Some(records) = records {
                batches.push(SourceBatch::new(source.id(), records));
            }
            if !advance {
                break;
            }
            tracing::debug!(source = %source.id(), "falling back to next source");
        }

        Ok(Collected {
            batches,
            attempts,
            deadline_hit,
        })
    }
}

type CallResult = std::result::Result<
    std::result::Result<Vec<RawRecord>, SourceError>,
    tokio::time::error::Elapsed,
>;

// Only records with a usable identifier count towards a hit.
fn classify(
    source_id: &str,
    result: CallResult,
    budget: Duration,
) -> (AttemptOutcome, Option<Vec<RawRecord>>) {
    match result {
        Ok(Ok(records)) => {
            let usable: Vec<RawRecord> = records
                .into_iter()
                .filter(|r| NormalizedKey::new(&r.identifier).is_some())
                .collect();
            if usable.is_empty() {
                tracing::debug!(source = source_id, "source returned no usable records");
                (AttemptOutcome::Empty, None)
            } else {
                tracing::debug!(source = source_id, count = usable.len(), "source returned records");
                (
                    AttemptOutcome::Found {
                        count: usable.len(),
                    },
                    Some(usable),
                )
            }
        }
        Ok(Err(err)) => {
            tracing::warn!(source = source_id, error = %err, "source search failed");
            (
                AttemptOutcome::Failed {
                    error: err.to_string(),
                },
                None,
            )
        }
        Err(_) => {
            tracing::warn!(source = source_id, timeout = ?budget, "source search timed out");
            (AttemptOutcome::TimedOut, None)
        }
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from((done.min(total) * 100) / total).unwrap_or(100)
}
