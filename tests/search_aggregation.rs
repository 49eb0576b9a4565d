//! End-to-end search behaviour through the search task service

mod common;

use common::{
    FakeSource, collect_events_until_terminal, fast_config, record, registry, wait_for_terminal,
};
use standards_dl::search::AttemptOutcome;
use standards_dl::source::fields;
use standards_dl::{
    Aggregator, EventType, SearchQuery, SearchStrategy, Strategy, TaskStatus, normalize,
};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn normalization_is_idempotent_and_separator_insensitive() {
    let variants = ["GB/T 1.1-2020", "gb/t 1.1 2020", "GBT1.1-2020", " GB_T 1.1—2020 "];
    let keys: Vec<String> = variants.iter().map(|v| normalize(v)).collect();
    assert!(keys.iter().all(|k| k == "GBT1.12020"));
    for key in &keys {
        assert_eq!(normalize(key), *key);
    }
}

#[tokio::test]
async fn duplicates_merge_with_field_level_priority() {
    let dir = TempDir::new().unwrap();
    let high = FakeSource::records(vec![
        record("high", "GB/T 1.1-2020", "Directives for standardization")
            .with_null(fields::PUBLISH_DATE)
            .with_field(fields::STATUS, "current"),
    ]);
    let low = FakeSource::records(vec![
        record("low", "gb/t 1.1 2020", "Standardization directives")
            .with_field(fields::PUBLISH_DATE, "2020-03-31")
            .with_field(fields::STATUS, "obsolete")
            .with_artifact(),
        record("low", "GB/T 2-2001", "Other"),
    ]);
    let aggregator = Aggregator::new(
        fast_config(dir.path()),
        registry(vec![("low", 2, low), ("high", 1, high)]),
    )
    .unwrap();

    let task = aggregator.submit_search("GB/T 1.1-2020").unwrap();
    let done = wait_for_terminal(aggregator.search(), task.id, WAIT).await;
    assert_eq!(done.status, TaskStatus::Completed);

    let outcome = done.result.unwrap();
    assert_eq!(outcome.report.strategy, Strategy::ParallelBroad);
    assert_eq!(outcome.records.len(), 2);

    let merged = &outcome.records[0];
    assert_eq!(merged.identifier, "GB/T 1.1-2020");
    assert_eq!(merged.name, "Directives for standardization");
    assert_eq!(merged.sources, vec!["high", "low"]);
    assert_eq!(merged.field(fields::STATUS), Some("current"));
    assert_eq!(merged.field(fields::PUBLISH_DATE), Some("2020-03-31"));
    assert!(merged.has_artifact);

    // Natural order: 1.1 before 2
    assert_eq!(outcome.records[1].identifier, "GB/T 2-2001");

    aggregator.shutdown().await;
}

#[tokio::test]
async fn sequential_fallback_stops_at_first_hit() {
    let dir = TempDir::new().unwrap();
    let first = FakeSource::empty();
    let second = FakeSource::records(vec![record("b", "QB/T 1234-2010", "Paper")]);
    let third = FakeSource::records(vec![record("c", "QB/T 1234-2010", "Paper")]);
    let third_calls = third.search_counter();

    let aggregator = Aggregator::new(
        fast_config(dir.path()),
        registry(vec![("a", 0, first), ("b", 1, second), ("c", 2, third)]),
    )
    .unwrap();

    let task = aggregator.submit_search("QB/T 1234").unwrap();
    let done = wait_for_terminal(aggregator.search(), task.id, WAIT).await;
    let outcome = done.result.unwrap();

    assert_eq!(outcome.report.strategy, Strategy::SequentialFallback);
    assert_eq!(outcome.report.fallback_chain(), vec!["a", "b"]);
    assert!(outcome.report.fell_back);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(third_calls.load(Ordering::SeqCst), 0);

    aggregator.shutdown().await;
}

#[tokio::test]
async fn exhausted_fallback_completes_empty_with_chain() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(
        fast_config(dir.path()),
        registry(vec![
            ("a", 0, FakeSource::empty()),
            ("b", 1, FakeSource::failing("connection refused")),
            ("c", 2, FakeSource::empty()),
        ]),
    )
    .unwrap();
    let mut events = aggregator.search().events();

    let task = aggregator.submit_search("JC/T 547").unwrap();
    let collected = collect_events_until_terminal(&mut events, task.id, WAIT).await;
    let done = aggregator.search().status(task.id).unwrap();

    assert_eq!(done.status, TaskStatus::Completed);
    let outcome = done.result.unwrap();
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.report.fallback_chain(), vec!["a", "b", "c"]);
    assert!(matches!(
        outcome.report.attempts[1].outcome,
        AttemptOutcome::Failed { .. }
    ));

    let last = collected.last().unwrap();
    assert_eq!(last.event, EventType::Completed);
    assert_eq!(last.message, "no result, sources tried: a, b, c");
    assert_eq!(
        outcome.no_result().unwrap().to_string(),
        "no result, sources tried: a, b, c"
    );

    aggregator.shutdown().await;
}

#[tokio::test]
async fn hanging_source_does_not_hold_up_parallel_search() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(
        fast_config(dir.path()),
        registry(vec![
            ("slow", 0, FakeSource::hanging()),
            (
                "fast",
                1,
                FakeSource::records(vec![record("fast", "GB 5749-2022", "Drinking water")]),
            ),
        ]),
    )
    .unwrap();

    let started = Instant::now();
    let task = aggregator.submit_search("GB 5749").unwrap();
    let done = wait_for_terminal(aggregator.search(), task.id, WAIT).await;
    let elapsed = started.elapsed();

    assert_eq!(done.status, TaskStatus::Completed);
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

    let outcome = done.result.unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].sources, vec!["fast"]);
    let slow = outcome
        .report
        .attempts
        .iter()
        .find(|a| a.source_id == "slow")
        .unwrap();
    assert_eq!(slow.outcome, AttemptOutcome::TimedOut);

    aggregator.shutdown().await;
}

#[tokio::test]
async fn forced_sequential_strategy_applies_to_broad_queries() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.search.strategy = SearchStrategy::Sequential;
    let second = FakeSource::records(vec![record("b", "GB 1-2000", "x")]);
    let second_calls = second.search_counter();

    let aggregator = Aggregator::new(
        config,
        registry(vec![
            ("a", 0, FakeSource::records(vec![record("a", "GB 1-2000", "x")])),
            ("b", 1, second),
        ]),
    )
    .unwrap();

    let task = aggregator.submit_search("GB 1").unwrap();
    let done = wait_for_terminal(aggregator.search(), task.id, WAIT).await;
    let outcome = done.result.unwrap();
    assert_eq!(outcome.report.strategy, Strategy::SequentialFallback);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);

    aggregator.shutdown().await;
}

#[tokio::test]
async fn query_allow_list_restricts_sources() {
    let dir = TempDir::new().unwrap();
    let a = FakeSource::records(vec![record("a", "GB 1-2000", "x")]);
    let a_calls = a.search_counter();
    let aggregator = Aggregator::new(
        fast_config(dir.path()),
        registry(vec![
            ("a", 0, a),
            ("b", 1, FakeSource::records(vec![record("b", "GB 1-2000", "y")])),
        ]),
    )
    .unwrap();

    let task = aggregator
        .search()
        .submit(SearchQuery::new("GB 1").with_sources(vec!["b".into()]))
        .unwrap();
    let done = wait_for_terminal(aggregator.search(), task.id, WAIT).await;
    let outcome = done.result.unwrap();

    assert_eq!(outcome.report.fallback_chain(), vec!["b"]);
    assert_eq!(outcome.records[0].sources, vec!["b"]);
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);

    aggregator.shutdown().await;
}

#[tokio::test]
async fn search_events_arrive_in_lifecycle_order() {
    let dir = TempDir::new().unwrap();
    let aggregator = Aggregator::new(
        fast_config(dir.path()),
        registry(vec![
            ("a", 0, FakeSource::empty()),
            ("b", 1, FakeSource::records(vec![record("b", "HB/T 7-2001", "x")])),
        ]),
    )
    .unwrap();
    let mut events = aggregator.search().events();

    let task = aggregator.submit_search("HB/T 7").unwrap();
    let collected = collect_events_until_terminal(&mut events, task.id, WAIT).await;
    let kinds: Vec<EventType> = collected.iter().map(|e| e.event).collect();

    assert_eq!(kinds.first(), Some(&EventType::Submitted));
    assert_eq!(kinds.last(), Some(&EventType::Completed));
    assert!(
        kinds[1..kinds.len() - 1]
            .iter()
            .all(|k| *k == EventType::Progress)
    );
    assert!(collected.iter().any(|e| e.message == "a: no result"));
    assert!(collected.iter().any(|e| e.message == "b: found 1"));
    assert_eq!(collected.last().unwrap().status, TaskStatus::Completed);
    assert!(collected.last().unwrap().result.is_some());

    aggregator.shutdown().await;
}

#[tokio::test]
async fn cancelling_a_running_search_yields_cancelled_only() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.search.source_timeout = Duration::from_secs(5);
    config.search.operation_timeout = Duration::from_secs(10);
    let aggregator = Aggregator::new(config, registry(vec![("a", 0, FakeSource::hanging())])).unwrap();
    let mut events = aggregator.search().events();

    let task = aggregator.submit_search("WB/T 1").unwrap();
    loop {
        let status = aggregator.search().status(task.id).unwrap().status;
        if status == TaskStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(aggregator.search().cancel(task.id));
    let collected = collect_events_until_terminal(&mut events, task.id, WAIT).await;
    let done = aggregator.search().status(task.id).unwrap();

    assert_eq!(done.status, TaskStatus::Cancelled);
    assert!(done.result.is_none());
    assert_eq!(collected.last().unwrap().event, EventType::Cancelled);
    assert!(
        !collected
            .iter()
            .any(|e| matches!(e.event, EventType::Completed | EventType::Failed))
    );
    assert!(!aggregator.search().cancel(task.id));

    aggregator.shutdown().await;
}
