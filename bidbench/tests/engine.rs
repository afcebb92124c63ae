mod common;

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use bidbench::db::{ExecutorFactory, ExecutorGuard, MemoryFactory, MemoryStore, SqliteFactory};
use bidbench::engine::{CommitGranularity, RunConfig, RunState, WorkloadEngine};
use bidbench::operation::{Category, Entity, Language, TemplateId};
use bidbench::profile::{expand, ExpansionMode, WorkloadProfile};
use bidbench::workloads::{OperationCatalog, SchemaCounts, Variant};
use bidbench::{Error, ExecutorError};

use common::{numbered_plan, CountingSink, FakeFactory};

fn config(threads: usize) -> RunConfig {
    RunConfig {
        threads,
        commit: CommitGranularity::EndOfRun,
        apply_delays: true,
    }
}

#[test]
fn every_item_runs_exactly_once() {
    let factory = Arc::new(FakeFactory::new());
    let engine = WorkloadEngine::new(config(4), factory.clone());
    let report = engine.run(numbered_plan(2000, Duration::ZERO)).unwrap();

    assert_eq!(engine.state(), RunState::Completed);
    assert_eq!(report.executed, 2000);
    assert_eq!(report.latencies.total_samples(), 2000);

    let log = factory.state.log();
    assert_eq!(log.len(), 2000);
    let payloads: BTreeSet<String> = log.iter().map(|a| a.payload.clone()).collect();
    let expected: BTreeSet<String> = (0..2000).map(|i| format!("SELECT {}", i)).collect();
    assert_eq!(payloads, expected);

    assert_eq!(factory.state.sessions(), 4);
    assert_eq!(factory.state.closes(), 4);
    assert_eq!(factory.state.commits(), 4);
}

#[test]
fn aborted_run_joins_promptly() {
    let factory = Arc::new(FakeFactory::failing_on(10).with_latency(Duration::from_millis(1)));
    let engine = WorkloadEngine::new(config(4), factory.clone());
    let start = Instant::now();
    let result = engine.run(numbered_plan(20_000, Duration::ZERO));

    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(matches!(result, Err(Error::Aborted(_))));
    assert_eq!(engine.state(), RunState::Aborted);
    assert!(factory.state.attempts() < 20_000);
    assert_eq!(factory.state.closes(), factory.state.sessions());
    assert_eq!(factory.state.rollbacks(), 1);
}

#[test]
fn insert_and_select_mix_on_two_threads() {
    let profile = WorkloadProfile::from_counts(
        Language::Sql,
        &[(Category::Insert, 3), (Category::SimpleSelect, 2)],
        Duration::ZERO,
    )
    .pin(Category::Insert, "InsertRandomBid")
    .pin(Category::SimpleSelect, "SelectAuctionById");
    let catalog = OperationCatalog::shared(Variant::Basic);
    let counts = SchemaCounts::new(5, 100, 100, 1000);
    let mut rng = StdRng::seed_from_u64(8);
    let plan = expand(&profile, catalog, &counts, ExpansionMode::Shuffled, &mut rng).unwrap();

    let factory = Arc::new(FakeFactory::new());
    let report = WorkloadEngine::new(config(2), factory).run(plan).unwrap();

    let insert = catalog.by_name("InsertRandomBid", Language::Sql).unwrap().id;
    let select = catalog.by_name("SelectAuctionById", Language::Sql).unwrap().id;
    assert_eq!(report.latencies.len(), 2);
    assert_eq!(report.latencies.samples(insert).unwrap().len(), 3);
    assert_eq!(report.latencies.samples(select).unwrap().len(), 2);
    assert!(report.elapsed >= Duration::ZERO);
    assert_eq!(report.templates[&insert], "sql:InsertRandomBid");
}

#[test]
fn failure_on_fourth_operation() {
    let factory = Arc::new(FakeFactory::failing_on(4));
    let engine = WorkloadEngine::new(config(1), factory.clone());
    let err = engine.run(numbered_plan(10, Duration::ZERO)).unwrap_err();

    assert_eq!(engine.state(), RunState::Aborted);
    match err.abort_cause() {
        Some(Error::Operation {
            template,
            source: ExecutorError::Protocol(message),
            ..
        }) => {
            assert_eq!(template, "sql:Numbered");
            assert_eq!(message, "injected failure on operation 4");
        }
        other => panic!("unexpected abort cause {:?}", other),
    }
    assert_eq!(factory.state.attempts(), 4);
    assert_eq!(factory.state.rollbacks(), 1);
    assert_eq!(factory.state.commits(), 0);
    assert_eq!(factory.state.closes(), 1);
}

#[test]
fn failing_worker_stops_at_its_failure() {
    let factory = Arc::new(FakeFactory::failing_on(4).with_latency(Duration::from_millis(2)));
    let engine = WorkloadEngine::new(config(3), factory.clone());
    let err = engine.run(numbered_plan(300, Duration::ZERO)).unwrap_err();
    assert!(matches!(err.abort_cause(), Some(Error::Operation { .. })));

    let log = factory.state.log();
    let failed = log.iter().find(|a| a.number == 4).unwrap().session;
    let last = log
        .iter()
        .filter(|a| a.session == failed)
        .map(|a| a.number)
        .max()
        .unwrap();
    assert_eq!(last, 4);
}

#[test]
fn thread_count_is_capped_by_factory() {
    let factory = Arc::new(FakeFactory {
        max_sessions: 1,
        ..FakeFactory::new()
    });
    let engine = WorkloadEngine::new(config(8), factory.clone());
    assert_eq!(engine.thread_count(), 1);
    engine.run(numbered_plan(50, Duration::ZERO)).unwrap();
    assert_eq!(factory.state.sessions(), 1);

    let log = factory.state.log();
    let order: Vec<String> = log.into_iter().map(|a| a.payload).collect();
    let expected: Vec<String> = (0..50).map(|i| format!("SELECT {}", i)).collect();
    assert_eq!(order, expected);
}

#[test]
fn sqlite_readers_overlap_until_the_end_of_run_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.sqlite3");
    let factory = Arc::new(SqliteFactory::new(path.to_str().unwrap()).unwrap());
    let engine = WorkloadEngine::new(config(2), factory);
    assert_eq!(engine.thread_count(), 2);

    let start = Instant::now();
    let report = engine.run(numbered_plan(8, Duration::from_millis(200))).unwrap();
    let wall = start.elapsed();

    assert_eq!(report.executed, 8);
    let slowest = report
        .latencies
        .samples(TemplateId(0))
        .unwrap()
        .into_iter()
        .max()
        .unwrap();
    assert!(slowest < Duration::from_millis(200), "select waited {:?}", slowest);
    assert!(wall < Duration::from_millis(1400), "run took {:?}", wall);
}

#[test]
fn per_item_commits() {
    let factory = Arc::new(FakeFactory::new());
    let engine = WorkloadEngine::new(
        RunConfig {
            threads: 2,
            commit: CommitGranularity::PerItem,
            apply_delays: false,
        },
        factory.clone(),
    );
    engine.run(numbered_plan(40, Duration::from_secs(60))).unwrap();
    assert_eq!(factory.state.commits(), 40 + 2);
}

#[test]
fn sink_is_flushed_after_abort() {
    let sink = Arc::new(CountingSink::default());
    let store = Arc::new(MemoryStore::new());
    let engine = WorkloadEngine::new(config(2), Arc::new(MemoryFactory::new(store.clone())))
        .with_sink(sink.clone());
    engine.run(numbered_plan(25, Duration::ZERO)).unwrap();
    assert_eq!(sink.records.load(Ordering::SeqCst), 25);
    assert_eq!(sink.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(store.executed(), 25);

    let sink = Arc::new(CountingSink::default());
    let engine = WorkloadEngine::new(config(2), Arc::new(FakeFactory::failing_on(1))).with_sink(sink.clone());
    assert!(engine.run(numbered_plan(25, Duration::ZERO)).is_err());
    assert_eq!(sink.flushes.load(Ordering::SeqCst), 1);
}

#[test]
fn close_twice_after_run() {
    let store = Arc::new(MemoryStore::new());
    let factory = MemoryFactory::new(store);
    let mut executor = factory.create_executor(None).unwrap();
    let op = OperationCatalog::shared(Variant::Basic).count_query(Entity::Bid, Language::Sql);
    executor.execute(&op).unwrap();
    executor.commit().unwrap();
    executor.close().unwrap();
    executor.close().unwrap();

    let guard = ExecutorGuard::acquire(&factory, None).unwrap();
    guard.close().unwrap();
}
