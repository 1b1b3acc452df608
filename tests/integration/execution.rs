use std::time::Instant;

use quantgrid_core::result::InvocationResult;
use quantgrid_core::value::MissingOutput;
use quantgrid_engine::{CacheValue, JobOutcome};
use tokio::sync::mpsc;

use crate::*;

/// The full coordinator → node → coordinator cycle on a dependent pipeline.
#[test]
fn pipeline_executes_through_the_wire_boundary() {
    init_tracing();
    let directory = JobDirectory::new();
    let node = node();

    let sent = job(
        1,
        vec![
            market_item("Pos~1", 100.0, ExecutionLogMode::Indicators),
            pv_item("Pos~1", 0.95, ExecutionLogMode::Indicators),
        ],
    );
    let returned = round_trip(&node, &sent, &directory).unwrap();

    assert_eq!(returned.specification, sent.specification);
    assert_eq!(returned.items.len(), sent.items.len());
    for item in &returned.items {
        assert_eq!(item.result, InvocationResult::Success);
    }
    assert_eq!(returned.node_id, "gridhost/1/1");
}

/// result.items[i] answers job.items[i]: order and cardinality survive the
/// round trip even when outcomes differ per position.
#[test]
fn result_order_mirrors_job_order() {
    init_tracing();
    let directory = JobDirectory::new();
    let node = node();

    let mut failing = market_item("Pos~2", 1.0, ExecutionLogMode::Indicators);
    failing.function_id = "FailFn".into();

    let sent = job(
        2,
        vec![
            market_item("Pos~2a", 10.0, ExecutionLogMode::Indicators),
            failing,
            market_item("Pos~2b", 30.0, ExecutionLogMode::Indicators),
        ],
    );
    let returned = round_trip(&node, &sent, &directory).unwrap();

    let statuses: Vec<_> = returned.items.iter().map(|i| i.result).collect();
    assert_eq!(
        statuses,
        vec![
            InvocationResult::Success,
            InvocationResult::FunctionThrewException,
            InvocationResult::Success,
        ]
    );
}

/// One item short of inputs does not block the items after it.
#[test]
fn missing_inputs_are_isolated() {
    init_tracing();
    let directory = JobDirectory::new();
    let node = node();

    let sent = job(
        3,
        vec![
            market_item("Pos~3a", 5.0, ExecutionLogMode::Indicators),
            // Market value for Pos~3x is never computed anywhere.
            pv_item("Pos~3x", 1.0, ExecutionLogMode::Indicators),
            market_item("Pos~3b", 7.0, ExecutionLogMode::Indicators),
        ],
    );
    let returned = round_trip(&node, &sent, &directory).unwrap();

    let statuses: Vec<_> = returned.items.iter().map(|i| i.result).collect();
    assert_eq!(
        statuses,
        vec![
            InvocationResult::Success,
            InvocationResult::MissingInputs,
            InvocationResult::Success,
        ]
    );
    assert_eq!(returned.items[1].missing_inputs.len(), 1);
    assert_eq!(*returned.items[1].missing_inputs[0], *market_spec("Pos~3x"));
    assert!(returned.items[0].missing_inputs.is_empty());
}

#[test]
fn empty_job_round_trips() {
    init_tracing();
    let directory = JobDirectory::new();
    let node = node();

    let sent = job(4, Vec::new());
    let before = Instant::now();
    let returned = round_trip(&node, &sent, &directory).unwrap();

    assert!(returned.items.is_empty());
    assert!(returned.duration <= before.elapsed());
}

#[test]
fn duration_is_within_the_wall_clock_span() {
    init_tracing();
    let directory = JobDirectory::new();
    let node = node();

    let items = (0..10)
        .map(|i| market_item(&format!("Pos~5-{}", i), i as f64, ExecutionLogMode::None))
        .collect();
    let sent = job(5, items);

    let before = Instant::now();
    let received = transmit_job(&sent, &directory);
    let result = node.execute_job(&received).unwrap();
    let span = before.elapsed();

    assert!(result.duration <= span, "{:?} > {:?}", result.duration, span);
}

/// Values written under the shared hint land in the cycle's shared partition
/// and stay readable by a later job of the same cycle.
#[test]
fn shared_values_survive_across_jobs_in_a_cycle() {
    init_tracing();
    let source = Arc::new(CacheSource::new(0));
    let node = Arc::new(CalculationNode::new(
        Arc::clone(&source),
        repository(),
        "gridhost/1/2",
    ));
    let directory = JobDirectory::new();

    let first = job(6, vec![market_item("Pos~6", 250.0, ExecutionLogMode::None)]);
    round_trip(&node, &first, &directory).unwrap();

    // A second job in the same cycle consumes the first job's output.
    let second = job(7, vec![pv_item("Pos~6", 0.5, ExecutionLogMode::None)]);
    let returned = round_trip(&node, &second, &directory).unwrap();
    assert_eq!(returned.items[0].result, InvocationResult::Success);

    let cache = source.cache_for(&second.specification).unwrap();
    let hint = CacheSelectHint::all_shared();
    let pv = cache.get(&pv_spec("Pos~6"), &hint).unwrap();
    assert_eq!(pv, CacheValue::Present(serde_json::json!(125.0)));
}

/// A failed producer leaves a definite marker; the whole job still returns.
#[test]
fn failed_producer_marks_its_outputs() {
    init_tracing();
    let source = Arc::new(CacheSource::new(0));
    let node = Arc::new(CalculationNode::new(
        Arc::clone(&source),
        repository(),
        "gridhost/1/3",
    ));
    let directory = JobDirectory::new();

    let mut failing = market_item("Pos~8", 1.0, ExecutionLogMode::Indicators);
    failing.function_id = "FailFn".into();
    let sent = job(8, vec![failing, pv_item("Pos~8", 1.0, ExecutionLogMode::Indicators)]);
    let returned = round_trip(&node, &sent, &directory).unwrap();

    assert_eq!(returned.items[0].result, InvocationResult::FunctionThrewException);
    assert_eq!(returned.items[1].result, InvocationResult::MissingInputs);

    let cache = source.cache_for(&sent.specification).unwrap();
    let hint = CacheSelectHint::all_shared();
    assert_eq!(
        cache.get(&market_spec("Pos~8"), &hint).unwrap(),
        CacheValue::Marker(MissingOutput::EvaluationError)
    );
    assert_eq!(
        cache.get(&pv_spec("Pos~8"), &hint).unwrap(),
        CacheValue::Marker(MissingOutput::MissingInputs)
    );
}

/// A stale function repository fails the job with no partial result.
#[test]
fn stale_repository_is_job_fatal() {
    init_tracing();
    let directory = JobDirectory::new();
    let node = node();

    let mut sent = job(9, vec![market_item("Pos~9", 1.0, ExecutionLogMode::None)]);
    sent.function_init_id = INIT_ID + 1;
    let received = transmit_job(&sent, &directory);
    let err = node.execute_job(&received).unwrap_err();
    assert!(matches!(err, JobError::StaleFunctionRepository { .. }));
}

/// Jobs dispatched through the executor pool come back tagged and complete.
#[tokio::test]
async fn executor_runs_dispatched_jobs() -> anyhow::Result<()> {
    init_tracing();
    let (job_tx, job_rx) = mpsc::unbounded_channel();
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

    let settings = quantgrid_core::config::NodeSettings {
        max_concurrent_jobs: 2,
        host_name: String::new(),
    };
    tokio::spawn(quantgrid_engine::executor::run(
        node(),
        settings,
        job_rx,
        outcome_tx,
    ));

    let directory = JobDirectory::new();
    for job_id in 10..14 {
        let sent = job(
            job_id,
            vec![market_item(&format!("Pos~{}", job_id), 1.0, ExecutionLogMode::None)],
        );
        job_tx.send(transmit_job(&sent, &directory))?;
    }
    drop(job_tx);

    let mut seen = Vec::new();
    for _ in 0..4 {
        let JobOutcome { job_id, outcome } = outcome_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("executor dropped outcomes"))?;
        let result = outcome.map_err(|e| anyhow::anyhow!(e))?;
        assert_eq!(result.items.len(), 1);
        seen.push(job_id);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![10, 11, 12, 13]);
    Ok(())
}
