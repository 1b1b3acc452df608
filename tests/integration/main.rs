//! End-to-end tests: coordinator-side job construction, the wire boundary
//! (specification ⇄ identifier conversion around a serde transport stand-in),
//! node execution, and the result's return trip.

mod execution;
mod interning;

use std::sync::{Arc, Once};

use quantgrid_core::execlog::ExecutionLogMode;
use quantgrid_core::job::{
    CacheSelectHint, CalculationJob, CalculationJobItem, CalculationJobSpecification,
};
use quantgrid_core::result::CalculationJobResult;
use quantgrid_core::value::{
    ComputedValue, TargetSpecification, TargetType, ValueProperties, ValueSpecification,
};
use quantgrid_core::wire::{
    job_from_wire, job_to_wire, result_from_wire, result_to_wire, JobDirectory, WireJob,
    WireResult,
};
use quantgrid_engine::{
    CacheSource, CalculationNode, FunctionError, FunctionRepository, JobError,
};

pub const INIT_ID: u64 = 20;
pub const VALUATION_MS: u64 = 1_700_000_000_000;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ── Shared fixture ────────────────────────────────────────────────────────────

pub fn target(id: &str) -> Arc<TargetSpecification> {
    Arc::new(TargetSpecification::new(TargetType::Position, id))
}

pub fn market_spec(target_id: &str) -> Arc<ValueSpecification> {
    Arc::new(ValueSpecification::new(
        "Market Value",
        TargetSpecification::new(TargetType::Position, target_id),
        ValueProperties::with_function("MarketDataFn"),
    ))
}

pub fn pv_spec(target_id: &str) -> Arc<ValueSpecification> {
    Arc::new(ValueSpecification::new(
        "Present Value",
        TargetSpecification::new(TargetType::Position, target_id),
        ValueProperties::with_function("PresentValueFn"),
    ))
}

/// MarketDataFn sources a quote from its parameters; PresentValueFn scales
/// the market value; FailFn fails the way the coordinator would see a quant
/// library exception; NoisyFn logs at every level and succeeds.
pub fn repository() -> Arc<FunctionRepository> {
    let mut repo = FunctionRepository::new(INIT_ID);
    repo.register_fn("MarketDataFn", |_ctx, target, _inputs, params| {
        let quote = params
            .get("quote")
            .cloned()
            .ok_or_else(|| FunctionError::failed("MissingQuote", "no quote parameter"))?;
        Ok(vec![ComputedValue::new(
            Arc::new(ValueSpecification::new(
                "Market Value",
                target.clone(),
                ValueProperties::with_function("MarketDataFn"),
            )),
            quote,
        )])
    });
    repo.register_fn("PresentValueFn", |ctx, target, inputs, params| {
        ctx.info("discounting to valuation date");
        let market = inputs
            .get("Market Value")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| FunctionError::failed("BadInput", "market value not numeric"))?;
        let factor = params.get("discount").and_then(|v| v.as_f64()).unwrap_or(1.0);
        Ok(vec![ComputedValue::new(
            Arc::new(ValueSpecification::new(
                "Present Value",
                target.clone(),
                ValueProperties::with_function("PresentValueFn"),
            )),
            serde_json::json!(market * factor),
        )])
    });
    repo.register_fn("FailFn", |_ctx, _target, _inputs, _params| {
        Err(FunctionError::failed("RuntimeException", "failure!"))
    });
    repo.register_fn("NoisyFn", |ctx, target, _inputs, _params| {
        ctx.info("starting");
        ctx.warn("stale quote tolerated");
        ctx.error("fallback curve in use");
        Ok(vec![ComputedValue::new(
            Arc::new(ValueSpecification::new(
                "Market Value",
                target.clone(),
                ValueProperties::with_function("MarketDataFn"),
            )),
            serde_json::json!(0.0),
        )])
    });
    Arc::new(repo)
}

pub fn node() -> Arc<CalculationNode> {
    Arc::new(CalculationNode::new(
        Arc::new(CacheSource::new(0)),
        repository(),
        "gridhost/1/1",
    ))
}

pub fn market_item(target_id: &str, quote: f64, log_mode: ExecutionLogMode) -> CalculationJobItem {
    CalculationJobItem {
        function_id: "MarketDataFn".into(),
        function_parameters: serde_json::json!({ "quote": quote }),
        target: target(target_id),
        inputs: vec![],
        outputs: vec![market_spec(target_id)],
        log_mode,
    }
}

pub fn pv_item(target_id: &str, discount: f64, log_mode: ExecutionLogMode) -> CalculationJobItem {
    CalculationJobItem {
        function_id: "PresentValueFn".into(),
        function_parameters: serde_json::json!({ "discount": discount }),
        target: target(target_id),
        inputs: vec![market_spec(target_id)],
        outputs: vec![pv_spec(target_id)],
        log_mode,
    }
}

pub fn job(job_id: u64, items: Vec<CalculationJobItem>) -> CalculationJob {
    CalculationJob::new(
        CalculationJobSpecification::new(1, "Default", VALUATION_MS, job_id),
        INIT_ID,
        items,
        CacheSelectHint::all_shared(),
    )
}

// ── Wire helpers ──────────────────────────────────────────────────────────────

/// Coordinator → transport → node: intern, encode, decode, resolve.
pub fn transmit_job(job: &CalculationJob, directory: &JobDirectory) -> CalculationJob {
    let wire = job_to_wire(job, directory);
    let bytes = serde_json::to_vec(&wire).expect("encode job");
    let decoded: WireJob = serde_json::from_slice(&bytes).expect("decode job");
    job_from_wire(decoded, directory).expect("resolve job")
}

/// Node → transport → coordinator, symmetric with job transmission.
pub fn transmit_result(
    result: &CalculationJobResult,
    directory: &JobDirectory,
) -> CalculationJobResult {
    let wire = result_to_wire(result, directory);
    let bytes = serde_json::to_vec(&wire).expect("encode result");
    let decoded: WireResult = serde_json::from_slice(&bytes).expect("decode result");
    result_from_wire(decoded, directory).expect("resolve result")
}

/// The full cycle: transmit the job, execute it, transmit the result back.
pub fn round_trip(
    node: &CalculationNode,
    job: &CalculationJob,
    directory: &JobDirectory,
) -> Result<CalculationJobResult, JobError> {
    let received = transmit_job(job, directory);
    let result = node.execute_job(&received)?;
    Ok(transmit_result(&result, directory))
}
