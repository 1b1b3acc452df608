//! The calculation node — executes one job at a time, item by item.
//!
//! Per item: resolve inputs from the cache, invoke the function, write the
//! declared outputs, classify the outcome. A bad item never aborts the batch;
//! its failure is contained and the loop moves on. Only conditions that make
//! the whole job meaningless (stale function repository, unreachable cache,
//! cancellation) are job-fatal, and those produce no partial result.
//!
//! One node executes one job at a time. Run several nodes against the same
//! cache source and function repository to execute jobs concurrently.

use std::backtrace::Backtrace;
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use quantgrid_core::execlog::{ExecutionLogMode, MutableExecutionLog};
use quantgrid_core::job::{CalculationJob, CalculationJobItem};
use quantgrid_core::result::{CalculationJobResult, CalculationJobResultItem};
use quantgrid_core::value::{ComputedValue, MissingOutput};

use crate::cache::{CacheError, CacheSource, CacheValue, ComputationCache};
use crate::function::{FunctionContext, FunctionError, FunctionInputs, FunctionRepository};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Job-fatal conditions. None of these yield a partial result; the
/// coordinator decides whether to redispatch.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("stale function repository: job compiled against {expected}, node holds {actual}")]
    StaleFunctionRepository { expected: u64, actual: u64 },

    #[error("job was cancelled before completion")]
    Cancelled,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("job execution aborted: {0}")]
    Aborted(String),
}

// ── Node ──────────────────────────────────────────────────────────────────────

static NODE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A worker node. Construct one per worker slot.
pub struct CalculationNode {
    cache_source: Arc<CacheSource>,
    functions: Arc<FunctionRepository>,
    node_id: String,
}

impl CalculationNode {
    pub fn new(
        cache_source: Arc<CacheSource>,
        functions: Arc<FunctionRepository>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            cache_source,
            functions,
            node_id: node_id.into(),
        }
    }

    /// A node with a generated `host/pid/seq` identifier. Pass an empty host
    /// name to auto-detect.
    pub fn with_generated_id(
        cache_source: Arc<CacheSource>,
        functions: Arc<FunctionRepository>,
        host_name: &str,
    ) -> Self {
        let id = create_node_id(host_name);
        Self::new(cache_source, functions, id)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Execute every item of a job, strictly in order, and seal the result.
    pub fn execute_job(&self, job: &CalculationJob) -> Result<CalculationJobResult, JobError> {
        tracing::info!(job = %job, node = %self.node_id, "executing job");
        if self.functions.init_id() != job.function_init_id {
            return Err(JobError::StaleFunctionRepository {
                expected: job.function_init_id,
                actual: self.functions.init_id(),
            });
        }
        let cache = self.cache_source.cache_for(&job.specification)?;

        let start = Instant::now();
        let mut result_items = Vec::with_capacity(job.items.len());
        for item in &job.items {
            if job.is_cancelled() {
                tracing::info!(job = %job.specification, node = %self.node_id, "job cancelled");
                return Err(JobError::Cancelled);
            }
            result_items.push(self.execute_item(&cache, job, item));
        }
        let duration = start.elapsed();

        tracing::info!(
            job = %job.specification,
            node = %self.node_id,
            elapsed_us = duration.as_micros() as u64,
            "job executed"
        );
        Ok(CalculationJobResult::new(
            job.specification.clone(),
            duration,
            result_items,
            self.node_id.clone(),
        ))
    }

    fn execute_item(
        &self,
        cache: &ComputationCache,
        job: &CalculationJob,
        item: &CalculationJobItem,
    ) -> CalculationJobResultItem {
        let hint = &job.cache_select_hint;
        let mut log = MutableExecutionLog::new(item.log_mode);

        // Resolve inputs. A marker left by an upstream failure counts as
        // missing, exactly like an absent slot.
        let mut missing = Vec::new();
        let mut resolved = Vec::with_capacity(item.inputs.len());
        for spec in &item.inputs {
            match cache.get(spec, hint) {
                Some(CacheValue::Present(value)) => {
                    resolved.push(ComputedValue::new(Arc::clone(spec), value));
                }
                Some(CacheValue::Marker(_)) | None => missing.push(Arc::clone(spec)),
            }
        }
        if !missing.is_empty() {
            tracing::debug!(
                function = %item.function_id,
                missing = missing.len(),
                "not invoking, inputs missing"
            );
            self.post_evaluation_errors(cache, job, item, MissingOutput::MissingInputs);
            return CalculationJobResultItem::missing_inputs(log.freeze(), missing);
        }

        let Some(invoker) = self.functions.invoker(&item.function_id) else {
            log.set_exception(
                "InvalidFunction",
                format!("no function {} in repository", item.function_id),
                None,
            );
            self.post_evaluation_errors(cache, job, item, MissingOutput::EvaluationError);
            return CalculationJobResultItem::function_threw(log.freeze());
        };

        let inputs = FunctionInputs::new(resolved);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = FunctionContext::new(
                &mut log,
                job.specification.valuation_time_ms,
                &job.specification.calc_config_name,
            );
            invoker.invoke(&mut ctx, &item.target, &inputs, &item.function_parameters)
        }));

        match outcome {
            Ok(Ok(values)) => {
                // Accept only declared outputs; anything undelivered gets an
                // evaluation-error marker so downstream items see it failed.
                let mut undelivered: BTreeSet<_> = item.outputs.iter().cloned().collect();
                let mut accepted = Vec::with_capacity(values.len());
                for value in values {
                    if undelivered.remove(value.specification.as_ref()) {
                        accepted.push(value);
                    } else {
                        tracing::debug!(
                            function = %item.function_id,
                            spec = %value.specification,
                            "dropping non-requested result"
                        );
                    }
                }
                cache.put_values(accepted, hint);
                for spec in undelivered {
                    log.add(
                        quantgrid_core::execlog::LogLevel::Warn,
                        format!("declared output not produced: {}", spec),
                    );
                    cache.put_marker(spec, MissingOutput::EvaluationError, hint);
                }
                CalculationJobResultItem::success(log.freeze())
            }
            Ok(Err(FunctionError::MissingInputs(specs))) => {
                self.post_evaluation_errors(cache, job, item, MissingOutput::MissingInputs);
                CalculationJobResultItem::missing_inputs(log.freeze(), specs)
            }
            Ok(Err(FunctionError::Failed { kind, message })) => {
                tracing::warn!(function = %item.function_id, %kind, %message, "invocation error");
                log.set_exception(kind, message, capture_trace(item.log_mode));
                self.post_evaluation_errors(cache, job, item, MissingOutput::EvaluationError);
                CalculationJobResultItem::function_threw(log.freeze())
            }
            Err(payload) => {
                let message = panic_message(payload);
                tracing::warn!(function = %item.function_id, %message, "invocation panicked");
                log.set_exception("panic", message, capture_trace(item.log_mode));
                self.post_evaluation_errors(cache, job, item, MissingOutput::EvaluationError);
                CalculationJobResultItem::function_threw(log.freeze())
            }
        }
    }

    /// Write markers under every declared output of a failed item.
    fn post_evaluation_errors(
        &self,
        cache: &ComputationCache,
        job: &CalculationJob,
        item: &CalculationJobItem,
        marker: MissingOutput,
    ) {
        for spec in &item.outputs {
            cache.put_marker(Arc::clone(spec), marker, &job.cache_select_hint);
        }
    }
}

fn capture_trace(mode: ExecutionLogMode) -> Option<String> {
    match mode {
        ExecutionLogMode::Full => Some(Backtrace::force_capture().to_string()),
        _ => None,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// `host/pid/seq` node identifier, unique within one worker process.
pub fn create_node_id(host_name: &str) -> String {
    let host = if host_name.is_empty() {
        detect_host_name()
    } else {
        host_name.to_string()
    };
    let seq = NODE_SEQUENCE.fetch_add(1, Ordering::SeqCst) + 1;
    format!("{}/{}/{}", host, std::process::id(), seq)
}

fn detect_host_name() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
