//! The function contract — the seam between the engine and the quant library.
//!
//! Functions are opaque to the engine: they take a target, resolved inputs,
//! and a parameter blob, and either return their declared outputs or fail.
//! The execution-log handle is passed in explicitly through the context, so
//! whatever a function logs is attributed to exactly the item being executed,
//! under any concurrency model.

use std::collections::HashMap;
use std::sync::Arc;

use quantgrid_core::execlog::{LogLevel, MutableExecutionLog};
use quantgrid_core::value::{ComputedValue, TargetSpecification, ValueSpecification};

// ── Errors ────────────────────────────────────────────────────────────────────

/// How a function invocation fails.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FunctionError {
    /// Dedicated missing-inputs signal: the function inspected its inputs and
    /// declined to run. Classified as `MISSING_INPUTS`, not as a failure.
    #[error("function is missing required inputs")]
    MissingInputs(Vec<Arc<ValueSpecification>>),

    /// Anything else. `kind` is the error category or type name; it ends up
    /// in the result item's execution log.
    #[error("{kind}: {message}")]
    Failed { kind: String, message: String },
}

impl FunctionError {
    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

// ── Context and inputs ────────────────────────────────────────────────────────

/// Per-invocation context handed to function code. Carries the valuation
/// environment and the item's log channel.
pub struct FunctionContext<'a> {
    log: &'a mut MutableExecutionLog,
    /// Unix ms valuation instant of the job's cycle.
    pub valuation_time_ms: u64,
    pub calc_config_name: &'a str,
}

impl<'a> FunctionContext<'a> {
    pub fn new(
        log: &'a mut MutableExecutionLog,
        valuation_time_ms: u64,
        calc_config_name: &'a str,
    ) -> Self {
        Self {
            log,
            valuation_time_ms,
            calc_config_name,
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log.add(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log.add(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log.add(LogLevel::Error, message);
    }
}

/// The resolved input values for one invocation.
#[derive(Debug, Default)]
pub struct FunctionInputs {
    values: Vec<ComputedValue>,
}

impl FunctionInputs {
    pub fn new(values: Vec<ComputedValue>) -> Self {
        Self { values }
    }

    /// First input whose specification carries this value name.
    pub fn get(&self, value_name: &str) -> Option<&serde_json::Value> {
        self.values
            .iter()
            .find(|v| v.specification.value_name == value_name)
            .map(|v| &v.value)
    }

    /// Input under an exact specification.
    pub fn get_spec(&self, spec: &ValueSpecification) -> Option<&serde_json::Value> {
        self.values
            .iter()
            .find(|v| v.specification.as_ref() == spec)
            .map(|v| &v.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComputedValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ── Function trait and repository ─────────────────────────────────────────────

/// One function in the repository. Side-effect free aside from its declared
/// outputs; may fail, and failures are contained per item by the node.
pub trait CalcFunction: Send + Sync {
    fn invoke(
        &self,
        ctx: &mut FunctionContext<'_>,
        target: &TargetSpecification,
        inputs: &FunctionInputs,
        parameters: &serde_json::Value,
    ) -> Result<Vec<ComputedValue>, FunctionError>;
}

impl<F> CalcFunction for F
where
    F: Fn(
            &mut FunctionContext<'_>,
            &TargetSpecification,
            &FunctionInputs,
            &serde_json::Value,
        ) -> Result<Vec<ComputedValue>, FunctionError>
        + Send
        + Sync,
{
    fn invoke(
        &self,
        ctx: &mut FunctionContext<'_>,
        target: &TargetSpecification,
        inputs: &FunctionInputs,
        parameters: &serde_json::Value,
    ) -> Result<Vec<ComputedValue>, FunctionError> {
        self(ctx, target, inputs, parameters)
    }
}

/// The node's local function definitions, stamped with the repository version
/// the coordinator compiled against. A job carrying a different init id must
/// be refused: the worker needs to refresh its definitions first.
pub struct FunctionRepository {
    init_id: u64,
    functions: HashMap<String, Arc<dyn CalcFunction>>,
}

impl FunctionRepository {
    pub fn new(init_id: u64) -> Self {
        Self {
            init_id,
            functions: HashMap::new(),
        }
    }

    pub fn init_id(&self) -> u64 {
        self.init_id
    }

    pub fn register(&mut self, function_id: impl Into<String>, function: Arc<dyn CalcFunction>) {
        self.functions.insert(function_id.into(), function);
    }

    /// Register a plain closure.
    pub fn register_fn<F>(&mut self, function_id: impl Into<String>, function: F)
    where
        F: Fn(
                &mut FunctionContext<'_>,
                &TargetSpecification,
                &FunctionInputs,
                &serde_json::Value,
            ) -> Result<Vec<ComputedValue>, FunctionError>
            + Send
            + Sync
            + 'static,
    {
        self.register(function_id, Arc::new(function));
    }

    pub fn invoker(&self, function_id: &str) -> Option<Arc<dyn CalcFunction>> {
        self.functions.get(function_id).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
