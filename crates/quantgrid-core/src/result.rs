//! The calculation result model — the aggregated outcome returned to the
//! coordinator, with enough metadata (timing, per-item status, originating
//! node) for scheduling and retry decisions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::execlog::ExecutionLog;
use crate::job::CalculationJobSpecification;
use crate::value::ValueSpecification;

/// How one item ended. Exactly one per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationResult {
    Success,
    /// A required input was absent from the cache. The function was never
    /// invoked. Expected during partial/incremental computation.
    MissingInputs,
    /// The function was invoked and failed. Detail is in the execution log.
    FunctionThrewException,
}

/// Outcome of one job item, in the same position as the item it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationJobResultItem {
    pub result: InvocationResult,
    pub execution_log: ExecutionLog,
    /// The inputs that were absent. Empty unless `MissingInputs`.
    pub missing_inputs: Vec<Arc<ValueSpecification>>,
}

impl CalculationJobResultItem {
    pub fn success(execution_log: ExecutionLog) -> Self {
        Self {
            result: InvocationResult::Success,
            execution_log,
            missing_inputs: Vec::new(),
        }
    }

    pub fn missing_inputs(
        execution_log: ExecutionLog,
        missing: Vec<Arc<ValueSpecification>>,
    ) -> Self {
        Self {
            result: InvocationResult::MissingInputs,
            execution_log,
            missing_inputs: missing,
        }
    }

    pub fn function_threw(execution_log: ExecutionLog) -> Self {
        Self {
            result: InvocationResult::FunctionThrewException,
            execution_log,
            missing_inputs: Vec::new(),
        }
    }
}

/// The sealed outcome of one job: one result item per job item, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationJobResult {
    pub specification: CalculationJobSpecification,
    /// Whole-job wall time measured on a monotonic clock spanning the item
    /// loop.
    pub duration: Duration,
    pub items: Vec<CalculationJobResultItem>,
    /// Identifier of the node that executed the job.
    pub node_id: String,
}

impl CalculationJobResult {
    pub fn new(
        specification: CalculationJobSpecification,
        duration: Duration,
        items: Vec<CalculationJobResultItem>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            specification,
            duration,
            items,
            node_id: node_id.into(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.result == InvocationResult::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

impl fmt::Display for CalculationJobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} items ok in {:?} on {}",
            self.specification,
            self.succeeded(),
            self.items.len(),
            self.duration,
            self.node_id
        )
    }
}
