//! The calculation job model — the unit of work sent to a worker node.
//!
//! A job is built once by the coordinator, is immutable in transit, and is
//! discarded once the corresponding result comes back. Items execute strictly
//! in list order: later items may consume outputs written by earlier items in
//! the same job.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::execlog::ExecutionLogMode;
use crate::value::{TargetSpecification, ValueSpecification};

// ── Job specification ─────────────────────────────────────────────────────────

/// Identifies one batch of work. Also the cache-partition key: all jobs in a
/// view cycle with the same calculation configuration share one cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalculationJobSpecification {
    pub view_cycle_id: u64,
    pub calc_config_name: String,
    /// Unix ms valuation instant for the cycle.
    pub valuation_time_ms: u64,
    /// Sequence number within the cycle.
    pub job_id: u64,
}

impl CalculationJobSpecification {
    pub fn new(
        view_cycle_id: u64,
        calc_config_name: impl Into<String>,
        valuation_time_ms: u64,
        job_id: u64,
    ) -> Self {
        Self {
            view_cycle_id,
            calc_config_name: calc_config_name.into(),
            valuation_time_ms,
            job_id,
        }
    }
}

impl fmt::Display for CalculationJobSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job {} [cycle {}, config {}]",
            self.job_id, self.view_cycle_id, self.calc_config_name
        )
    }
}

// ── Cache select hint ─────────────────────────────────────────────────────────

/// Per-job decision of which partition each value lives in.
///
/// Carries one set of specifications and a flag saying whether that set names
/// the private values or the shared ones, so whichever side is smaller pays
/// the wire cost. A value's partition is decided before the job runs and
/// never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSelectHint {
    specs: BTreeSet<Arc<ValueSpecification>>,
    /// True when `specs` lists the private values, false when it lists the
    /// shared ones.
    private: bool,
}

impl CacheSelectHint {
    /// Every value in the shared partition.
    pub fn all_shared() -> Self {
        Self {
            specs: BTreeSet::new(),
            private: true,
        }
    }

    /// Every value in the private partition.
    pub fn all_private() -> Self {
        Self {
            specs: BTreeSet::new(),
            private: false,
        }
    }

    /// The listed values are private; everything else is shared.
    pub fn private_values(specs: impl IntoIterator<Item = Arc<ValueSpecification>>) -> Self {
        Self {
            specs: specs.into_iter().collect(),
            private: true,
        }
    }

    /// The listed values are shared; everything else is private.
    pub fn shared_values(specs: impl IntoIterator<Item = Arc<ValueSpecification>>) -> Self {
        Self {
            specs: specs.into_iter().collect(),
            private: false,
        }
    }

    pub fn is_private(&self, spec: &ValueSpecification) -> bool {
        if self.private {
            self.specs.contains(spec)
        } else {
            !self.specs.contains(spec)
        }
    }

    pub fn is_shared(&self, spec: &ValueSpecification) -> bool {
        !self.is_private(spec)
    }

    pub(crate) fn into_parts(self) -> (BTreeSet<Arc<ValueSpecification>>, bool) {
        (self.specs, self.private)
    }

    pub(crate) fn from_parts(specs: BTreeSet<Arc<ValueSpecification>>, private: bool) -> Self {
        Self { specs, private }
    }
}

// ── Job items ─────────────────────────────────────────────────────────────────

/// One function invocation unit within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationJobItem {
    /// Identifier in the node's function repository.
    pub function_id: String,
    /// Opaque configuration blob handed to the function untouched.
    pub function_parameters: serde_json::Value,
    pub target: Arc<TargetSpecification>,
    pub inputs: Vec<Arc<ValueSpecification>>,
    pub outputs: Vec<Arc<ValueSpecification>>,
    /// Log capture granularity for this item, chosen by the coordinator.
    pub log_mode: ExecutionLogMode,
}

/// A complete unit of distributed work: an ordered batch of function
/// invocations against one cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationJob {
    pub specification: CalculationJobSpecification,
    /// Function-repository version the coordinator compiled against. A node
    /// holding a different version must refuse the job.
    pub function_init_id: u64,
    /// Jobs whose outputs this one depends on. Opaque re-submission
    /// bookkeeping for the coordinator; never consulted by the node.
    pub required_job_ids: Vec<u64>,
    pub items: Vec<CalculationJobItem>,
    pub cache_select_hint: CacheSelectHint,
    /// Set to abandon the job. Checked between items only; an in-flight
    /// function call is never interrupted.
    #[serde(skip)]
    cancelled: Arc<AtomicBool>,
}

impl CalculationJob {
    pub fn new(
        specification: CalculationJobSpecification,
        function_init_id: u64,
        items: Vec<CalculationJobItem>,
        cache_select_hint: CacheSelectHint,
    ) -> Self {
        Self {
            specification,
            function_init_id,
            required_job_ids: Vec::new(),
            items,
            cache_select_hint,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_required_jobs(mut self, job_ids: Vec<u64>) -> Self {
        self.required_job_ids = job_ids;
        self
    }

    /// Request abandonment before the next item starts.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Display for CalculationJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} items)", self.specification, self.items.len())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
