//! Wire-boundary conversion — specifications become compact integer
//! identifiers immediately before the transport encodes a job, and integers
//! become shared specification instances immediately after it decodes one.
//!
//! The transport itself (message bus, RPC, binary schema encoding) is an
//! external collaborator; these types are the logical payload it carries.
//! The conversion walks the whole job (every item's target and value
//! specifications, plus the cache select hint) and, on the return trip, the
//! result items' missing-input specifications.
//!
//! Resolving an identifier the directory never issued means the peers no
//! longer share a directory (stale map, restarted node). That is a protocol
//! error: the conversion aborts rather than fabricate a specification.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::execlog::{ExecutionLog, ExecutionLogMode};
use crate::ident::IdentifierMap;
use crate::job::{CacheSelectHint, CalculationJob, CalculationJobItem, CalculationJobSpecification};
use crate::result::{CalculationJobResult, CalculationJobResultItem, InvocationResult};
use crate::value::{TargetSpecification, ValueSpecification};

// ── Directory ─────────────────────────────────────────────────────────────────

/// The interning directories both sides of one transport share: one for value
/// specifications, one for target specifications.
#[derive(Debug, Default)]
pub struct JobDirectory {
    pub values: IdentifierMap<ValueSpecification>,
    pub targets: IdentifierMap<TargetSpecification>,
}

impl JobDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown value specification identifier: {0}")]
    UnknownValueIdentifier(u64),

    #[error("unknown target specification identifier: {0}")]
    UnknownTargetIdentifier(u64),
}

// ── Wire forms ────────────────────────────────────────────────────────────────

/// One job item with specifications replaced by identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireJobItem {
    pub function_id: String,
    pub function_parameters: serde_json::Value,
    pub target_id: u64,
    pub input_ids: Vec<u64>,
    pub output_ids: Vec<u64>,
    pub log_mode: ExecutionLogMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCacheSelectHint {
    pub spec_ids: Vec<u64>,
    pub private: bool,
}

/// A complete job ready for the transport encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireJob {
    pub specification: CalculationJobSpecification,
    pub function_init_id: u64,
    pub required_job_ids: Vec<u64>,
    pub items: Vec<WireJobItem>,
    pub cache_select_hint: WireCacheSelectHint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResultItem {
    pub result: InvocationResult,
    pub execution_log: ExecutionLog,
    pub missing_input_ids: Vec<u64>,
}

/// A complete result ready for the return trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResult {
    pub specification: CalculationJobSpecification,
    pub duration_ns: u64,
    pub items: Vec<WireResultItem>,
    pub node_id: String,
}

// ── Outbound walk ─────────────────────────────────────────────────────────────

/// Replace every specification in the job with its interned identifier.
pub fn job_to_wire(job: &CalculationJob, directory: &JobDirectory) -> WireJob {
    let items = job
        .items
        .iter()
        .map(|item| WireJobItem {
            function_id: item.function_id.clone(),
            function_parameters: item.function_parameters.clone(),
            target_id: directory.targets.intern_arc(&item.target),
            input_ids: item
                .inputs
                .iter()
                .map(|spec| directory.values.intern_arc(spec))
                .collect(),
            output_ids: item
                .outputs
                .iter()
                .map(|spec| directory.values.intern_arc(spec))
                .collect(),
            log_mode: item.log_mode,
        })
        .collect();
    let (hint_specs, private) = job.cache_select_hint.clone().into_parts();
    WireJob {
        specification: job.specification.clone(),
        function_init_id: job.function_init_id,
        required_job_ids: job.required_job_ids.clone(),
        items,
        cache_select_hint: WireCacheSelectHint {
            spec_ids: hint_specs
                .iter()
                .map(|spec| directory.values.intern_arc(spec))
                .collect(),
            private,
        },
    }
}

/// Replace every specification embedded in the result (the missing-input
/// sets) with its interned identifier. Symmetric with job transmission.
pub fn result_to_wire(result: &CalculationJobResult, directory: &JobDirectory) -> WireResult {
    WireResult {
        specification: result.specification.clone(),
        duration_ns: result.duration.as_nanos() as u64,
        items: result
            .items
            .iter()
            .map(|item| WireResultItem {
                result: item.result,
                execution_log: item.execution_log.clone(),
                missing_input_ids: item
                    .missing_inputs
                    .iter()
                    .map(|spec| directory.values.intern_arc(spec))
                    .collect(),
            })
            .collect(),
        node_id: result.node_id.clone(),
    }
}

// ── Inbound walk ──────────────────────────────────────────────────────────────

fn resolve_value(directory: &JobDirectory, id: u64) -> Result<Arc<ValueSpecification>, WireError> {
    directory
        .values
        .resolve(id)
        .ok_or(WireError::UnknownValueIdentifier(id))
}

/// Resolve every identifier back into its shared specification instance.
/// Fails, aborting the job, if any identifier is unknown to the directory.
pub fn job_from_wire(wire: WireJob, directory: &JobDirectory) -> Result<CalculationJob, WireError> {
    let mut items = Vec::with_capacity(wire.items.len());
    for item in wire.items {
        let target = directory
            .targets
            .resolve(item.target_id)
            .ok_or(WireError::UnknownTargetIdentifier(item.target_id))?;
        let inputs = item
            .input_ids
            .iter()
            .map(|&id| resolve_value(directory, id))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = item
            .output_ids
            .iter()
            .map(|&id| resolve_value(directory, id))
            .collect::<Result<Vec<_>, _>>()?;
        items.push(CalculationJobItem {
            function_id: item.function_id,
            function_parameters: item.function_parameters,
            target,
            inputs,
            outputs,
            log_mode: item.log_mode,
        });
    }
    let hint_specs = wire
        .cache_select_hint
        .spec_ids
        .iter()
        .map(|&id| resolve_value(directory, id))
        .collect::<Result<BTreeSet<_>, _>>()?;
    let hint = CacheSelectHint::from_parts(hint_specs, wire.cache_select_hint.private);
    Ok(
        CalculationJob::new(wire.specification, wire.function_init_id, items, hint)
            .with_required_jobs(wire.required_job_ids),
    )
}

/// The return-trip inverse of [`result_to_wire`].
pub fn result_from_wire(
    wire: WireResult,
    directory: &JobDirectory,
) -> Result<CalculationJobResult, WireError> {
    let mut items = Vec::with_capacity(wire.items.len());
    for item in wire.items {
        let missing = item
            .missing_input_ids
            .iter()
            .map(|&id| resolve_value(directory, id))
            .collect::<Result<Vec<_>, _>>()?;
        items.push(CalculationJobResultItem {
            result: item.result,
            execution_log: item.execution_log,
            missing_inputs: missing,
        });
    }
    Ok(CalculationJobResult::new(
        wire.specification,
        Duration::from_nanos(wire.duration_ns),
        items,
        wire.node_id,
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
