//! Job executor — drains a channel of dispatched jobs and runs each on a
//! calculation node, bounded by a worker-slot semaphore.
//!
//! Jobs run concurrently up to the configured slot count; items within one
//! job stay strictly sequential inside `CalculationNode::execute_job`. Each
//! finished job sends a `JobOutcome` back tagged with its job id, carrying
//! either the sealed result or the job-fatal error for the coordinator's
//! retry decision.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Semaphore;

use quantgrid_core::config::NodeSettings;
use quantgrid_core::job::CalculationJob;
use quantgrid_core::result::CalculationJobResult;

use crate::node::{CalculationNode, JobError};

/// Outcome of one dispatched job.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: u64,
    pub outcome: Result<CalculationJobResult, JobError>,
}

/// Runs until the job channel closes.
pub async fn run(
    node: Arc<CalculationNode>,
    settings: NodeSettings,
    mut job_rx: mpsc::UnboundedReceiver<CalculationJob>,
    outcome_tx: mpsc::UnboundedSender<JobOutcome>,
) {
    let max_jobs = if settings.max_concurrent_jobs == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    } else {
        settings.max_concurrent_jobs as usize
    };

    let semaphore = Arc::new(Semaphore::new(max_jobs));

    tracing::info!(max_concurrent = max_jobs, node = node.node_id(), "job executor started");

    while let Some(job) = job_rx.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break, // semaphore closed
        };

        let node = Arc::clone(&node);
        let outcome_tx = outcome_tx.clone();

        tokio::spawn(async move {
            let job_id = job.specification.job_id;

            // execute_job is synchronous CPU work; keep it off the runtime.
            let outcome = match tokio::task::spawn_blocking(move || node.execute_job(&job)).await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(JobError::Aborted(join_err.to_string())),
            };

            match &outcome {
                Ok(result) => tracing::info!(
                    job_id,
                    ok = result.succeeded(),
                    failed = result.failed(),
                    "job finished"
                ),
                Err(err) => tracing::warn!(job_id, error = %err, "job failed"),
            }

            let _ = outcome_tx.send(JobOutcome { job_id, outcome });

            drop(permit);
        });
    }

    tracing::info!("job executor stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
