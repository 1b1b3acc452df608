//! Partitioned value cache for one view cycle.
//!
//! One cache exists per (view cycle, calculation configuration). The shared
//! partition outlives individual jobs: it holds values visible across all
//! jobs in the cycle and is reused by later cycles that share unchanged
//! upstream values. The private partition belongs to one job and is dropped
//! with the cache handle once the job's result has been returned.
//!
//! Writes to the same key are idempotent (same function, same inputs, same
//! output), so last-writer-wins is acceptable under concurrent jobs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use quantgrid_core::job::{CacheSelectHint, CalculationJobSpecification};
use quantgrid_core::value::{ComputedValue, MissingOutput, ValueSpecification};

type Partition = DashMap<Arc<ValueSpecification>, CacheValue>;

/// One slot in the cache: either a real computed value or a marker recording
/// why the producing item could not supply one.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Present(serde_json::Value),
    Marker(MissingOutput),
}

impl CacheValue {
    /// The payload, unless this slot is a marker.
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            CacheValue::Present(v) => Some(v),
            CacheValue::Marker(_) => None,
        }
    }
}

// ── Cache handle ──────────────────────────────────────────────────────────────

/// Handle to the cache for one job: the cycle's shared partition plus a
/// job-scoped private partition. Cheap to clone; clones share both
/// partitions.
#[derive(Debug, Clone)]
pub struct ComputationCache {
    shared: Arc<Partition>,
    private: Arc<Partition>,
}

impl ComputationCache {
    fn new(shared: Arc<Partition>) -> Self {
        Self {
            shared,
            private: Arc::new(DashMap::new()),
        }
    }

    /// A standalone cache with a fresh shared partition. For tests and
    /// single-job tools.
    pub fn standalone() -> Self {
        Self::new(Arc::new(DashMap::new()))
    }

    /// Read one value. The hint decides which partition holds the key; a
    /// value never moves between partitions after being written.
    pub fn get(&self, spec: &ValueSpecification, hint: &CacheSelectHint) -> Option<CacheValue> {
        let partition = if hint.is_private(spec) {
            &self.private
        } else {
            &self.shared
        };
        partition.get(spec).map(|entry| entry.value().clone())
    }

    /// Write one computed value under the hint's partition.
    pub fn put_value(&self, value: ComputedValue, hint: &CacheSelectHint) {
        let partition = if hint.is_private(&value.specification) {
            &self.private
        } else {
            &self.shared
        };
        partition.insert(value.specification, CacheValue::Present(value.value));
    }

    /// Write a batch of computed values.
    pub fn put_values(&self, values: impl IntoIterator<Item = ComputedValue>, hint: &CacheSelectHint) {
        for value in values {
            self.put_value(value, hint);
        }
    }

    /// Write a missing-output marker so downstream items see a definite
    /// "not computable" rather than an absent slot.
    pub fn put_marker(
        &self,
        spec: Arc<ValueSpecification>,
        marker: MissingOutput,
        hint: &CacheSelectHint,
    ) {
        let partition = if hint.is_private(&spec) {
            &self.private
        } else {
            &self.shared
        };
        partition.insert(spec, CacheValue::Marker(marker));
    }

    pub fn shared_len(&self) -> usize {
        self.shared.len()
    }

    pub fn private_len(&self) -> usize {
        self.private.len()
    }
}

// ── Cache source ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache source is shut down")]
    Unavailable,
}

/// Hands out one cache handle per job, sharing the cycle-scoped partition
/// between jobs of the same (cycle, configuration).
///
/// Retains at most `retain_cycles` shared partitions, dropping the oldest
/// when a new cycle arrives, so long-running workers do not accumulate every
/// cycle ever seen.
pub struct CacheSource {
    partitions: DashMap<(u64, String), Arc<Partition>>,
    /// Insertion order of partition keys, for eviction.
    order: Mutex<VecDeque<(u64, String)>>,
    retain_cycles: u32,
    closed: AtomicBool,
}

impl CacheSource {
    /// 0 retains every cycle.
    pub fn new(retain_cycles: u32) -> Self {
        Self {
            partitions: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            retain_cycles,
            closed: AtomicBool::new(false),
        }
    }

    /// The cache for one job. Fails once the source has been shut down; the
    /// caller must treat that as job-fatal.
    pub fn cache_for(
        &self,
        spec: &CalculationJobSpecification,
    ) -> Result<ComputationCache, CacheError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable);
        }
        let key = (spec.view_cycle_id, spec.calc_config_name.clone());
        let shared = match self.partitions.get(&key) {
            Some(existing) => Arc::clone(existing.value()),
            None => {
                let created = Arc::new(DashMap::new());
                let shared = Arc::clone(
                    self.partitions
                        .entry(key.clone())
                        .or_insert_with(|| Arc::clone(&created))
                        .value(),
                );
                self.record_and_evict(key);
                shared
            }
        };
        Ok(ComputationCache::new(shared))
    }

    /// Drop the shared partition for one finished view cycle.
    pub fn release_cycle(&self, view_cycle_id: u64, calc_config_name: &str) {
        let key = (view_cycle_id, calc_config_name.to_string());
        if self.partitions.remove(&key).is_some() {
            tracing::debug!(
                cycle = view_cycle_id,
                config = calc_config_name,
                "released shared cache partition"
            );
        }
        self.order.lock().unwrap().retain(|k| *k != key);
    }

    /// Refuse all further cache requests. Jobs already holding a handle keep
    /// their partitions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn record_and_evict(&self, key: (u64, String)) {
        let mut order = self.order.lock().unwrap();
        if !order.contains(&key) {
            order.push_back(key);
        }
        if self.retain_cycles > 0 {
            while order.len() > self.retain_cycles as usize {
                if let Some(oldest) = order.pop_front() {
                    self.partitions.remove(&oldest);
                    tracing::debug!(cycle = oldest.0, config = %oldest.1, "evicted shared cache partition");
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
