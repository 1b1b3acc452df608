//! Bidirectional interning directory mapping specifications to compact
//! integer identifiers.
//!
//! A target or value specification typically repeats across dozens of items
//! in one job. At the wire boundary each distinct specification is sent once
//! and referenced by a small integer everywhere else; on the way back in,
//! every reference to one identifier resolves to the *same* shared `Arc`
//! instance, so repeated structural data is also deduplicated in memory.
//!
//! Identity is structural equality, never reference. Intern is an atomic
//! check-then-insert: two threads interning equal specifications always get
//! the same identifier.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Interning directory for one specification type.
///
/// A purely in-memory directory is valid for a single process pair exchanging
/// one job/result round trip; coordinator and node agree on identifiers only
/// when they share the same directory instance (or a distributed backing).
#[derive(Debug)]
pub struct IdentifierMap<T: Eq + Hash> {
    forward: DashMap<Arc<T>, u64>,
    reverse: DashMap<u64, Arc<T>>,
    next_id: AtomicU64,
}

impl<T: Eq + Hash> Default for IdentifierMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash> IdentifierMap<T> {
    pub fn new() -> Self {
        Self {
            forward: DashMap::new(),
            reverse: DashMap::new(),
            // 0 is reserved so an all-zero wire field is never a valid id.
            next_id: AtomicU64::new(1),
        }
    }

    /// Intern a specification, assigning the next sequential identifier to a
    /// previously-unseen one and returning the existing identifier otherwise.
    pub fn intern(&self, value: &T) -> u64
    where
        T: Clone,
    {
        if let Some(id) = self.forward.get(value) {
            return *id;
        }
        let owned = Arc::new(value.clone());
        match self.forward.entry(Arc::clone(&owned)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                // Reverse first: once intern returns, resolve must succeed.
                self.reverse.insert(id, owned);
                entry.insert(id);
                id
            }
        }
    }

    /// Intern an already-shared instance without cloning the payload.
    pub fn intern_arc(&self, value: &Arc<T>) -> u64 {
        if let Some(id) = self.forward.get(value.as_ref()) {
            return *id;
        }
        match self.forward.entry(Arc::clone(value)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                self.reverse.insert(id, Arc::clone(value));
                entry.insert(id);
                id
            }
        }
    }

    /// The canonical shared instance for an identifier. None means the
    /// identifier was never issued by this directory (stale map or restarted
    /// peer) and the caller must treat the job as fatally corrupt.
    pub fn resolve(&self, id: u64) -> Option<Arc<T>> {
        self.reverse.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// The identifier for a specification, if already interned.
    pub fn lookup(&self, value: &T) -> Option<u64> {
        self.forward.get(value).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }
}
