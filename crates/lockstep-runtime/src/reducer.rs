//! Schedule reduction.
//!
//! A reducer prunes the enabled set handed to the strategy at each
//! scheduling point, keeping exploration sound while skipping choices
//! that cannot matter. The built-in shared-state reducer accumulates
//! which shared-state keys have ever been read and written across the
//! whole run, and prefers operations whose latest action is a read of a
//! key no write has ever touched: such reads commute with every other
//! enabled operation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::{ControlledOperation, OperationId};
use crate::scheduling_point::SchedulingPoint;

// ---------------------------------------------------------------------------
// ScheduleReducer — pluggable reduction contract
// ---------------------------------------------------------------------------

/// Contract for pruning the enabled set before the strategy chooses.
///
/// A reducer must never return an empty set for a non-empty input, and
/// must only shrink sets in ways that keep every distinguishable
/// interleaving reachable across the run.
pub trait ScheduleReducer: fmt::Debug {
    /// Called before each iteration starts. Accumulated knowledge may
    /// persist across iterations.
    fn initialize_next_iteration(&mut self, iteration: u32);

    /// Prune `ops`, the currently enabled operations, given the operation
    /// that just reached a scheduling point.
    fn reduce(
        &mut self,
        ops: &[&ControlledOperation],
        current: &ControlledOperation,
    ) -> Vec<OperationId>;

    /// Human-readable description for logs.
    fn description(&self) -> String;
}

// ---------------------------------------------------------------------------
// SharedStateReducer — read-only commutativity reduction
// ---------------------------------------------------------------------------

/// Reducer that exploits read-only shared-state knowledge.
///
/// The read-only classification is approximate: a key considered
/// read-only now may be written later in the run. The guarantee is
/// per-step and exploration continues across iterations, so no
/// interleaving is permanently lost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedStateReducer {
    /// Keys ever observed at a read scheduling point.
    read_accesses: BTreeSet<String>,
    /// Keys ever observed at a write scheduling point.
    write_accesses: BTreeSet<String>,
}

impl SharedStateReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_accesses(&self) -> &BTreeSet<String> {
        &self.read_accesses
    }

    pub fn write_accesses(&self) -> &BTreeSet<String> {
        &self.write_accesses
    }

    /// Whether any write this run has hit the key, under the operation's
    /// equivalence policy when it carries one.
    fn written(&self, op: &ControlledOperation, key: &str) -> bool {
        self.write_accesses.iter().any(|written| match op.last_key_equivalence() {
            Some(equivalence) => equivalence.equivalent(key, written),
            None => key == written,
        })
    }
}

impl ScheduleReducer for SharedStateReducer {
    fn initialize_next_iteration(&mut self, _iteration: u32) {
        // Accumulated access knowledge must persist across iterations.
    }

    fn reduce(
        &mut self,
        ops: &[&ControlledOperation],
        _current: &ControlledOperation,
    ) -> Vec<OperationId> {
        // An explicit interleave or yield request disables reduction.
        if ops
            .iter()
            .any(|op| op.last_scheduling_point().is_interleave_or_yield())
        {
            return ops.iter().map(|op| op.id()).collect();
        }

        // Operations paused at non-read/write points pass through untouched.
        let non_read_write: Vec<OperationId> = ops
            .iter()
            .filter(|op| !op.last_scheduling_point().is_read_or_write())
            .map(|op| op.id())
            .collect();
        if !non_read_write.is_empty() {
            return non_read_write;
        }

        // Everything is paused at a read or a write: grow the access sets.
        for op in ops {
            if let Some(key) = op.last_accessed_shared_state() {
                match op.last_scheduling_point() {
                    SchedulingPoint::Read => {
                        self.read_accesses.insert(key.to_string());
                    }
                    SchedulingPoint::Write => {
                        self.write_accesses.insert(key.to_string());
                    }
                    _ => {}
                }
            }
        }

        // Reads of keys no write has ever touched commute with everything.
        let read_only: Vec<OperationId> = ops
            .iter()
            .filter(|op| op.last_scheduling_point() == SchedulingPoint::Read)
            .filter(|op| match op.last_accessed_shared_state() {
                Some(key) => !self.written(op, key),
                None => false,
            })
            .map(|op| op.id())
            .collect();
        if !read_only.is_empty() {
            return read_only;
        }

        ops.iter().map(|op| op.id()).collect()
    }

    fn description(&self) -> String {
        format!(
            "shared_state(reads={}, writes={})",
            self.read_accesses.len(),
            self.write_accesses.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
