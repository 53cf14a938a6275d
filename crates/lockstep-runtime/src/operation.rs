//! Controlled operations: the schedulable unit of work.
//!
//! A controlled operation is one logical task whose execution the driver
//! serializes. It carries the bookkeeping the reducer and the execution
//! graph consume: its last scheduling point, the last shared-state key it
//! touched, and the append-only list of call sites it has visited this
//! iteration. Mutation is confined to the driver and the instrumentation
//! callbacks; everything else sees read-only accessors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::equivalence::KeyEquivalence;
use crate::error::RuntimeError;
use crate::scheduling_point::SchedulingPoint;

/// Identifier of a controlled operation, unique within one iteration.
pub type OperationId = u64;

// ---------------------------------------------------------------------------
// OperationStatus — lifecycle states
// ---------------------------------------------------------------------------

/// Lifecycle state of a controlled operation.
///
/// Transitions follow `Created -> Enabled <-> Blocked -> Completed`;
/// completion is reachable only from `Enabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Created,
    Enabled,
    Blocked,
    Completed,
}

impl OperationStatus {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Enabled => write!(f, "enabled"),
            Self::Blocked => write!(f, "blocked"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

// ---------------------------------------------------------------------------
// ControlledOperation — one schedulable logical task
// ---------------------------------------------------------------------------

/// One schedulable logical task, serialized by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlledOperation {
    id: OperationId,
    /// Spawning operation; `None` exactly for the root.
    parent_id: Option<OperationId>,
    /// Creation order within the iteration.
    sequence_id: u64,
    is_root: bool,
    status: OperationStatus,
    last_scheduling_point: SchedulingPoint,
    last_accessed_shared_state: Option<String>,
    last_key_equivalence: Option<KeyEquivalence>,
    /// Append-only within an iteration.
    visited_call_sites: Vec<String>,
    last_hashed_program_state: i32,
}

impl ControlledOperation {
    pub(crate) fn new(id: OperationId, parent_id: Option<OperationId>, sequence_id: u64) -> Self {
        Self {
            id,
            parent_id,
            sequence_id,
            is_root: parent_id.is_none(),
            status: OperationStatus::Created,
            last_scheduling_point: SchedulingPoint::Default,
            last_accessed_shared_state: None,
            last_key_equivalence: None,
            visited_call_sites: Vec::new(),
            last_hashed_program_state: 0,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn parent_id(&self) -> Option<OperationId> {
        self.parent_id
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn last_scheduling_point(&self) -> SchedulingPoint {
        self.last_scheduling_point
    }

    /// Shared-state key reported at the last read/write point, if any.
    pub fn last_accessed_shared_state(&self) -> Option<&str> {
        self.last_accessed_shared_state.as_deref()
    }

    /// Equivalence policy attached to the last reported key, if any.
    pub fn last_key_equivalence(&self) -> Option<KeyEquivalence> {
        self.last_key_equivalence
    }

    /// Call sites visited this iteration, in visitation order.
    pub fn visited_call_sites(&self) -> &[String] {
        &self.visited_call_sites
    }

    /// Program-state hash supplied by instrumentation at the last point.
    pub fn last_hashed_program_state(&self) -> i32 {
        self.last_hashed_program_state
    }

    /// Record a visited call site between scheduling points.
    pub(crate) fn record_visited_call_site(
        &mut self,
        call_site: String,
    ) -> Result<(), RuntimeError> {
        if self.status.is_terminal() {
            return Err(RuntimeError::OperationAlreadyCompleted { id: self.id });
        }
        self.visited_call_sites.push(call_site);
        Ok(())
    }

    /// Record a scheduling point reached by this operation.
    pub(crate) fn record_scheduling_point(
        &mut self,
        point: SchedulingPoint,
        shared_state_key: Option<String>,
        key_equivalence: Option<KeyEquivalence>,
        call_site: String,
        program_state_hash: i32,
    ) -> Result<(), RuntimeError> {
        if self.status.is_terminal() {
            return Err(RuntimeError::OperationAlreadyCompleted { id: self.id });
        }
        self.last_scheduling_point = point;
        self.last_accessed_shared_state = shared_state_key;
        self.last_key_equivalence = key_equivalence;
        self.visited_call_sites.push(call_site);
        self.last_hashed_program_state = program_state_hash;
        Ok(())
    }

    /// Drive the operation through its lifecycle lattice.
    pub(crate) fn set_status(&mut self, next: OperationStatus) -> Result<(), RuntimeError> {
        let valid = matches!(
            (self.status, next),
            (OperationStatus::Created, OperationStatus::Enabled)
                | (OperationStatus::Enabled, OperationStatus::Blocked)
                | (OperationStatus::Blocked, OperationStatus::Enabled)
                | (OperationStatus::Enabled, OperationStatus::Completed)
        );
        if !valid {
            return Err(RuntimeError::InvalidStatusTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
