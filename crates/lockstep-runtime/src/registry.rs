//! Per-iteration operation registry.
//!
//! Owns every controlled operation created during one iteration, assigns
//! monotonic ids and sequence ids, and answers the enabled/blocked/
//! completed queries the driver needs at each scheduling point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::operation::{ControlledOperation, OperationId, OperationStatus};

// ---------------------------------------------------------------------------
// OperationRegistry — table of operations for one iteration
// ---------------------------------------------------------------------------

/// Registry of all controlled operations within one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRegistry {
    operations: BTreeMap<OperationId, ControlledOperation>,
    next_id: OperationId,
    next_sequence_id: u64,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the root operation, already enabled. Exactly one per iteration.
    pub(crate) fn create_root(&mut self) -> Result<OperationId, RuntimeError> {
        if !self.operations.is_empty() {
            return Err(RuntimeError::RootAlreadyExists);
        }
        let id = self.assign_id();
        let mut root = ControlledOperation::new(id, None, 0);
        root.set_status(OperationStatus::Enabled)?;
        self.operations.insert(id, root);
        self.next_sequence_id = 1;
        Ok(id)
    }

    /// Create a child of an existing operation, in `Created` state.
    pub(crate) fn create_child(
        &mut self,
        parent: OperationId,
    ) -> Result<OperationId, RuntimeError> {
        if !self.operations.contains_key(&parent) {
            return Err(RuntimeError::UnknownOperation { id: parent });
        }
        let id = self.assign_id();
        let sequence_id = self.next_sequence_id;
        self.next_sequence_id += 1;
        self.operations
            .insert(id, ControlledOperation::new(id, Some(parent), sequence_id));
        Ok(id)
    }

    pub fn get(&self, id: OperationId) -> Result<&ControlledOperation, RuntimeError> {
        self.operations
            .get(&id)
            .ok_or(RuntimeError::UnknownOperation { id })
    }

    pub(crate) fn get_mut(
        &mut self,
        id: OperationId,
    ) -> Result<&mut ControlledOperation, RuntimeError> {
        self.operations
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownOperation { id })
    }

    /// Ids of operations currently able to run, in id order.
    pub fn enabled_ids(&self) -> Vec<OperationId> {
        self.ids_with_status(OperationStatus::Enabled)
    }

    /// Ids of operations currently blocked, in id order.
    pub fn blocked_ids(&self) -> Vec<OperationId> {
        self.ids_with_status(OperationStatus::Blocked)
    }

    /// Whether every registered operation has completed.
    pub fn all_completed(&self) -> bool {
        self.operations
            .values()
            .all(|op| op.status() == OperationStatus::Completed)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Iterate operations in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ControlledOperation> {
        self.operations.values()
    }

    /// Drop all operations and reset id assignment for the next iteration.
    pub(crate) fn clear(&mut self) {
        self.operations.clear();
        self.next_id = 0;
        self.next_sequence_id = 0;
    }

    fn ids_with_status(&self, status: OperationStatus) -> Vec<OperationId> {
        self.operations
            .iter()
            .filter(|(_, op)| op.status() == status)
            .map(|(id, _)| *id)
            .collect()
    }

    fn assign_id(&mut self) -> OperationId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
