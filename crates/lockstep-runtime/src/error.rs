//! Fatal error taxonomy for the scheduler core.
//!
//! Only unrecoverable conditions are errors: contract violations by the
//! instrumentation, a strategy, or a reducer (scheduler misuse), and
//! invalid test setup (user misuse). Recoverable per-iteration outcomes
//! such as found bugs, deadlocks, and timeouts are ordinary result data,
//! not errors.

use crate::config::ConfigError;
use crate::operation::{OperationId, OperationStatus};

// ---------------------------------------------------------------------------
// RuntimeError — fatal to the run
// ---------------------------------------------------------------------------

/// Unrecoverable error raised by the scheduler core.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// Instrumentation referenced an operation id the registry does not know.
    #[error("unknown operation id {id}")]
    UnknownOperation { id: OperationId },

    /// The strategy chose an operation outside the reduced enabled set.
    #[error("strategy chose operation {chosen} outside the reduced enabled set")]
    StrategyChoiceOutsideReducedSet { chosen: OperationId },

    /// The strategy declined to choose from a non-empty enabled set.
    #[error("strategy returned no choice from a non-empty enabled set")]
    StrategyReturnedNoChoice,

    /// A reducer contracted a non-empty enabled set to nothing.
    #[error("reducer returned an empty set from a non-empty enabled set")]
    ReducerReturnedEmptySet,

    /// No graph node exists for the parent of an operation that needs one.
    #[error("no graph node recorded for the parent of operation {operation}")]
    MissingParentNode { operation: OperationId },

    /// An operation was driven through an illegal lifecycle transition.
    #[error("invalid status transition for operation {id}: {from} -> {to}")]
    InvalidStatusTransition {
        id: OperationId,
        from: OperationStatus,
        to: OperationStatus,
    },

    /// A scheduling point was recorded on a completed operation.
    #[error("operation {id} already completed")]
    OperationAlreadyCompleted { id: OperationId },

    /// A second root operation was created within one iteration.
    #[error("iteration already has a root operation")]
    RootAlreadyExists,

    /// An iteration was started while another one is still active.
    #[error("an iteration is already in progress")]
    IterationInProgress,

    /// A callback arrived outside an active iteration.
    #[error("no iteration is active")]
    NoActiveIteration,

    /// The test declaration was rejected before the run started.
    #[error("invalid test setup: {reason}")]
    InvalidTestSetup { reason: String },

    /// The run configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Whether this error is user misuse (bad test setup or configuration)
    /// rather than a scheduler-contract violation.
    pub fn is_user_misuse(&self) -> bool {
        matches!(self, Self::InvalidTestSetup { .. } | Self::Config(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
