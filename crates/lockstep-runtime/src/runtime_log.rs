//! Structured runtime log.
//!
//! The driver appends a typed record for every externally meaningful
//! event: iteration boundaries, operation lifecycle, scheduling
//! decisions, and the recovered failure conditions. The stream is
//! append-only within a run and serializes as-is for test-framework
//! adapters to render.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::OperationId;
use crate::scheduling_point::SchedulingPoint;

// ---------------------------------------------------------------------------
// LogRecord — one structured event
// ---------------------------------------------------------------------------

/// One structured event emitted by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    IterationStarted {
        iteration: u32,
        strategy: String,
    },
    OperationCreated {
        iteration: u32,
        operation: OperationId,
        parent: Option<OperationId>,
    },
    /// The graph recorder appended nodes for an operation.
    GraphExtended {
        iteration: u32,
        operation: OperationId,
        nodes_added: usize,
        edges_added: usize,
    },
    SchedulingDecision {
        iteration: u32,
        step_index: u32,
        point: SchedulingPoint,
        current: OperationId,
        next: OperationId,
        enabled_count: usize,
        reduced_count: usize,
    },
    OperationCompleted {
        iteration: u32,
        operation: OperationId,
    },
    OperationBlocked {
        iteration: u32,
        operation: OperationId,
        reason: String,
    },
    OperationUnblocked {
        iteration: u32,
        operation: OperationId,
    },
    BugFound {
        iteration: u32,
        description: String,
    },
    DeadlockDetected {
        iteration: u32,
        blocked: Vec<OperationId>,
    },
    IterationTimedOut {
        iteration: u32,
        step_index: u32,
    },
    StepBudgetExhausted {
        iteration: u32,
        budget: u32,
    },
    IterationFinished {
        iteration: u32,
        outcome: String,
        steps: u32,
        operations: usize,
    },
}

impl LogRecord {
    /// Iteration the record belongs to.
    pub fn iteration(&self) -> u32 {
        match self {
            Self::IterationStarted { iteration, .. }
            | Self::OperationCreated { iteration, .. }
            | Self::GraphExtended { iteration, .. }
            | Self::SchedulingDecision { iteration, .. }
            | Self::OperationCompleted { iteration, .. }
            | Self::OperationBlocked { iteration, .. }
            | Self::OperationUnblocked { iteration, .. }
            | Self::BugFound { iteration, .. }
            | Self::DeadlockDetected { iteration, .. }
            | Self::IterationTimedOut { iteration, .. }
            | Self::StepBudgetExhausted { iteration, .. }
            | Self::IterationFinished { iteration, .. } => *iteration,
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IterationStarted {
                iteration,
                strategy,
            } => {
                write!(f, "iteration {iteration}: started with strategy {strategy}")
            }
            Self::OperationCreated {
                iteration,
                operation,
                parent,
            } => match parent {
                Some(parent) => write!(
                    f,
                    "iteration {iteration}: operation {operation} created by {parent}"
                ),
                None => write!(f, "iteration {iteration}: root operation {operation} created"),
            },
            Self::GraphExtended {
                iteration,
                operation,
                nodes_added,
                edges_added,
            } => write!(
                f,
                "iteration {iteration}: graph grew by {nodes_added} nodes and \
                 {edges_added} edges for operation {operation}"
            ),
            Self::SchedulingDecision {
                iteration,
                step_index,
                point,
                current,
                next,
                enabled_count,
                reduced_count,
            } => write!(
                f,
                "iteration {iteration} step {step_index}: at {point} of operation \
                 {current}, resumed {next} (enabled={enabled_count}, reduced={reduced_count})"
            ),
            Self::OperationCompleted {
                iteration,
                operation,
            } => write!(f, "iteration {iteration}: operation {operation} completed"),
            Self::OperationBlocked {
                iteration,
                operation,
                reason,
            } => write!(
                f,
                "iteration {iteration}: operation {operation} blocked ({reason})"
            ),
            Self::OperationUnblocked {
                iteration,
                operation,
            } => write!(f, "iteration {iteration}: operation {operation} unblocked"),
            Self::BugFound {
                iteration,
                description,
            } => write!(f, "iteration {iteration}: bug found: {description}"),
            Self::DeadlockDetected { iteration, blocked } => write!(
                f,
                "iteration {iteration}: deadlock, {} operations blocked",
                blocked.len()
            ),
            Self::IterationTimedOut {
                iteration,
                step_index,
            } => write!(f, "iteration {iteration}: timed out at step {step_index}"),
            Self::StepBudgetExhausted { iteration, budget } => write!(
                f,
                "iteration {iteration}: step budget of {budget} exhausted"
            ),
            Self::IterationFinished {
                iteration,
                outcome,
                steps,
                operations,
            } => write!(
                f,
                "iteration {iteration}: finished as {outcome} after {steps} steps \
                 over {operations} operations"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// RuntimeLog — append-only record stream
// ---------------------------------------------------------------------------

/// Append-only stream of log records for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeLog {
    records: Vec<LogRecord>,
}

impl RuntimeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    /// All records, in append order.
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Records belonging to one iteration, in append order.
    pub fn records_for_iteration(&self, iteration: u32) -> Vec<&LogRecord> {
        self.records
            .iter()
            .filter(|record| record.iteration() == iteration)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<LogRecord> {
        vec![
            LogRecord::IterationStarted {
                iteration: 0,
                strategy: "random(seed=1)".to_string(),
            },
            LogRecord::SchedulingDecision {
                iteration: 0,
                step_index: 1,
                point: SchedulingPoint::Read,
                current: 0,
                next: 1,
                enabled_count: 2,
                reduced_count: 1,
            },
            LogRecord::DeadlockDetected {
                iteration: 1,
                blocked: vec![1, 2],
            },
        ]
    }

    // -- Stream behavior --

    #[test]
    fn records_append_in_order() {
        let mut log = RuntimeLog::new();
        assert!(log.is_empty());
        for record in sample_records() {
            log.push(record);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.records()[0].iteration(), 0);
        assert_eq!(log.records()[2].iteration(), 1);
    }

    #[test]
    fn records_filter_by_iteration() {
        let mut log = RuntimeLog::new();
        for record in sample_records() {
            log.push(record);
        }
        assert_eq!(log.records_for_iteration(0).len(), 2);
        assert_eq!(log.records_for_iteration(1).len(), 1);
        assert!(log.records_for_iteration(7).is_empty());
    }

    // -- Rendering --

    #[test]
    fn display_renders_one_line_per_record() {
        let record = LogRecord::SchedulingDecision {
            iteration: 2,
            step_index: 14,
            point: SchedulingPoint::Write,
            current: 0,
            next: 3,
            enabled_count: 4,
            reduced_count: 2,
        };
        let line = record.to_string();
        assert!(line.contains("iteration 2 step 14"));
        assert!(line.contains("write"));
        assert!(line.contains("resumed 3"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn deadlock_reports_blocked_count() {
        let record = LogRecord::DeadlockDetected {
            iteration: 0,
            blocked: vec![4, 5, 6],
        };
        assert_eq!(
            record.to_string(),
            "iteration 0: deadlock, 3 operations blocked"
        );
    }

    // -- Serialization --

    #[test]
    fn serde_round_trip() {
        let mut log = RuntimeLog::new();
        for record in sample_records() {
            log.push(record);
        }
        let json = serde_json::to_string(&log).expect("serialize");
        let restored: RuntimeLog = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(log, restored);
    }
}
