//! Iteration driver.
//!
//! The scheduler core that serializes controlled operations. Instrumented
//! user code reports lifecycle events and scheduling points; at each
//! point the driver records the operation into the execution graph,
//! computes the enabled set, applies the reducer, asks the strategy to
//! choose, and tells the host which operation to resume. Exactly one
//! operation runs at any instant, so no locking exists anywhere in the
//! core.
//!
//! Recovered conditions (found bugs, deadlock, timeout, an exhausted step
//! budget) end the iteration and are reported as outcomes; contract
//! violations are fatal errors.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::coverage::CoverageReport;
use crate::equivalence::KeyEquivalence;
use crate::error::RuntimeError;
use crate::execution_graph::ExecutionGraph;
use crate::operation::{ControlledOperation, OperationId, OperationStatus};
use crate::reducer::{ScheduleReducer, SharedStateReducer};
use crate::registry::OperationRegistry;
use crate::runtime_log::{LogRecord, RuntimeLog};
use crate::scheduling_point::SchedulingPoint;
use crate::strategy::{ScheduleContext, SchedulingStrategy};

// ---------------------------------------------------------------------------
// SchedulingPointInvocation — inbound instrumentation callback payload
// ---------------------------------------------------------------------------

/// Payload of one scheduling-point callback from instrumented code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingPointInvocation {
    /// Operation that reached the point.
    pub operation: OperationId,
    pub point: SchedulingPoint,
    /// Shared-state key for read/write points, opaque to the core.
    pub shared_state_key: Option<String>,
    /// Equivalence policy for the key, if the instrumentation carries one.
    pub key_equivalence: Option<KeyEquivalence>,
    pub call_site: String,
    pub program_state_hash: i32,
}

// ---------------------------------------------------------------------------
// IterationOutcome — how an iteration ended
// ---------------------------------------------------------------------------

/// Recovered result of one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationOutcome {
    /// Every operation completed.
    Passed,
    /// User code observed an assertion failure or uncaught error.
    BugFound { description: String },
    /// No operation was enabled while some remained blocked.
    Deadlock { blocked: Vec<OperationId> },
    /// The wall-clock deadline expired.
    Timeout,
    /// The per-iteration scheduling step budget ran out.
    StepBudgetExhausted,
}

impl IterationOutcome {
    /// Whether this outcome reports a concurrency bug.
    pub fn is_bug(&self) -> bool {
        matches!(self, Self::BugFound { .. } | Self::Deadlock { .. })
    }
}

impl fmt::Display for IterationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::BugFound { description } => write!(f, "bug_found: {description}"),
            Self::Deadlock { blocked } => write!(f, "deadlock({} blocked)", blocked.len()),
            Self::Timeout => write!(f, "timed_out"),
            Self::StepBudgetExhausted => write!(f, "step_budget_exhausted"),
        }
    }
}

// ---------------------------------------------------------------------------
// SchedulingDecision — outbound answer to a callback
// ---------------------------------------------------------------------------

/// What the host must do after a scheduling point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingDecision {
    /// Resume the given operation; the caller yields cooperatively.
    Resume { operation: OperationId },
    /// The iteration is over; pass the outcome to `finish_iteration`.
    Finished { outcome: IterationOutcome },
}

// ---------------------------------------------------------------------------
// IterationResult and RunReport — output artifacts
// ---------------------------------------------------------------------------

/// Artifact of one finished iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationResult {
    pub iteration: u32,
    pub outcome: IterationOutcome,
    /// Scheduling decisions taken.
    pub steps: u32,
    /// Operations created during the iteration.
    pub operation_count: usize,
    /// Coverage snapshot, when enabled in the configuration.
    pub coverage: Option<CoverageReport>,
}

/// Aggregate artifact of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub iterations_run: u32,
    pub passed: usize,
    pub bugs_found: usize,
    pub deadlocks: usize,
    pub timeouts: usize,
    pub step_budget_exhaustions: usize,
    /// Coverage snapshot of the last iteration that produced one.
    pub coverage: Option<CoverageReport>,
    pub iterations: Vec<IterationResult>,
    pub log: RuntimeLog,
}

impl RunReport {
    /// Whether any iteration surfaced a concurrency bug.
    pub fn found_failure(&self) -> bool {
        self.bugs_found > 0 || self.deadlocks > 0
    }
}

// ---------------------------------------------------------------------------
// SchedulerRuntime — the driver
// ---------------------------------------------------------------------------

/// The scheduler core for one test run.
#[derive(Debug)]
pub struct SchedulerRuntime {
    config: Configuration,
    registry: OperationRegistry,
    graph: ExecutionGraph,
    reducer: Box<dyn ScheduleReducer>,
    strategy: Box<dyn SchedulingStrategy>,
    log: RuntimeLog,
    iteration: u32,
    step_index: u32,
    current: OperationId,
    deadline: Option<Instant>,
    iteration_active: bool,
    last_coverage: Option<CoverageReport>,
    results: Vec<IterationResult>,
}

impl SchedulerRuntime {
    /// Build a runtime from a validated configuration, with the built-in
    /// shared-state reducer and the configured strategy.
    pub fn new(config: Configuration) -> Result<Self, RuntimeError> {
        config.validate()?;
        let strategy = config.strategy_kind.build(config.seed);
        Ok(Self {
            config,
            registry: OperationRegistry::new(),
            graph: ExecutionGraph::new(),
            reducer: Box::new(SharedStateReducer::new()),
            strategy,
            log: RuntimeLog::new(),
            iteration: 0,
            step_index: 0,
            current: 0,
            deadline: None,
            iteration_active: false,
            last_coverage: None,
            results: Vec::new(),
        })
    }

    /// Replace the reducer. Accumulated reducer state is discarded.
    pub fn with_reducer(mut self, reducer: Box<dyn ScheduleReducer>) -> Self {
        self.reducer = reducer;
        self
    }

    /// Replace the strategy chosen from the configuration.
    pub fn with_strategy(mut self, strategy: Box<dyn SchedulingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn log(&self) -> &RuntimeLog {
        &self.log
    }

    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    /// Zero-based number of the current (or next) iteration.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Operation most recently resumed by the driver.
    pub fn current_operation(&self) -> OperationId {
        self.current
    }

    /// Whether the configured iteration budget has more iterations left.
    pub fn has_more_iterations(&self) -> bool {
        self.iteration < self.config.iteration_count
    }

    // -- Iteration lifecycle --

    /// Start the next iteration: fresh registry and graph state, a newly
    /// enabled root operation, and an armed deadline. Returns the root id
    /// for the host to resume.
    pub fn begin_iteration(&mut self) -> Result<OperationId, RuntimeError> {
        if self.iteration_active {
            return Err(RuntimeError::IterationInProgress);
        }
        self.registry.clear();
        self.strategy.initialize_next_iteration(self.iteration);
        self.reducer.initialize_next_iteration(self.iteration);
        self.step_index = 0;

        let root = self.registry.create_root()?;
        self.current = root;
        self.deadline = Some(Instant::now() + self.config.timeout);
        self.iteration_active = true;
        self.log.push(LogRecord::IterationStarted {
            iteration: self.iteration,
            strategy: self.strategy.description(),
        });
        self.log.push(LogRecord::OperationCreated {
            iteration: self.iteration,
            operation: root,
            parent: None,
        });
        Ok(root)
    }

    /// End the current iteration with the given outcome. Snapshots
    /// coverage when enabled, clears per-iteration graph state, and
    /// advances the iteration counter. Reducer knowledge persists.
    pub fn finish_iteration(
        &mut self,
        outcome: IterationOutcome,
    ) -> Result<IterationResult, RuntimeError> {
        self.ensure_active()?;
        let coverage = self
            .config
            .is_coverage_enabled
            .then(|| CoverageReport::from_graph(&self.graph));
        let result = IterationResult {
            iteration: self.iteration,
            outcome: outcome.clone(),
            steps: self.step_index,
            operation_count: self.registry.len(),
            coverage: coverage.clone(),
        };
        self.log.push(LogRecord::IterationFinished {
            iteration: self.iteration,
            outcome: outcome.to_string(),
            steps: self.step_index,
            operations: self.registry.len(),
        });
        self.graph.clear();
        if coverage.is_some() {
            self.last_coverage = coverage;
        }
        self.results.push(result.clone());
        self.iteration += 1;
        self.iteration_active = false;
        self.deadline = None;
        Ok(result)
    }

    /// Consume the runtime and produce the aggregate run artifact.
    pub fn finalize(self) -> RunReport {
        let mut passed = 0;
        let mut bugs_found = 0;
        let mut deadlocks = 0;
        let mut timeouts = 0;
        let mut step_budget_exhaustions = 0;
        for result in &self.results {
            match result.outcome {
                IterationOutcome::Passed => passed += 1,
                IterationOutcome::BugFound { .. } => bugs_found += 1,
                IterationOutcome::Deadlock { .. } => deadlocks += 1,
                IterationOutcome::Timeout => timeouts += 1,
                IterationOutcome::StepBudgetExhausted => step_budget_exhaustions += 1,
            }
        }
        RunReport {
            iterations_run: self.results.len() as u32,
            passed,
            bugs_found,
            deadlocks,
            timeouts,
            step_budget_exhaustions,
            coverage: self.last_coverage,
            iterations: self.results,
            log: self.log,
        }
    }

    // -- Operation lifecycle callbacks --

    /// User code spawned new work under `parent`. The child is enabled
    /// immediately and becomes schedulable at the next point.
    pub fn on_create(&mut self, parent: OperationId) -> Result<OperationId, RuntimeError> {
        self.ensure_active()?;
        let id = self.registry.create_child(parent)?;
        self.registry
            .get_mut(id)?
            .set_status(OperationStatus::Enabled)?;
        self.log.push(LogRecord::OperationCreated {
            iteration: self.iteration,
            operation: id,
            parent: Some(parent),
        });
        Ok(id)
    }

    pub fn on_complete(&mut self, id: OperationId) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        self.registry
            .get_mut(id)?
            .set_status(OperationStatus::Completed)?;
        self.log.push(LogRecord::OperationCompleted {
            iteration: self.iteration,
            operation: id,
        });
        Ok(())
    }

    pub fn on_block(&mut self, id: OperationId, reason: &str) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        self.registry
            .get_mut(id)?
            .set_status(OperationStatus::Blocked)?;
        self.log.push(LogRecord::OperationBlocked {
            iteration: self.iteration,
            operation: id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    pub fn on_unblock(&mut self, id: OperationId) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        self.registry
            .get_mut(id)?
            .set_status(OperationStatus::Enabled)?;
        self.log.push(LogRecord::OperationUnblocked {
            iteration: self.iteration,
            operation: id,
        });
        Ok(())
    }

    /// User code passed through an instrumented call site without a
    /// scheduling point; it joins the operation's next burst.
    pub fn on_call_site_visited(
        &mut self,
        id: OperationId,
        call_site: &str,
    ) -> Result<(), RuntimeError> {
        self.ensure_active()?;
        self.registry
            .get_mut(id)?
            .record_visited_call_site(call_site.to_string())
    }

    // -- Scheduling --

    /// Process a scheduling point: record it on the operation and in the
    /// graph, then decide what runs next.
    pub fn on_scheduling_point(
        &mut self,
        invocation: SchedulingPointInvocation,
    ) -> Result<SchedulingDecision, RuntimeError> {
        self.ensure_active()?;
        {
            let op = self.registry.get_mut(invocation.operation)?;
            op.record_scheduling_point(
                invocation.point,
                invocation.shared_state_key.clone(),
                invocation.key_equivalence,
                invocation.call_site.clone(),
                invocation.program_state_hash,
            )?;
        }

        let burst = {
            let op = self.registry.get(invocation.operation)?;
            self.graph.add(op)?
        };
        self.log.push(LogRecord::GraphExtended {
            iteration: self.iteration,
            operation: invocation.operation,
            nodes_added: burst.nodes.len(),
            edges_added: burst.edges.len(),
        });

        self.current = invocation.operation;
        self.pick_next(invocation.operation, invocation.point)
    }

    /// Decide what runs next without recording a point, after the current
    /// operation completed or blocked.
    pub fn schedule_next(&mut self) -> Result<SchedulingDecision, RuntimeError> {
        self.ensure_active()?;
        self.pick_next(self.current, SchedulingPoint::Default)
    }

    /// Report an assertion failure or uncaught error observed in user
    /// code. The returned outcome ends the iteration.
    pub fn report_bug(&mut self, description: &str) -> IterationOutcome {
        self.log.push(LogRecord::BugFound {
            iteration: self.iteration,
            description: description.to_string(),
        });
        IterationOutcome::BugFound {
            description: description.to_string(),
        }
    }

    fn pick_next(
        &mut self,
        current: OperationId,
        point: SchedulingPoint,
    ) -> Result<SchedulingDecision, RuntimeError> {
        self.step_index += 1;

        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            self.log.push(LogRecord::IterationTimedOut {
                iteration: self.iteration,
                step_index: self.step_index,
            });
            return Ok(SchedulingDecision::Finished {
                outcome: IterationOutcome::Timeout,
            });
        }

        if self.step_index > self.config.max_scheduling_steps {
            self.log.push(LogRecord::StepBudgetExhausted {
                iteration: self.iteration,
                budget: self.config.max_scheduling_steps,
            });
            return Ok(SchedulingDecision::Finished {
                outcome: IterationOutcome::StepBudgetExhausted,
            });
        }

        let enabled = self.registry.enabled_ids();
        if enabled.is_empty() {
            if self.registry.all_completed() {
                return Ok(SchedulingDecision::Finished {
                    outcome: IterationOutcome::Passed,
                });
            }
            let blocked = self.registry.blocked_ids();
            self.log.push(LogRecord::DeadlockDetected {
                iteration: self.iteration,
                blocked: blocked.clone(),
            });
            return Ok(SchedulingDecision::Finished {
                outcome: IterationOutcome::Deadlock { blocked },
            });
        }

        let enabled_ops: Vec<&ControlledOperation> = enabled
            .iter()
            .map(|&id| self.registry.get(id))
            .collect::<Result<_, _>>()?;
        let current_op = self.registry.get(current)?;
        let reduced = self.reducer.reduce(&enabled_ops, current_op);
        if reduced.is_empty() {
            return Err(RuntimeError::ReducerReturnedEmptySet);
        }

        let context = ScheduleContext {
            iteration: self.iteration,
            step_index: self.step_index,
            current,
        };
        let next = self
            .strategy
            .next_operation(&reduced, &context)
            .ok_or(RuntimeError::StrategyReturnedNoChoice)?;
        if !reduced.contains(&next) {
            return Err(RuntimeError::StrategyChoiceOutsideReducedSet { chosen: next });
        }

        self.log.push(LogRecord::SchedulingDecision {
            iteration: self.iteration,
            step_index: self.step_index,
            point,
            current,
            next,
            enabled_count: enabled.len(),
            reduced_count: reduced.len(),
        });
        self.current = next;
        Ok(SchedulingDecision::Resume { operation: next })
    }

    fn ensure_active(&self) -> Result<(), RuntimeError> {
        if !self.iteration_active {
            return Err(RuntimeError::NoActiveIteration);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
