//! Scheduling strategies.
//!
//! At every scheduling point the driver asks a strategy to pick the next
//! operation to resume from the reduced enabled set. Strategies are
//! plug-ins behind a small contract; the built-ins cover seeded random
//! exploration and a deterministic round-robin rotation useful for
//! reproducing reported schedules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::OperationId;

// ---------------------------------------------------------------------------
// ScheduleContext — what a strategy may condition on
// ---------------------------------------------------------------------------

/// Snapshot of driver state handed to a strategy at each choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleContext {
    /// Zero-based iteration number.
    pub iteration: u32,
    /// One-based scheduling step within the iteration.
    pub step_index: u32,
    /// Operation that reached the current scheduling point.
    pub current: OperationId,
}

// ---------------------------------------------------------------------------
// SchedulingStrategy — pluggable choice contract
// ---------------------------------------------------------------------------

/// Contract for choosing the next operation to resume.
///
/// The returned operation must come from `enabled`; anything else is a
/// fatal contract violation.
pub trait SchedulingStrategy: fmt::Debug {
    /// Called before each iteration starts.
    fn initialize_next_iteration(&mut self, iteration: u32);

    /// Choose the next operation from the reduced enabled set.
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        context: &ScheduleContext,
    ) -> Option<OperationId>;

    /// Human-readable description for logs.
    fn description(&self) -> String;
}

// ---------------------------------------------------------------------------
// RandomStrategy — seeded uniform choice
// ---------------------------------------------------------------------------

/// Seed-driven uniform random choice, reseeded per iteration so every
/// iteration explores a different schedule while the whole run stays
/// reproducible from the base seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomStrategy {
    base_seed: u64,
    state: u64,
}

impl RandomStrategy {
    pub fn new(seed: u64) -> Self {
        Self {
            base_seed: seed,
            state: seed,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }
}

impl SchedulingStrategy for RandomStrategy {
    fn initialize_next_iteration(&mut self, iteration: u32) {
        self.state = self.base_seed.wrapping_add(u64::from(iteration));
    }

    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        _context: &ScheduleContext,
    ) -> Option<OperationId> {
        if enabled.is_empty() {
            return None;
        }
        let pick = (self.next_u64() >> 33) as usize % enabled.len();
        Some(enabled[pick])
    }

    fn description(&self) -> String {
        format!("random(seed={})", self.base_seed)
    }
}

// ---------------------------------------------------------------------------
// RoundRobinStrategy — deterministic rotation
// ---------------------------------------------------------------------------

/// Deterministic rotation through the enabled set. The starting offset
/// shifts by one each iteration, so consecutive iterations still differ.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundRobinStrategy {
    cursor: usize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulingStrategy for RoundRobinStrategy {
    fn initialize_next_iteration(&mut self, iteration: u32) {
        self.cursor = iteration as usize;
    }

    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        _context: &ScheduleContext,
    ) -> Option<OperationId> {
        if enabled.is_empty() {
            return None;
        }
        let pick = enabled[self.cursor % enabled.len()];
        self.cursor += 1;
        Some(pick)
    }

    fn description(&self) -> String {
        "round_robin".to_string()
    }
}

// ---------------------------------------------------------------------------
// StrategyKind — configuration surface
// ---------------------------------------------------------------------------

/// Which built-in strategy a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    #[default]
    Random,
    RoundRobin,
}

impl StrategyKind {
    /// Build the configured strategy from the run seed.
    pub fn build(self, seed: u64) -> Box<dyn SchedulingStrategy> {
        match self {
            Self::Random => Box::new(RandomStrategy::new(seed)),
            Self::RoundRobin => Box::new(RoundRobinStrategy::new()),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::RoundRobin => write!(f, "round_robin"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
