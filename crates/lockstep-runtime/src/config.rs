//! Run configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::strategy::StrategyKind;

// ---------------------------------------------------------------------------
// Configuration — knobs for one testing run
// ---------------------------------------------------------------------------

/// Configuration for one testing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// How many iterations to explore.
    pub iteration_count: u32,
    /// Scheduling decisions allowed per iteration before it is cut off.
    pub max_scheduling_steps: u32,
    /// Wall-clock deadline per iteration.
    pub timeout: Duration,
    /// Base seed for the strategy.
    pub seed: u64,
    /// Which built-in strategy drives the exploration.
    pub strategy_kind: StrategyKind,
    /// Whether to snapshot coverage at the end of each iteration.
    pub is_coverage_enabled: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            iteration_count: 10,
            max_scheduling_steps: 10_000,
            timeout: Duration::from_secs(10),
            seed: 0,
            strategy_kind: StrategyKind::Random,
            is_coverage_enabled: true,
        }
    }
}

impl Configuration {
    /// Reject configurations that cannot drive a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iteration_count == 0 {
            return Err(ConfigError::ZeroIterationCount);
        }
        if self.max_scheduling_steps == 0 {
            return Err(ConfigError::ZeroStepBudget);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Configuration validation failure.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("iteration count must be at least 1")]
    ZeroIterationCount,
    #[error("scheduling step budget must be at least 1")]
    ZeroStepBudget,
    #[error("iteration timeout must be non-zero")]
    ZeroTimeout,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        let config = Configuration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy_kind, StrategyKind::Random);
        assert!(config.is_coverage_enabled);
    }

    #[test]
    fn zero_knobs_are_rejected() {
        let mut config = Configuration::default();
        config.iteration_count = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroIterationCount));

        let mut config = Configuration::default();
        config.max_scheduling_steps = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroStepBudget));

        let mut config = Configuration::default();
        config.timeout = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn serde_round_trip() {
        let config = Configuration {
            iteration_count: 50,
            max_scheduling_steps: 500,
            timeout: Duration::from_millis(250),
            seed: 99,
            strategy_kind: StrategyKind::RoundRobin,
            is_coverage_enabled: false,
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let restored: Configuration = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, restored);
    }
}
