use std::time::Instant;

use crate::error::{Result, SolverError};

/// Iteration and wall-clock limits for a solver loop.
///
/// A value of `0` disables the corresponding limit, except that an
/// iteration limit of `0` lets the solver derive one from the problem size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverBudget {
    /// Maximum number of iterations (`0` = derived from problem size).
    pub max_iterations: usize,
    /// Maximum computation time in milliseconds (`0` = unlimited).
    pub time_limit_ms: u64,
}

impl SolverBudget {
    /// Creates a budget with derived iteration count and no time limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the iteration limit.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the time limit in milliseconds.
    #[must_use]
    pub fn with_time_limit(mut self, ms: u64) -> Self {
        self.time_limit_ms = ms;
        self
    }
}

/// Running clock for one solver invocation.
#[derive(Debug)]
pub(crate) struct BudgetClock {
    stage: &'static str,
    start: Instant,
    max_iterations: usize,
    time_limit_ms: u64,
}

impl BudgetClock {
    /// Starts the clock. `derived_iterations` is used when the budget leaves
    /// the iteration limit at `0`; pass `usize::MAX` for no limit.
    pub(crate) fn start(stage: &'static str, budget: SolverBudget, derived_iterations: usize) -> Self {
        let max_iterations = if budget.max_iterations == 0 {
            derived_iterations
        } else {
            budget.max_iterations
        };
        Self {
            stage,
            start: Instant::now(),
            max_iterations,
            time_limit_ms: budget.time_limit_ms,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Fails with `SolverError::Timeout` once `iterations` reaches the
    /// iteration limit or the time limit has passed.
    pub(crate) fn check(&self, iterations: usize) -> Result<()> {
        let over_time = self.time_limit_ms > 0 && self.elapsed_ms() >= self.time_limit_ms;
        if iterations >= self.max_iterations || over_time {
            return Err(SolverError::Timeout {
                stage: self.stage,
                iterations,
                elapsed_ms: self.elapsed_ms(),
            }
            .into());
        }
        Ok(())
    }
}
