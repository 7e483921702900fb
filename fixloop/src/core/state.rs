//! The single state record threaded through generation and execution.

use anyhow::{Result, bail};

use crate::core::decision::{Decision, decide};

/// Mutable loop state owned by the driver.
///
/// `task` and `max_iterations` are fixed at construction. `iterations` only
/// moves forward, one step per recorded generation, and `error` only changes
/// when an execution result is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    task: String,
    code: String,
    error: Option<String>,
    iterations: u32,
    max_iterations: u32,
}

impl LoopState {
    /// Create the initial state for a run.
    ///
    /// Rejects an empty task and a zero retry ceiling: the loop always performs at
    /// least one generation, so a ceiling of zero could not be honored.
    pub fn new(task: impl Into<String>, max_iterations: u32) -> Result<Self> {
        let task = task.into();
        if task.trim().is_empty() {
            bail!("task must not be empty");
        }
        if max_iterations == 0 {
            bail!("max_iterations must be > 0");
        }
        Ok(Self {
            task,
            code: String::new(),
            error: None,
            iterations: 0,
            max_iterations,
        })
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Most recently generated program text (empty before the first generation).
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Error from the last execution attempt, `None` on success or before any execution.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Record a freshly generated program and count the attempt.
    pub fn record_generation(&mut self, code: String) {
        self.code = code;
        self.iterations = self.iterations.saturating_add(1);
    }

    /// Record the result of executing the current program.
    pub fn record_execution(&mut self, error: Option<String>) {
        self.error = error;
    }

    /// Whether the retry ceiling has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.iterations >= self.max_iterations
    }

    pub fn decision(&self) -> Decision {
        decide(self.error(), self.iterations, self.max_iterations)
    }
}
