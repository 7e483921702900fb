//! Shared deterministic types for loop logic.
//!
//! These types define stable contracts between the executor, the loop driver and
//! whoever observes attempts (trace output, attempt artifacts). They do not
//! depend on external state or I/O.

use std::time::Duration;

use crate::core::decision::Decision;

/// Captured result of running one program to completion or timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecReport {
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Bytes of stdout discarded beyond the output limit.
    pub stdout_truncated: usize,
    /// Bytes of stderr discarded beyond the output limit.
    pub stderr_truncated: usize,
    /// Set to the configured limit when the process was killed for running too long.
    pub timed_out_after: Option<Duration>,
    /// Wall-clock time from spawn to exit.
    pub elapsed: Duration,
}

impl ExecReport {
    /// A program succeeded when it exited on its own with status zero.
    pub fn succeeded(&self) -> bool {
        self.timed_out_after.is_none() && self.exit_code == Some(0)
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out_after.is_some()
    }
}

/// Everything observable about one generate + execute attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Attempt number (1-indexed, equals `iterations` after the generation).
    pub attempt: u32,
    pub max_iterations: u32,
    /// Program text that was executed.
    pub code: String,
    /// Feedback recorded in the loop state; `None` means the program succeeded.
    pub error: Option<String>,
    /// Execution report, `None` when the program could not be launched at all.
    pub report: Option<ExecReport>,
    /// What the loop controller decided after this attempt.
    pub decision: Decision,
}

impl AttemptOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
