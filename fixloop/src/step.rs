//! The two loop steps: generate a program, then execute it.
//!
//! Each step reads and updates the shared [`LoopState`]. Generation failures are
//! returned to the caller; execution failures of any kind become the state's
//! `error` so they can be fed back into the next generation.

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::diagnostic::{empty_program_feedback, execution_feedback, launch_failure_feedback};
use crate::core::state::LoopState;
use crate::core::types::ExecReport;
use crate::generator::Generator;
use crate::io::executor::Executor;

/// Generate a new program from the task and the last error, and count the attempt.
///
/// On failure the state is left untouched.
#[instrument(skip_all, fields(attempt = state.iterations() + 1))]
pub fn generate_step<G: Generator>(state: &mut LoopState, generator: &G) -> Result<()> {
    let code = generator.generate(state.task(), state.error())?;
    debug!(bytes = code.len(), "recording generated program");
    state.record_generation(code);
    Ok(())
}

/// Execute the current program and record the feedback.
///
/// Returns the execution report, or `None` when the program was never launched
/// (empty program or launch failure). Never fails: every problem becomes the
/// state's `error`.
#[instrument(skip_all, fields(attempt = state.iterations()))]
pub fn execute_step<E: Executor>(state: &mut LoopState, executor: &E) -> Option<ExecReport> {
    if state.code().trim().is_empty() {
        warn!("generated program is empty, skipping execution");
        state.record_execution(Some(empty_program_feedback()));
        return None;
    }

    match executor.execute(state.code()) {
        Ok(report) => {
            let feedback = execution_feedback(&report);
            debug!(success = feedback.is_none(), "recording execution result");
            state.record_execution(feedback);
            Some(report)
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "program could not be launched");
            state.record_execution(Some(launch_failure_feedback(&err)));
            None
        }
    }
}
