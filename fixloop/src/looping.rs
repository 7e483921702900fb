//! Generate/execute looping for `fixloop run`.

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::core::decision::Decision;
use crate::core::state::LoopState;
use crate::core::types::AttemptOutcome;
use crate::generator::Generator;
use crate::io::executor::Executor;
use crate::step::{execute_step, generate_step};

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// The last program ran without error.
    Success,
    /// The retry ceiling was reached and the last program still failed.
    Exhausted,
}

/// Final state of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub state: LoopState,
    pub stop: LoopStop,
}

impl LoopOutcome {
    pub fn succeeded(&self) -> bool {
        self.stop == LoopStop::Success
    }
}

/// Alternate generation and execution until a program succeeds or the retry
/// ceiling is reached.
///
/// `on_attempt` observes every completed attempt after the decision is made; an
/// error from it aborts the loop. Generation errors abort the loop and are
/// returned as-is, leaving no partial attempt behind.
#[instrument(skip_all, fields(max_iterations = state.max_iterations()))]
pub fn run_loop<G, E, F>(
    mut state: LoopState,
    generator: &G,
    executor: &E,
    mut on_attempt: F,
) -> Result<LoopOutcome>
where
    G: Generator,
    E: Executor,
    F: FnMut(&AttemptOutcome) -> Result<()>,
{
    if state.is_exhausted() {
        bail!(
            "loop state already used {} of {} iterations",
            state.iterations(),
            state.max_iterations()
        );
    }

    loop {
        let attempt = state.iterations() + 1;
        info!(attempt, max_iterations = state.max_iterations(), "starting attempt");

        generate_step(&mut state, generator)
            .with_context(|| format!("generate attempt {attempt}"))?;
        let report = execute_step(&mut state, executor);
        let decision = state.decision();

        let outcome = AttemptOutcome {
            attempt: state.iterations(),
            max_iterations: state.max_iterations(),
            code: state.code().to_string(),
            error: state.error().map(str::to_string),
            report,
            decision,
        };
        info!(
            attempt = outcome.attempt,
            success = outcome.succeeded(),
            decision = decision.as_str(),
            "attempt finished"
        );
        on_attempt(&outcome)?;

        if decision == Decision::End {
            let stop = if state.error().is_none() {
                LoopStop::Success
            } else {
                LoopStop::Exhausted
            };
            return Ok(LoopOutcome { state, stop });
        }
    }
}
