//! Continue/end decision taken after every execution.

use serde::Serialize;

/// Outcome of the loop controller after an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Feed the error back and generate again.
    Continue,
    /// Stop: either the program succeeded or the retry ceiling was reached.
    End,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Continue => "continue",
            Decision::End => "end",
        }
    }
}

/// Decide whether the loop should run another generation attempt.
///
/// - `End` once `iterations >= max_iterations`, whatever the error.
/// - `End` when `error` is absent (the last program succeeded).
/// - `Continue` otherwise.
pub fn decide(error: Option<&str>, iterations: u32, max_iterations: u32) -> Decision {
    if iterations >= max_iterations {
        return Decision::End;
    }
    match error {
        None => Decision::End,
        Some(_) => Decision::Continue,
    }
}
