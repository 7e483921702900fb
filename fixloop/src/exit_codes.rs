//! Stable exit codes for fixloop CLI commands.

/// The final program ran successfully, or a non-run command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments or config, or a fatal error such as a failed model request.
pub const INVALID: i32 = 1;
/// The retry ceiling was reached and the last program still failed.
pub const EXHAUSTED: i32 = 2;
