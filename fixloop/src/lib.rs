//! Self-correcting code generation loop.
//!
//! A language model proposes a program for a task, the program runs in a fresh
//! subprocess under a wall-clock timeout, and any failure is fed back into the
//! next prompt until the program succeeds or the retry ceiling is reached. The
//! crate keeps the same split throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (loop state, the continue/end
//!   decision, fence stripping, failure diagnostics). No I/O.
//! - **[`io`]**: Side-effecting operations (model requests, process execution,
//!   config files, attempt artifacts). Isolated behind traits so tests can
//!   substitute scripted fakes.
//!
//! [`generator`], [`step`] and [`looping`] coordinate the two to implement the
//! `fixloop run` command.

pub mod core;
pub mod exit_codes;
pub mod generator;
pub mod io;
pub mod logging;
pub mod looping;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
