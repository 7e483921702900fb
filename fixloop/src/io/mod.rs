//! I/O helpers for the loop: model requests, program execution, config and artifacts.

pub mod attempt_log;
pub mod config;
pub mod executor;
pub mod llm;
pub mod process;
pub mod prompt;
