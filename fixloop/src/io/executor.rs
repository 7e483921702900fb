//! Executor abstraction for running generated programs.
//!
//! The [`Executor`] trait decouples the loop from how programs are actually
//! run. [`SubprocessExecutor`] hands the program text to an interpreter in a
//! fresh child process; tests use scripted executors that return predetermined
//! reports without spawning anything. Stronger isolation (containers, seccomp)
//! belongs behind this same trait.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::ExecReport;
use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

/// Abstraction over program execution backends.
pub trait Executor {
    /// Run `code` to completion or timeout.
    ///
    /// A program that runs and fails is reported through [`ExecReport`]; `Err` is
    /// reserved for programs that could not be launched.
    fn execute(&self, code: &str) -> Result<ExecReport>;
}

/// Executor that runs `<command...> <code>` in a child process.
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl SubprocessExecutor {
    /// Create an executor. `command` is the interpreter invocation that takes the
    /// program text as its final argument (e.g. `["python3", "-c"]`).
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Result<Self> {
        if command.is_empty() || command[0].trim().is_empty() {
            return Err(anyhow!("executor command must be a non-empty array"));
        }
        Ok(Self {
            command,
            timeout,
            output_limit_bytes,
        })
    }

    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        Self::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
            config.output_limit_bytes,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Executor for SubprocessExecutor {
    #[instrument(skip_all, fields(program = %self.command[0], timeout_secs = self.timeout.as_secs_f64()))]
    fn execute(&self, code: &str) -> Result<ExecReport> {
        info!(bytes = code.len(), "executing generated program");

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]).arg(code);

        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run {}", self.command.join(" ")))?;

        if output.timed_out {
            warn!(
                timeout_secs = self.timeout.as_secs_f64(),
                "program timed out"
            );
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "program failed");
        } else {
            debug!("program completed successfully");
        }

        Ok(ExecReport {
            exit_code: output.status.code(),
            stdout: output.stdout.to_text(),
            stderr: output.stderr.to_text(),
            stdout_truncated: output.stdout.dropped,
            stderr_truncated: output.stderr.dropped,
            timed_out_after: output.timed_out.then_some(self.timeout),
            elapsed: output.elapsed,
        })
    }
}
