//! Scripted fakes for driving the loop without a model or an interpreter.
//!
//! Each fake pops one scripted response per call and records what it was asked
//! to do. Running out of script is an error, so over-calling shows up as a test
//! failure instead of a hang.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};

use crate::core::types::ExecReport;
use crate::generator::Generator;
use crate::io::executor::Executor;
use crate::io::llm::{ChatModel, ChatRequest, ModelRequestError};

/// Build an execution report that exited on its own.
pub fn report(exit_code: i32, stdout: &str, stderr: &str) -> ExecReport {
    ExecReport {
        exit_code: Some(exit_code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        stdout_truncated: 0,
        stderr_truncated: 0,
        timed_out_after: None,
        elapsed: Duration::from_millis(5),
    }
}

enum ScriptedGeneration {
    Code(String),
    Failure(String),
    ModelFailure(ModelRequestError),
}

/// Generator that returns scripted programs or failures in order.
pub struct ScriptedGenerator {
    script: RefCell<VecDeque<ScriptedGeneration>>,
    calls: RefCell<Vec<(String, Option<String>)>>,
}

impl ScriptedGenerator {
    /// `Ok` entries are returned as program text, `Err` entries as generation failures.
    pub fn new(script: Vec<Result<String, String>>) -> Self {
        let script = script
            .into_iter()
            .map(|entry| match entry {
                Ok(code) => ScriptedGeneration::Code(code),
                Err(msg) => ScriptedGeneration::Failure(msg),
            })
            .collect();
        Self::from_script(script)
    }

    /// A generator whose first call fails with a typed model error.
    pub fn with_model_error(err: ModelRequestError) -> Self {
        Self::from_script(VecDeque::from([ScriptedGeneration::ModelFailure(err)]))
    }

    fn from_script(script: VecDeque<ScriptedGeneration>) -> Self {
        Self {
            script: RefCell::new(script),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// `(task, error)` pairs passed to each `generate` call, in order.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.borrow().clone()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let remaining = self.script.borrow().len();
        if remaining > 0 {
            bail!("scripted generator has {remaining} unused entries");
        }
        Ok(())
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, task: &str, error: Option<&str>) -> Result<String> {
        self.calls
            .borrow_mut()
            .push((task.to_string(), error.map(str::to_string)));
        match self.script.borrow_mut().pop_front() {
            Some(ScriptedGeneration::Code(code)) => Ok(code),
            Some(ScriptedGeneration::Failure(msg)) => Err(anyhow!(msg)),
            Some(ScriptedGeneration::ModelFailure(err)) => Err(err.into()),
            None => bail!("scripted generator exhausted"),
        }
    }
}

/// One scripted execution result.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// Killed at the 5 second limit with no output.
    TimedOut,
    /// The program could not be launched.
    LaunchError(String),
}

impl ScriptedRun {
    pub fn exit(code: i32, stdout: &str, stderr: &str) -> Self {
        ScriptedRun::Exit {
            code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }
}

/// Executor that returns scripted results in order and records executed programs.
pub struct ScriptedExecutor {
    script: RefCell<VecDeque<ScriptedRun>>,
    executed: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<ScriptedRun>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            executed: RefCell::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let remaining = self.script.borrow().len();
        if remaining > 0 {
            bail!("scripted executor has {remaining} unused entries");
        }
        Ok(())
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, code: &str) -> Result<ExecReport> {
        self.executed.borrow_mut().push(code.to_string());
        match self.script.borrow_mut().pop_front() {
            Some(ScriptedRun::Exit {
                code: status,
                stdout,
                stderr,
            }) => Ok(report(status, &stdout, &stderr)),
            Some(ScriptedRun::TimedOut) => Ok(ExecReport {
                exit_code: None,
                timed_out_after: Some(Duration::from_secs(5)),
                elapsed: Duration::from_secs(5),
                ..report(0, "", "")
            }),
            Some(ScriptedRun::LaunchError(msg)) => Err(anyhow!(msg)),
            None => bail!("scripted executor exhausted"),
        }
    }
}

/// Chat model that returns scripted responses and records every request.
pub struct ScriptedModel {
    responses: RefCell<VecDeque<Result<String, ModelRequestError>>>,
    requests: RefCell<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, ModelRequestError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.borrow().clone()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let remaining = self.responses.borrow().len();
        if remaining > 0 {
            bail!("scripted model has {remaining} unused responses");
        }
        Ok(())
    }
}

impl ChatModel for ScriptedModel {
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(err)) => Err(err.into()),
            None => bail!("scripted model exhausted"),
        }
    }
}
