//! Per-attempt artifacts written under `--log-dir`.
//!
//! Artifacts are diagnostics for humans; the loop never reads them back.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::core::decision::Decision;
use crate::core::diagnostic::truncated_notice;
use crate::core::types::{AttemptOutcome, ExecReport};

/// Generate a run id from the current UTC time (`run-YYYYmmdd_HHMMSS`).
pub fn generate_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub run_id: String,
    pub attempt: u32,
    pub max_iterations: u32,
    pub success: bool,
    pub launched: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: Option<u64>,
    pub decision: Decision,
    pub error: Option<String>,
}

impl AttemptMeta {
    fn from_outcome(run_id: &str, outcome: &AttemptOutcome) -> Self {
        let report = outcome.report.as_ref();
        Self {
            run_id: run_id.to_string(),
            attempt: outcome.attempt,
            max_iterations: outcome.max_iterations,
            success: outcome.succeeded(),
            launched: report.is_some(),
            exit_code: report.and_then(|r| r.exit_code),
            timed_out: report.is_some_and(ExecReport::timed_out),
            duration_ms: report.map(|r| r.elapsed.as_millis() as u64),
            decision: outcome.decision,
            error: outcome.error.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub program_path: PathBuf,
    pub execution_log_path: PathBuf,
    pub meta_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(log_dir: &Path, run_id: &str, attempt: u32) -> Self {
        let dir = log_dir.join(run_id).join(attempt.to_string());
        Self {
            program_path: dir.join("program.txt"),
            execution_log_path: dir.join("execution.log"),
            meta_path: dir.join("meta.json"),
            dir,
        }
    }
}

/// Writer for one run's attempt artifacts.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    log_dir: PathBuf,
    run_id: String,
}

impl AttemptLog {
    pub fn new(log_dir: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> PathBuf {
        self.log_dir.join(&self.run_id)
    }

    pub fn write(&self, outcome: &AttemptOutcome) -> Result<AttemptPaths> {
        let paths = AttemptPaths::new(&self.log_dir, &self.run_id, outcome.attempt);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

        // Write in deterministic order to keep logs stable.
        write_text(&paths.program_path, &outcome.code)?;
        write_text(&paths.execution_log_path, &render_execution_log(outcome))?;
        write_json(
            &paths.meta_path,
            &AttemptMeta::from_outcome(&self.run_id, outcome),
        )?;

        debug!(dir = %paths.dir.display(), attempt = outcome.attempt, "wrote attempt artifacts");
        Ok(paths)
    }
}

fn render_execution_log(outcome: &AttemptOutcome) -> String {
    let mut buf = String::new();
    match &outcome.report {
        Some(report) => {
            buf.push_str("=== stdout ===\n");
            buf.push_str(&report.stdout);
            buf.push_str(&truncated_notice("stdout", report.stdout_truncated));
            buf.push_str("\n=== stderr ===\n");
            buf.push_str(&report.stderr);
            buf.push_str(&truncated_notice("stderr", report.stderr_truncated));
            if let Some(limit) = report.timed_out_after {
                buf.push_str(&format!(
                    "\n[program timed out after {}s]\n",
                    limit.as_secs_f64()
                ));
            }
        }
        None => {
            buf.push_str("[program was not executed]\n");
            if let Some(error) = &outcome.error {
                buf.push_str(error);
                buf.push('\n');
            }
        }
    }
    buf
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
