//! Turning execution results into feedback for the next generation.

use crate::core::types::ExecReport;

/// Feedback text for a finished execution, or `None` if the program succeeded.
///
/// Non-zero exits always produce a diagnostic: stderr when the program wrote
/// any, stdout otherwise, and a synthetic status line when both are empty.
/// Timeouts describe the limit and carry whatever stderr was captured.
pub fn execution_feedback(report: &ExecReport) -> Option<String> {
    if report.succeeded() {
        return None;
    }

    if let Some(limit) = report.timed_out_after {
        let mut msg = format!(
            "execution timed out after {}s and was killed",
            limit.as_secs_f64()
        );
        let stderr = report.stderr.trim();
        if !stderr.is_empty() {
            msg.push_str("\nstderr before timeout:\n");
            msg.push_str(stderr);
            msg.push_str(&truncated_notice("stderr", report.stderr_truncated));
        }
        return Some(msg);
    }

    let stderr = report.stderr.trim();
    if !stderr.is_empty() {
        return Some(format!(
            "{stderr}{}",
            truncated_notice("stderr", report.stderr_truncated)
        ));
    }
    let stdout = report.stdout.trim();
    if !stdout.is_empty() {
        return Some(format!(
            "{}\n{stdout}{}",
            exit_line(report.exit_code),
            truncated_notice("stdout", report.stdout_truncated)
        ));
    }
    Some(exit_line(report.exit_code))
}

/// Feedback for a program that could not be started.
pub fn launch_failure_feedback(err: &anyhow::Error) -> String {
    format!("failed to launch program: {err:#}")
}

/// Feedback for a generation that produced no program text.
pub fn empty_program_feedback() -> String {
    "the generated program was empty; return the complete program source".to_string()
}

/// Notice appended to captured output when bytes were dropped at the output limit.
pub fn truncated_notice(label: &str, truncated: usize) -> String {
    if truncated > 0 {
        format!("\n[{label} truncated {truncated} bytes]")
    } else {
        String::new()
    }
}

fn exit_line(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("process exited with status {code}"),
        None => "process was terminated by a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(exit_code: Option<i32>, stdout: &str, stderr: &str) -> ExecReport {
        ExecReport {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            stdout_truncated: 0,
            stderr_truncated: 0,
            timed_out_after: None,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn success_has_no_feedback() {
        assert_eq!(execution_feedback(&report(Some(0), "1\n", "")), None);
    }

    #[test]
    fn success_with_stderr_noise_is_still_success() {
        assert_eq!(
            execution_feedback(&report(Some(0), "", "DeprecationWarning")),
            None
        );
    }

    #[test]
    fn failure_prefers_stderr() {
        let feedback = execution_feedback(&report(
            Some(1),
            "partial",
            "Traceback (most recent call last):\nZeroDivisionError: division by zero\n",
        ))
        .expect("feedback");
        assert!(feedback.starts_with("Traceback"));
        assert!(feedback.ends_with("division by zero"));
        assert!(!feedback.contains("partial"));
    }

    #[test]
    fn failure_falls_back_to_stdout() {
        let feedback = execution_feedback(&report(Some(3), "bad input\n", "")).expect("feedback");
        assert_eq!(feedback, "process exited with status 3\nbad input");
    }

    #[test]
    fn silent_failure_reports_status() {
        assert_eq!(
            execution_feedback(&report(Some(2), "", "  \n")),
            Some("process exited with status 2".to_string())
        );
        assert_eq!(
            execution_feedback(&report(None, "", "")),
            Some("process was terminated by a signal".to_string())
        );
    }

    #[test]
    fn timeout_is_reported_even_with_zero_status() {
        let mut timed_out = report(Some(0), "", "");
        timed_out.timed_out_after = Some(Duration::from_secs(5));
        let feedback = execution_feedback(&timed_out).expect("feedback");
        assert_eq!(feedback, "execution timed out after 5s and was killed");
    }

    #[test]
    fn timeout_includes_captured_stderr() {
        let mut timed_out = report(None, "", "still working");
        timed_out.timed_out_after = Some(Duration::from_millis(1500));
        let feedback = execution_feedback(&timed_out).expect("feedback");
        assert!(feedback.starts_with("execution timed out after 1.5s"));
        assert!(feedback.contains("still working"));
    }

    #[test]
    fn truncation_is_noted() {
        let mut failed = report(Some(1), "", "error line");
        failed.stderr_truncated = 42;
        let feedback = execution_feedback(&failed).expect("feedback");
        assert!(feedback.ends_with("[stderr truncated 42 bytes]"));
    }

    #[test]
    fn launch_failure_includes_chain() {
        let err = anyhow::anyhow!("No such file or directory").context("spawn command");
        let feedback = launch_failure_feedback(&err);
        assert_eq!(
            feedback,
            "failed to launch program: spawn command: No such file or directory"
        );
    }
}
