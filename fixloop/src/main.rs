//! Self-correcting code generation loop.
//!
//! Asks a language model for a program that solves a task, runs it, and feeds
//! failures back into the next request until the program succeeds or the retry
//! ceiling is reached.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::{debug, warn};

use fixloop::core::state::LoopState;
use fixloop::core::types::AttemptOutcome;
use fixloop::exit_codes;
use fixloop::generator::LlmGenerator;
use fixloop::io::attempt_log::{AttemptLog, generate_run_id};
use fixloop::io::config::{
    ConfigOverrides, DEFAULT_CONFIG_FILE, FixloopConfig, apply_overrides, load_config,
    resolve_api_key, write_config,
};
use fixloop::io::executor::SubprocessExecutor;
use fixloop::io::llm::OpenAiCompatClient;
use fixloop::io::prompt::PromptBuilder;
use fixloop::logging;
use fixloop::looping::{LoopOutcome, LoopStop, run_loop};

#[derive(Parser)]
#[command(
    name = "fixloop",
    version,
    about = "Generate a program with a language model and retry until it runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, run and repair a program for a task.
    Run(RunArgs),
    /// Write a default `fixloop.toml` if missing.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
        /// Config file to write.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("task_source").required(true).args(["task", "task_file"])))]
struct RunArgs {
    /// Natural-language description of the program to write.
    #[arg(long)]
    task: Option<String>,
    /// Read the task description from a file.
    #[arg(long)]
    task_file: Option<PathBuf>,
    /// Maximum number of generation attempts.
    #[arg(long)]
    max_iterations: Option<u32>,
    /// Wall-clock limit for each program run, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Model name to request.
    #[arg(long)]
    model: Option<String>,
    /// Config file (defaults apply when it does not exist).
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Write the final program here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Write per-attempt artifacts under this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() {
    // Variables already in the environment take precedence over `.env`.
    let dotenv = dotenvy::dotenv();
    logging::init();
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(%err, "ignoring unreadable .env file"),
    }
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    // Usage errors share the invalid-input exit code; clap would exit with 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            err.print().context("print usage")?;
            return Ok(code);
        }
    };
    match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::Init { force, config } => cmd_init(&config, force),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &FixloopConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let config = apply_overrides(
        config,
        &ConfigOverrides {
            max_iterations: args.max_iterations,
            timeout_secs: args.timeout_secs,
            model: args.model.clone(),
        },
    )
    .context("apply command-line overrides")?;

    let task = read_task(args)?;
    let state = LoopState::new(task, config.max_iterations)?;
    let executor = SubprocessExecutor::from_config(&config.sandbox)?;
    let api_key = resolve_api_key(&config.model)?;
    let client = OpenAiCompatClient::new(&config.model, api_key)?;
    let generator = LlmGenerator::new(client, PromptBuilder::new(config.sandbox.language.as_str())?);

    let attempt_log = args
        .log_dir
        .as_ref()
        .map(|dir| AttemptLog::new(dir.clone(), generate_run_id()));
    if let Some(log) = &attempt_log {
        debug!(run_dir = %log.run_dir().display(), "writing attempt artifacts");
    }

    let stdout = std::io::stdout();
    let outcome = run_loop(state, &generator, &executor, |attempt| {
        let mut out = stdout.lock();
        out.write_all(render_attempt(attempt).as_bytes())
            .and_then(|()| out.flush())
            .context("write attempt trace")?;
        if let Some(log) = &attempt_log {
            log.write(attempt)?;
        }
        Ok(())
    })?;

    emit_final(&outcome, args.output.as_deref())?;
    Ok(match outcome.stop {
        LoopStop::Success => exit_codes::OK,
        LoopStop::Exhausted => exit_codes::EXHAUSTED,
    })
}

fn read_task(args: &RunArgs) -> Result<String> {
    match (&args.task, &args.task_file) {
        (Some(task), _) => Ok(task.clone()),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("read task file {}", path.display()))
        }
        (None, None) => anyhow::bail!("either --task or --task-file is required"),
    }
}

/// Trace lines for one finished attempt.
fn render_attempt(outcome: &AttemptOutcome) -> String {
    let mut buf = format!(
        "--- attempt {}/{}: generated {} lines ---\n",
        outcome.attempt,
        outcome.max_iterations,
        outcome.code.lines().count()
    );
    match &outcome.error {
        None => buf.push_str(&format!("EXECUTION SUCCESS (attempt {})\n", outcome.attempt)),
        Some(error) => {
            buf.push_str(&format!("EXECUTION FAILED (attempt {})\n", outcome.attempt));
            for line in error.lines() {
                buf.push_str("  ");
                buf.push_str(line);
                buf.push('\n');
            }
        }
    }
    buf
}

fn render_status(outcome: &LoopOutcome) -> String {
    let state = &outcome.state;
    match outcome.stop {
        LoopStop::Success => format!(
            "status: success after {} of {} attempts",
            state.iterations(),
            state.max_iterations()
        ),
        LoopStop::Exhausted => format!(
            "status: exhausted {} attempts; the last program still fails",
            state.iterations()
        ),
    }
}

fn emit_final(outcome: &LoopOutcome, output: Option<&Path>) -> Result<()> {
    let code = outcome.state.code();
    let mut out = std::io::stdout().lock();
    match output {
        Some(path) => {
            let mut contents = code.to_string();
            contents.push('\n');
            fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
            writeln!(out, "final code written to {}", path.display())?;
        }
        None => {
            writeln!(out, "--- final code ---")?;
            writeln!(out, "{code}")?;
        }
    }
    writeln!(out, "{}", render_status(outcome))?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixloop::core::decision::Decision;

    fn attempt(error: Option<&str>) -> AttemptOutcome {
        AttemptOutcome {
            attempt: 2,
            max_iterations: 3,
            code: "x = 1\nprint(x)".to_string(),
            error: error.map(str::to_string),
            report: None,
            decision: Decision::Continue,
        }
    }

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["fixloop", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false, .. }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["fixloop", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "fixloop",
            "run",
            "--task",
            "print 1",
            "--max-iterations",
            "5",
            "--timeout-secs",
            "2",
            "--log-dir",
            "logs",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.task.as_deref(), Some("print 1"));
        assert_eq!(args.max_iterations, Some(5));
        assert_eq!(args.timeout_secs, Some(2));
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert_eq!(args.log_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn run_requires_exactly_one_task_source() {
        assert!(Cli::try_parse_from(["fixloop", "run"]).is_err());
        assert!(
            Cli::try_parse_from([
                "fixloop",
                "run",
                "--task",
                "a",
                "--task-file",
                "task.txt"
            ])
            .is_err()
        );
    }

    #[test]
    fn read_task_from_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("task.txt");
        fs::write(&path, "print the numbers 1 to 3\n").expect("write task");
        let cli = Cli::parse_from([
            "fixloop",
            "run",
            "--task-file",
            path.to_str().expect("utf8 path"),
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(
            read_task(&args).expect("task"),
            "print the numbers 1 to 3\n"
        );
    }

    #[test]
    fn render_successful_attempt() {
        assert_eq!(
            render_attempt(&attempt(None)),
            "--- attempt 2/3: generated 2 lines ---\nEXECUTION SUCCESS (attempt 2)\n"
        );
    }

    #[test]
    fn render_failed_attempt_indents_error() {
        let rendered = render_attempt(&attempt(Some(
            "Traceback (most recent call last):\nZeroDivisionError: division by zero",
        )));
        assert!(rendered.contains("EXECUTION FAILED (attempt 2)\n"));
        assert!(rendered.ends_with(
            "  Traceback (most recent call last):\n  ZeroDivisionError: division by zero\n"
        ));
    }

    #[test]
    fn render_status_reports_stop_reason() {
        let mut state = LoopState::new("print 1", 3).expect("state");
        state.record_generation("print(1)".to_string());
        let success = LoopOutcome {
            state: state.clone(),
            stop: LoopStop::Success,
        };
        assert_eq!(render_status(&success), "status: success after 1 of 3 attempts");

        state.record_execution(Some("boom".to_string()));
        let exhausted = LoopOutcome {
            state,
            stop: LoopStop::Exhausted,
        };
        assert!(render_status(&exhausted).starts_with("status: exhausted 1 attempts"));
    }
}
