//! Child process execution with a wall-clock limit and bounded output capture.
//!
//! On unix the child leads its own process group, and the whole group is killed
//! when the deadline passes or the child exits, so a program that forks cannot
//! outlive its run or keep the output pipes open.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long reader threads may keep draining after the child is gone.
const READER_GRACE: Duration = Duration::from_secs(1);
const READER_POLL: Duration = Duration::from_millis(5);

/// Bytes kept from one output stream, plus the count dropped at the limit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl Captured {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.bytes.len());
        let keep = chunk.len().min(room);
        self.bytes.extend_from_slice(&chunk[..keep]);
        self.dropped += chunk.len() - keep;
    }

    /// Lossy UTF-8 view of the kept bytes.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Everything observed about one finished (or killed) child process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    pub timed_out: bool,
    pub elapsed: Duration,
}

/// A pipe drained on its own thread into a shared buffer.
struct Reader {
    label: &'static str,
    captured: Arc<Mutex<Captured>>,
    handle: JoinHandle<Result<()>>,
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
///
/// Stdin is closed. Both pipes are drained on their own threads while the child
/// runs, so a chatty program cannot block on a full pipe. At most
/// `output_limit_bytes` of each stream are kept; the rest is read and counted.
/// Output still arriving [`READER_GRACE`] after the child is reaped is abandoned.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs_f64(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .inspect_err(|err| error!(%err, "failed to spawn command"))
        .context("spawn command")?;

    let readers = spawn_reader(child.stdout.take(), "stdout", output_limit_bytes)
        .and_then(|stdout| {
            let stderr = spawn_reader(child.stderr.take(), "stderr", output_limit_bytes)?;
            Ok((stdout, stderr))
        });
    let (stdout, stderr) = match readers {
        Ok(readers) => readers,
        Err(err) => {
            terminate(&mut child);
            return Err(err);
        }
    };

    let (status, timed_out) = match child.wait_timeout(timeout) {
        Ok(Some(status)) => (status, false),
        Ok(None) => {
            warn!(
                timeout_secs = timeout.as_secs_f64(),
                "command timed out, killing"
            );
            kill_tree(&mut child);
            (child.wait().context("reap command after kill")?, true)
        }
        Err(err) => {
            terminate(&mut child);
            return Err(err).context("wait for command");
        }
    };
    let elapsed = started.elapsed();

    // Background processes the program left behind would hold the pipes open.
    kill_group(&child);

    let deadline = Instant::now() + READER_GRACE;
    let stdout = collect(stdout, deadline)?;
    let stderr = collect(stderr, deadline)?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output truncated"
        );
    }

    debug!(
        exit_code = ?status.code(),
        timed_out,
        elapsed_ms = elapsed.as_millis() as u64,
        "command finished"
    );
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
        elapsed,
    })
}

/// Kill the child and its group, then reap it. Errors are logged, not returned.
fn terminate(child: &mut Child) {
    kill_tree(child);
    if let Err(err) = child.wait() {
        warn!(%err, "failed to reap command");
    }
}

fn kill_tree(child: &mut Child) {
    kill_group(child);
    if let Err(err) = child.kill() {
        warn!(%err, "failed to kill command");
    }
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(%err, pgid, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn spawn_reader<R>(stream: Option<R>, label: &'static str, limit: usize) -> Result<Reader>
where
    R: Read + Send + 'static,
{
    let mut stream = stream.ok_or_else(|| anyhow!("{label} was not piped"))?;
    let captured = Arc::new(Mutex::new(Captured::default()));
    let sink = Arc::clone(&captured);
    let handle = thread::spawn(move || -> Result<()> {
        let mut chunk = [0u8; 8192];
        loop {
            let n = stream
                .read(&mut chunk)
                .with_context(|| format!("read {label}"))?;
            if n == 0 {
                return Ok(());
            }
            sink.lock()
                .map_err(|_| anyhow!("{label} buffer poisoned"))?
                .push(&chunk[..n], limit);
        }
    });
    Ok(Reader {
        label,
        captured,
        handle,
    })
}

/// Wait for a reader until `deadline`, then take whatever it captured.
fn collect(reader: Reader, deadline: Instant) -> Result<Captured> {
    while !reader.handle.is_finished() && Instant::now() < deadline {
        thread::sleep(READER_POLL);
    }
    if reader.handle.is_finished() {
        reader
            .handle
            .join()
            .map_err(|_| anyhow!("{} reader thread panicked", reader.label))??;
    } else {
        warn!(
            stream = reader.label,
            "pipe still open after exit, abandoning reader"
        );
    }
    let captured = reader
        .captured
        .lock()
        .map_err(|_| anyhow!("{} buffer poisoned", reader.label))?
        .clone();
    Ok(captured)
}
