//! # Pipeline Executor
//!
//! Runs compiled shell commands through `sh -c` so pipes behave as
//! written, capturing both output streams.
//!
//! ```text
//! shell command string -> [sh -c] -> ExecutionResult { stdout, stderr, status }
//! ```
//!
//! The same capture machinery backs the tool probe (short timeouts,
//! failure treated as absence) and the user-facing `run` surface. Reader
//! threads drain stdout/stderr while the parent polls for exit, so a
//! chatty pipeline can never deadlock on a full pipe buffer.

use std::io::{BufRead, BufReader, Lines, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{SparkError, SparkResult};

/// How often the parent polls a running child for exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of executing a shell command.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code.
    pub status: i32,
    /// The command that was executed.
    pub command: String,
}

impl ExecutionResult {
    /// Exit code 1 with a silent stderr is how grep reports "no matches";
    /// callers treat it as an empty result rather than a failure.
    pub fn is_no_match(&self) -> bool {
        self.status == 1 && self.stderr.is_empty()
    }
}

/// Raw capture of a child process, before UTF-8 conversion.
pub(crate) struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the child was killed on timeout or died to a signal.
    pub status: Option<i32>,
}

fn spawn_reader(stream: Option<impl Read + Send + 'static>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut s| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = s.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Run a command to completion, capturing both streams.
///
/// With a timeout, the child is polled until the deadline and killed if
/// it is still running; the caller sees `status: None`.
pub(crate) fn run_with_timeout(
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> std::io::Result<Captured> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let status = match timeout {
        None => Some(child.wait()?),
        Some(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                if let Some(status) = child.try_wait()? {
                    break Some(status);
                }
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                thread::sleep(WAIT_POLL_INTERVAL);
            }
        }
    };

    Ok(Captured {
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
        status: status.and_then(|s| s.code()),
    })
}

fn shell_command(command: &str, cwd: Option<&Path>) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd
}

/// Execute a compiled pipeline and return the captured result.
///
/// The result is returned for any exit code; interpreting exit code 1
/// (see [`ExecutionResult::is_no_match`]) is the caller's decision.
pub fn execute(
    command: &str,
    timeout: Option<Duration>,
    cwd: Option<&Path>,
) -> SparkResult<ExecutionResult> {
    debug!(command, "executing pipeline");
    let captured = run_with_timeout(&mut shell_command(command, cwd), timeout)?;

    let Some(status) = captured.status else {
        return Err(SparkError::Timeout(timeout.unwrap_or_default()));
    };

    Ok(ExecutionResult {
        stdout: String::from_utf8_lossy(&captured.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
        status,
        command: command.to_string(),
    })
}

/// Line-by-line stream over a running pipeline's stdout.
///
/// After the last line, a non-zero exit (other than grep's silent
/// exit-1) surfaces as a final `Err` item.
pub struct CommandStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_reader: Option<JoinHandle<Vec<u8>>>,
    finished: bool,
}

impl Iterator for CommandStream {
    type Item = SparkResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.lines.next() {
            Some(Ok(line)) => Some(Ok(line)),
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e.into()))
            }
            None => {
                self.finished = true;
                let status = match self.child.wait() {
                    Ok(s) => s.code().unwrap_or(-1),
                    Err(e) => return Some(Err(e.into())),
                };
                let stderr_bytes = join_reader(self.stderr_reader.take());
                let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
                if status == 0 || (status == 1 && stderr.is_empty()) {
                    None
                } else {
                    Some(Err(SparkError::Execution { status, stderr }))
                }
            }
        }
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Start a pipeline and stream its stdout lines.
pub fn stream(command: &str, cwd: Option<&Path>) -> SparkResult<CommandStream> {
    debug!(command, "streaming pipeline");
    let mut cmd = shell_command(command, cwd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let stdout = child.stdout.take().ok_or_else(|| {
        SparkError::Io(std::io::Error::other("child process has no stdout handle"))
    })?;
    let stderr_reader = spawn_reader(child.stderr.take());

    Ok(CommandStream {
        child,
        lines: BufReader::new(stdout).lines(),
        stderr_reader,
        finished: false,
    })
}
