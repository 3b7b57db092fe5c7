//! Helpers for running external commands with bounded, deadlock-free capture.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// Limits applied to a single command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLimits {
    /// Kill the child after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Bytes of stdout/stderr kept in memory (the rest is drained and dropped).
    pub output_limit_bytes: usize,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            timeout: None,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Stdout followed by stderr, decoded lossily as UTF-8.
    pub fn combined(&self) -> String {
        let mut buf = String::from_utf8_lossy(&self.stdout).into_owned();
        if !self.stderr.is_empty() {
            if !buf.is_empty() && !buf.ends_with('\n') {
                buf.push('\n');
            }
            buf.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        if self.stdout_truncated > 0 || self.stderr_truncated > 0 {
            buf.push_str(&format!(
                "\n[output truncated: stdout {} bytes, stderr {} bytes]\n",
                self.stdout_truncated, self.stderr_truncated
            ));
        }
        buf
    }
}

/// Structured failure of a command that was expected to succeed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("`{command}` timed out after {secs}s")]
    TimedOut { command: String, secs: u64 },
    #[error("`{command}` exited with status {}", status_label(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

fn status_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Where captured output is mirrored while the child runs.
#[derive(Debug, Clone, Copy)]
enum Echo {
    Stdout,
    Stderr,
}

/// Run a command and capture stdout/stderr without echoing anything.
#[instrument(skip_all, fields(command = %describe(&cmd)))]
pub fn run_command(cmd: Command, limits: CommandLimits) -> Result<CommandOutput> {
    run_inner(cmd, limits, false)
}

/// Run a command and fail with [`CommandError`] unless it exits zero.
///
/// With `stream`, output is mirrored to the terminal line by line while still
/// being captured, and stdin is inherited so the child can prompt (e.g. sudo).
pub fn run_checked(cmd: Command, limits: CommandLimits, stream: bool) -> Result<CommandOutput> {
    let command = describe(&cmd);
    let output = run_inner(cmd, limits, stream)?;
    if output.timed_out {
        let secs = limits.timeout.map_or(0, |t| t.as_secs());
        return Err(CommandError::TimedOut { command, secs }.into());
    }
    if !output.status.success() {
        return Err(CommandError::Failed {
            command,
            code: output.status.code(),
            output: output.combined(),
        }
        .into());
    }
    Ok(output)
}

/// Render a command line for logs and error messages.
pub fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

fn run_inner(mut cmd: Command, limits: CommandLimits, stream: bool) -> Result<CommandOutput> {
    if stream {
        cmd.stdin(Stdio::inherit());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn `{}`", describe(&cmd)));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = limits.output_limit_bytes;
    let stdout_echo = stream.then_some(Echo::Stdout);
    let stderr_echo = stream.then_some(Echo::Stderr);
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit, stdout_echo));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit, stderr_echo));

    let mut timed_out = false;
    let status = match limits.timeout {
        None => child.wait().context("wait for command")?,
        Some(timeout) => match child.wait_timeout(timeout).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "command timed out, killing"
                );
                timed_out = true;
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        },
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream line by line with a size limit, optionally mirroring each
/// line to the terminal as it arrives.
fn read_stream_limited<R: Read>(
    reader: R,
    limit: usize,
    echo: Option<Echo>,
) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read output")?;
        if n == 0 {
            break;
        }

        if let Some(target) = echo
            && let Err(e) = mirror_line(target, &line)
        {
            warn!(err = %e, "failed to mirror command output");
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}

fn mirror_line(target: Echo, line: &[u8]) -> std::io::Result<()> {
    match target {
        Echo::Stdout => {
            let mut out = std::io::stdout().lock();
            out.write_all(line)?;
            out.flush()
        }
        Echo::Stderr => {
            let mut err = std::io::stderr().lock();
            err.write_all(line)?;
            err.flush()
        }
    }
}
