//! Child processes with a deadline and bounded output capture.

use std::io::{ErrorKind, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Limits applied to a single child process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    pub timeout: Duration,
    /// Bytes kept per stream; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CapturedOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// True when the child exited zero before the deadline.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Short human-readable reason for a non-successful run.
    pub fn failure_summary(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        let stderr = self.stderr_text();
        let stderr = stderr.trim();
        match (self.status.code(), stderr.is_empty()) {
            (Some(code), true) => format!("exit status {code}"),
            (Some(code), false) => format!("exit status {code}: {stderr}"),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {stderr}"),
        }
    }
}

/// Run `cmd`, feed it `stdin`, and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is written and both output streams are read on helper threads while
/// the child runs. On timeout the child is killed and `timed_out` is set.
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs(), output_limit_bytes = limits.output_limit_bytes))]
pub fn run_with_limits(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    limits: ProcessLimits,
) -> Result<CapturedOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdin_handle = match stdin {
        Some(input) => {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            Some(thread::spawn(move || -> Result<()> {
                match pipe.write_all(&input) {
                    Ok(()) => Ok(()),
                    // The child may exit without reading everything.
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                        debug!("child closed stdin early");
                        Ok(())
                    }
                    Err(e) => Err(e).context("write stdin"),
                }
            }))
        }
        None => None,
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
    let stdout_handle = thread::spawn(move || read_bounded(stdout, limit));
    let stderr_handle = thread::spawn(move || read_bounded(stderr, limit));

    let mut timed_out = false;
    let status = match child
        .wait_timeout(limits.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = limits.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(handle) = stdin_handle {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(anyhow!("stdin writer thread panicked")),
        }
    }
    let (stdout, stdout_truncated) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_reader(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Build a [`Command`] from an argv vector.
pub fn command_from_argv(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("command must not be empty"))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_bounded<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn limits(secs: u64, bytes: usize) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(secs),
            output_limit_bytes: bytes,
        }
    }

    #[test]
    fn echoes_stdin_to_stdout() {
        let output = run_with_limits(sh("cat"), Some(b"hello".to_vec()), limits(10, 1024))
            .expect("run");
        assert!(output.succeeded());
        assert_eq!(output.stdout_text(), "hello");
    }

    #[test]
    fn bounds_captured_output() {
        let output = run_with_limits(sh("printf 'abcdefghij'"), None, limits(10, 4)).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn kills_child_on_timeout() {
        let output = run_with_limits(sh("sleep 2"), None, ProcessLimits {
            timeout: Duration::from_millis(100),
            output_limit_bytes: 1024,
        })
        .expect("run");
        assert!(output.timed_out);
        assert!(!output.succeeded());
        assert_eq!(output.failure_summary(), "timed out");
    }

    #[test]
    fn failure_summary_includes_stderr() {
        let output =
            run_with_limits(sh("echo boom >&2; exit 3"), None, limits(10, 1024)).expect("run");
        assert_eq!(output.failure_summary(), "exit status 3: boom");
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(command_from_argv(&[]).is_err());
        assert!(command_from_argv(&["true".to_string()]).is_ok());
    }
}
