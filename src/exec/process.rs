//! Blocking execution of external tools.
//!
//! Everything in here blocks the calling thread and is meant to run on the
//! [`WorkerPool`](super::pool::WorkerPool). Output pipes are drained on
//! helper threads so a chatty tool (ffmpeg writes a lot to stderr) can never
//! stall on a full pipe buffer.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// How often a child with a deadline is polled for completion.
const DEADLINE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised while launching or supervising an external tool.
///
/// A tool that runs to completion with a non-zero exit status is not an
/// error at this level; callers inspect [`ToolOutput::status`].
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} did not finish within {}s and was killed", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("failed while waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// An external command line plus an optional deadline.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Kill the tool if it is still running after `timeout`. `None` waits forever.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Arguments as lossy UTF-8, mostly for logs and tests.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

/// Captured result of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Best human-readable explanation of a failure: stderr if the tool wrote
    /// any, otherwise stdout, otherwise the exit status.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.status.code() {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Run a tool to completion, capturing stdout and stderr.
pub fn run(command: &ToolCommand) -> Result<ToolOutput, ExecError> {
    let program = command.program_name();
    debug!(program = %program, args = ?command.arg_strings(), "launching tool");

    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // A group of its own, so a deadline also takes down helpers the tool
    // starts (yt-dlp runs ffmpeg for the merge step).
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut process, 0);

    let mut child = process
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match command.timeout {
        None => child.wait().map_err(|source| ExecError::Wait {
            program: program.clone(),
            source,
        })?,
        Some(timeout) => match wait_with_deadline(&mut child, timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                // A helper that left the group may still hold the pipes open,
                // so the drain threads are detached rather than joined.
                warn!(program = %program, timeout_secs = timeout.as_secs(), "tool timed out");
                return Err(ExecError::TimedOut { program, timeout });
            }
            Err(source) => return Err(ExecError::Wait { program, source }),
        },
    };

    Ok(ToolOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

/// Wait for `child`, killing it once `timeout` elapses. `Ok(None)` means killed.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            kill_group(child);
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(DEADLINE_POLL_INTERVAL);
    }
}

/// Kill `child` and everything else in its process group.
fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: plain syscall; the group id is the child's own pid because
        // it was spawned with `process_group(0)`.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let cmd = ToolCommand::new("sh").args(["-c", "echo hello"]);
        let output = run(&cmd).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_reports_non_zero_exit_with_stderr() {
        let cmd = ToolCommand::new("sh").args(["-c", "echo broken >&2; exit 3"]);
        let output = run(&cmd).unwrap();
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.diagnostic(), "broken");
    }

    #[test]
    fn test_diagnostic_falls_back_to_exit_status() {
        let cmd = ToolCommand::new("sh").args(["-c", "exit 7"]);
        let output = run(&cmd).unwrap();
        assert_eq!(output.diagnostic(), "exited with status 7");
    }

    #[test]
    fn test_run_missing_program() {
        let cmd = ToolCommand::new("/nonexistent/definitely-not-a-tool");
        let err = run(&cmd).unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[test]
    fn test_run_kills_tool_after_deadline() {
        let cmd = ToolCommand::new("sleep")
            .arg("5")
            .timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = run(&cmd).unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_deadline_kills_helper_processes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("late");
        let script = format!("(sleep 1; touch '{}') & wait", marker.display());
        let cmd = ToolCommand::new("sh")
            .args(["-c", script.as_str()])
            .timeout(Some(Duration::from_millis(200)));
        let err = run(&cmd).unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }));

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }

    #[test]
    fn test_run_large_stderr_does_not_block() {
        // Well past the default 64 KiB pipe buffer.
        let cmd = ToolCommand::new("sh").args([
            "-c",
            "i=0; while [ $i -lt 5000 ]; do echo 'frame= 1 fps=0.0 q=0.0 size=0kB time=00:00:00.00' >&2; i=$((i+1)); done",
        ]);
        let output = run(&cmd).unwrap();
        assert!(output.success());
        assert!(output.stderr.lines().count() >= 5000);
    }

    #[test]
    fn test_arg_strings() {
        let cmd = ToolCommand::new("ffmpeg").arg("-y").args(["-i", "in.mp4"]);
        assert_eq!(cmd.program_name(), "ffmpeg");
        assert_eq!(cmd.arg_strings(), vec!["-y", "-i", "in.mp4"]);
    }
}
