use crate::models::tool::{ToolInvocation, ToolKind, ToolSpec, ToolStatus};
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long to keep draining pipes after the process is gone. A grandchild
/// that inherited the pipe can hold it open past the exit.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs one external analysis command with a wall-clock budget.
///
/// Nothing here returns an error: a missing executable, a non-zero exit and
/// a timeout are all [`ToolStatus`] values on the returned invocation. The
/// tool runs in its own process group so a timeout takes down everything it
/// started, not just the direct child.
pub async fn run_tool(spec: &ToolSpec) -> ToolInvocation {
    let start = Instant::now();
    let command_line = spec.display_command();

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            if !matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) {
                log::warn!("{} could not be started: {e}", spec.kind);
            }
            return ToolInvocation {
                kind: spec.kind,
                command: command_line,
                status: ToolStatus::NotFound,
                exit_code: None,
                stdout: String::new(),
                stderr: format!("Failed to execute: {e}"),
                elapsed: start.elapsed(),
            };
        }
    };

    // The child leads its group, so the group id is its pid.
    let group = child.id();
    let stdout_pipe = PipeDrain::spawn(child.stdout.take());
    let stderr_pipe = PipeDrain::spawn(child.stderr.take());

    let waited = timeout(spec.timeout, child.wait()).await;
    let (mut status, exit_code, wait_error) = match waited {
        Ok(Ok(exit)) if exit.success() => (ToolStatus::Success, exit.code(), None),
        Ok(Ok(exit)) => (ToolStatus::NonZeroExit, exit.code(), None),
        Ok(Err(e)) => (ToolStatus::NonZeroExit, None, Some(e.to_string())),
        Err(_) => {
            kill_group(group, spec.kind);
            if let Err(e) = child.kill().await {
                log::warn!("failed to kill timed out {} tool: {e}", spec.kind);
            }
            (ToolStatus::Timeout, None, None)
        }
    };

    let ((stdout, stdout_closed), (mut stderr, stderr_closed)) =
        tokio::join!(stdout_pipe.finish(), stderr_pipe.finish());
    if !(stdout_closed && stderr_closed) && status != ToolStatus::Timeout {
        log::debug!("{} left processes holding its output open", spec.kind);
        kill_group(group, spec.kind);
    }
    if let Some(err) = wait_error {
        stderr.push_str(&format!("\nFailed to wait for process: {err}"));
    }

    if status == ToolStatus::NonZeroExit && is_missing_module(&stdout, &stderr) {
        status = ToolStatus::NotFound;
    }

    let elapsed = start.elapsed();
    log::debug!(
        "{} finished: {:?} (exit {:?}) in {}ms",
        spec.kind,
        status,
        exit_code,
        elapsed.as_millis()
    );

    ToolInvocation {
        kind: spec.kind,
        command: command_line,
        status,
        exit_code,
        stdout,
        stderr,
        elapsed,
    }
}

#[cfg(unix)]
fn kill_group(group: Option<u32>, kind: ToolKind) {
    let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: kill(2) only sends a signal; a negative pid addresses the group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            log::warn!("failed to kill {kind} process group: {err}");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>, _kind: ToolKind) {}

/// Reads a pipe into a shared buffer, so bytes that arrived before an abort
/// are kept.
struct PipeDrain {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeDrain {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                }
            }
        });
        Self { buf, task }
    }

    /// Captured text, and whether the pipe reached end of file within the
    /// grace period.
    async fn finish(mut self) -> (String, bool) {
        let closed = match timeout(PIPE_DRAIN_GRACE, &mut self.task).await {
            Ok(_) => true,
            Err(_) => {
                self.task.abort();
                false
            }
        };
        let text = self
            .buf
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default();
        (text, closed)
    }
}

// `python -m <tool>` without the tool installed.
fn is_missing_module(stdout: &str, stderr: &str) -> bool {
    stdout.trim().is_empty() && stderr.contains("No module named")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolKind;
    use std::path::PathBuf;

    fn spec(program: &str, args: &[&str], timeout_ms: u64) -> ToolSpec {
        ToolSpec {
            kind: ToolKind::Lint,
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let result = run_tool(&spec("echo", &["hello"], 5_000)).await;
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn missing_executable_is_not_found() {
        let result = run_tool(&spec("nonexistent_tool_xyz_123", &[], 5_000)).await;
        assert_eq!(result.status, ToolStatus::NotFound);
        assert!(result.stderr.contains("Failed to execute"));
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_output() {
        let result = run_tool(&spec("sh", &["-c", "echo 'a.py:1: unused import'; exit 3"], 5_000)).await;
        assert_eq!(result.status, ToolStatus::NonZeroExit);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.stdout.contains("unused import"));
        assert!(result.status.has_parseable_output());
    }

    #[tokio::test]
    async fn slow_command_times_out_and_is_killed() {
        let started = Instant::now();
        let result = run_tool(&spec("sleep", &["10"], 200)).await;
        assert_eq!(result.status, ToolStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!result.status.has_parseable_output());
    }

    #[tokio::test]
    async fn timeout_kills_processes_the_tool_started() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("M");
        let script = format!("sleep 3; touch '{}'", marker.display());
        let result = run_tool(&spec("sh", &["-c", &script], 1_000)).await;
        assert_eq!(result.status, ToolStatus::Timeout);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn output_survives_a_background_process_holding_the_pipe() {
        let started = Instant::now();
        let result = run_tool(&spec("sh", &["-c", "echo ready; sleep 30 & exit 0"], 10_000)).await;
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.stdout.trim(), "ready");
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test]
    async fn missing_python_module_is_not_found() {
        let result = run_tool(&spec(
            "sh",
            &["-c", "echo '/usr/bin/python3: No module named radon' >&2; exit 1"],
            5_000,
        ))
        .await;
        assert_eq!(result.status, ToolStatus::NotFound);
    }

    #[tokio::test]
    async fn stderr_is_captured_separately() {
        let result = run_tool(&spec("sh", &["-c", "echo out; echo err >&2"], 5_000)).await;
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
    }
}
