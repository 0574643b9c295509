use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use kill_tree::{blocking::kill_tree_with_config, Config};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::RunnerError;

pub const DEFAULT_SHELL: &str = "bash";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Bytes kept per output stream
pub const DEFAULT_OUTPUT_LIMIT: usize = 16 * 1024;
/// Exit code reported for timed out or signalled commands
pub const SENTINEL_EXIT_CODE: i32 = -1;
pub const TRUNCATION_MARKER: &str = "... [output truncated]";

// How long to keep reading output after the shell exits, in case a background
// process still holds the pipes open
const OUTPUT_GRACE: Duration = Duration::from_millis(500);
const READ_CHUNK: usize = 8192;

/// The outcome of a command that was started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// stdout followed by stderr, trimmed
    pub output: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub truncated: bool,
    pub duration: Duration,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// The text handed back to the model as the tool result
    pub fn to_tool_text(&self, command: &str) -> String {
        let status = if self.timed_out {
            format!("{} (timed out after {:.1}s)", self.exit_code, self.duration.as_secs_f64())
        } else {
            self.exit_code.to_string()
        };
        format!(
            "Command: {}\nExit code: {}\nOutput:\n{}",
            command, status, self.output
        )
    }
}

/// Runs shell commands with a wall-clock timeout and bounded output capture
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: String,
    working_dir: Option<PathBuf>,
    output_limit: usize,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            working_dir: None,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn with_shell<S: Into<String>>(mut self, shell: S) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_working_dir<P: Into<PathBuf>>(mut self, working_dir: P) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn with_output_limit(mut self, output_limit: usize) -> Self {
        self.output_limit = output_limit;
        self
    }

    /// Run `command` through the shell.
    ///
    /// A command that fails or times out still produces a `CommandResult`; only a shell that
    /// cannot be started (or waited on) is an error.
    pub async fn run(&self, command: &str, timeout: Duration) -> Result<CommandResult, RunnerError> {
        let started = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            shell: self.shell.clone(),
            source,
        })?;
        tracing::info!(command, pid = child.id(), "running command");

        let stop_reading = CancellationToken::new();
        let stdout_task = tokio::spawn(read_bounded(
            child.stdout.take(),
            self.output_limit,
            stop_reading.clone(),
        ));
        let stderr_task = tokio::spawn(read_bounded(
            child.stderr.take(),
            self.output_limit,
            stop_reading.clone(),
        ));

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(RunnerError::Wait)?;
                (status.code().unwrap_or(SENTINEL_EXIT_CODE), false)
            }
            Err(_) => {
                tracing::warn!(command, timeout_ms = timeout.as_millis(), "command timed out");
                kill_process_tree(&mut child).await;
                (SENTINEL_EXIT_CODE, true)
            }
        };

        let (stdout, stdout_truncated) = finish_reading(stdout_task, &stop_reading).await;
        let (stderr, stderr_truncated) = finish_reading(stderr_task, &stop_reading).await;
        let truncated = stdout_truncated || stderr_truncated;

        let mut output = format!(
            "{}{}",
            String::from_utf8_lossy(&stdout),
            String::from_utf8_lossy(&stderr)
        )
        .trim()
        .to_string();
        if truncated {
            tracing::warn!(command, limit = self.output_limit, "command output truncated");
            output.push('\n');
            output.push_str(TRUNCATION_MARKER);
        }

        let duration = started.elapsed();
        tracing::info!(
            command,
            exit_code,
            timed_out,
            duration_ms = duration.as_millis(),
            output_bytes = output.len(),
            "command finished"
        );

        Ok(CommandResult {
            output,
            exit_code,
            timed_out,
            truncated,
            duration,
        })
    }
}

/// Read a stream to the end, keeping at most `limit` bytes but draining the rest so
/// the writer never blocks on a full pipe
async fn read_bounded<R>(reader: Option<R>, limit: usize, stop: CancellationToken) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let read = tokio::select! {
            read = reader.read(&mut chunk) => read,
            _ = stop.cancelled() => break,
        };
        match read {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading command output");
                break;
            }
        }
    }
    (kept, truncated)
}

async fn finish_reading(
    mut task: JoinHandle<(Vec<u8>, bool)>,
    stop: &CancellationToken,
) -> (Vec<u8>, bool) {
    let joined = match tokio::time::timeout(OUTPUT_GRACE, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            // something in the background still holds the pipe; keep what we have
            stop.cancel();
            task.await
        }
    };
    joined.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "output reader failed");
        (Vec::new(), false)
    })
}

/// Kill the shell and everything it spawned
async fn kill_process_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        let killed = tokio::task::spawn_blocking(move || {
            let config = Config {
                signal: "SIGKILL".to_string(),
                ..Default::default()
            };
            kill_tree_with_config(pid, &config)
        })
        .await;
        match killed {
            Ok(Ok(outputs)) => tracing::debug!(pid, killed = outputs.len(), "killed process tree"),
            Ok(Err(e)) => tracing::warn!(pid, error = %e, "failed to kill process tree"),
            Err(e) => tracing::warn!(pid, error = %e, "failed to kill process tree"),
        }
    }
    // the direct child may already be gone
    let _ = child.kill().await;
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo() {
        let result = CommandRunner::new()
            .run("echo hello", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result.output.contains("hello"));
        assert_eq!(result.exit_code, 0);
        assert!(!result.timed_out);
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_shell_syntax() {
        let result = CommandRunner::new()
            .run("printf 'a\\nb\\nc\\n' | wc -l | tr -d ' '", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.output, "3");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let result = CommandRunner::new()
            .run("echo failing; exit 3", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.output, "failing");
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_stdout_then_stderr() {
        let result = CommandRunner::new()
            .run("echo err >&2; echo out", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.output, "out\nerr");
    }

    #[tokio::test]
    async fn test_timeout() {
        let started = Instant::now();
        let result = CommandRunner::new()
            .run("sleep 10", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, SENTINEL_EXIT_CODE);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_pipeline() {
        let started = Instant::now();
        let result = CommandRunner::new()
            .run("echo partial; sleep 10 | cat", Duration::from_millis(500))
            .await
            .unwrap();
        assert!(result.timed_out);
        assert!(result.output.contains("partial"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_background_process_does_not_block() {
        let started = Instant::now();
        let result = CommandRunner::new()
            .run("sleep 10 & echo started", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!result.timed_out);
        assert!(result.output.contains("started"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_output_is_bounded() {
        let result = CommandRunner::new()
            .with_output_limit(1000)
            .run("head -c 100000 /dev/zero | tr '\\0' 'a'", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result.truncated);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.ends_with(TRUNCATION_MARKER));
        assert!(result.output.len() <= 1000 + 1 + TRUNCATION_MARKER.len());
    }

    #[tokio::test]
    async fn test_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let result = CommandRunner::new()
            .with_working_dir(dir.path())
            .run("ls", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result.output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_missing_shell_is_an_error() {
        let err = CommandRunner::new()
            .with_shell("/nonexistent/shell")
            .run("echo hi", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[test]
    fn test_tool_text() {
        let result = CommandResult {
            output: "src/\ntests/".to_string(),
            exit_code: 0,
            timed_out: false,
            truncated: false,
            duration: Duration::from_millis(12),
        };
        assert_eq!(
            result.to_tool_text("ls -d */"),
            "Command: ls -d */\nExit code: 0\nOutput:\nsrc/\ntests/"
        );

        let timed_out = CommandResult {
            output: String::new(),
            exit_code: SENTINEL_EXIT_CODE,
            timed_out: true,
            truncated: false,
            duration: Duration::from_secs(30),
        };
        assert!(timed_out
            .to_tool_text("sleep 60")
            .contains("Exit code: -1 (timed out after 30.0s)"));
    }
}
