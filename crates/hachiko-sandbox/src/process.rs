//! Bounded subprocess execution
//!
//! Every command, containerized or bare, runs under a hard wall-clock
//! timeout. On expiry the child is force-killed and whatever stdout/stderr
//! it produced so far is still returned; the distinguished exit code
//! [`TIMEOUT_EXIT_CODE`] marks the expiry.

use crate::error::SandboxError;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Exit code reported when a command is killed on timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Default limit for bare commands when the caller passes none.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Captured outcome of one command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    /// Process exit code; [`TIMEOUT_EXIT_CODE`] on expiry, -1 when killed
    /// by a signal
    pub exit_code: i32,
    /// Captured stdout (partial when the command timed out)
    pub stdout: String,
    /// Captured stderr (partial when the command timed out)
    pub stderr: String,
    /// Wall clock from spawn to collection
    pub execution_time: Duration,
    /// Whether the wall-clock limit expired
    pub timed_out: bool,
}

impl CommandOutput {
    /// Did the command exit cleanly?
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn drain<R>(pipe: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Run a prepared command under `limit`.
///
/// The pipes are drained by independent tasks, so output captured before a
/// timeout kill survives the kill.
pub(crate) async fn run_with_timeout(
    mut command: Command,
    limit: Duration,
) -> Result<CommandOutput, SandboxError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = command.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let (exit_code, timed_out) = match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
        Ok(Err(e)) => return Err(SandboxError::Io(e)),
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            (TIMEOUT_EXIT_CODE, true)
        }
    };

    Ok(CommandOutput {
        exit_code,
        stdout: stdout.await.unwrap_or_default(),
        stderr: stderr.await.unwrap_or_default(),
        execution_time: started.elapsed(),
        timed_out,
    })
}

/// Run a bare subprocess outside any container context.
///
/// For operations that do not need isolation, such as local git commands.
/// Same timeout-and-partial-output contract as in-container execution.
pub async fn execute_command(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<CommandOutput, SandboxError> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    let limit = timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT);
    let output = run_with_timeout(command, limit).await?;
    if output.timed_out {
        tracing::warn!(
            "command '{}' exceeded its {}s limit and was killed",
            program,
            limit.as_secs()
        );
    }
    Ok(output)
}
