use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

const DEFAULT_SHELL: &str = "/bin/sh";

/// Size of the read buffer for each output pipe. One filled read is one
/// sink call.
const CHUNK_SIZE: usize = 8 * 1024;

/// Receives process output as it is produced.
///
/// Each call carries one chunk exactly as read from the pipe. Chunks are
/// delivered in order and never coalesced.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(&self, chunk: &[u8]);
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to start script: {0}")]
    StartFailed(#[source] std::io::Error),

    #[error("script failed: {0}")]
    ExitFailed(String),
}

/// Runs resolved scripts through a POSIX shell, streaming stdout and stderr
/// to sinks while the child is alive.
///
/// No timeout is applied: `run` returns only once the child has exited and
/// both pipes have been drained.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    shell: PathBuf,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptExecutor {
    pub fn new() -> Self {
        Self::with_shell(DEFAULT_SHELL)
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Execute `sh <script>`.
    ///
    /// A spawn failure is reported before either sink is touched. A non-zero
    /// exit, a signal, or a broken pipe is reported after all output that
    /// could be read has been forwarded.
    pub async fn run(
        &self,
        script: &Path,
        stdout: &dyn OutputSink,
        stderr: &dyn OutputSink,
    ) -> Result<(), RunError> {
        let mut child = Command::new(&self.shell)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RunError::StartFailed)?;

        tracing::debug!(script = %script.display(), pid = ?child.id(), "Script started");

        let out_pipe = child.stdout.take();
        let err_pipe = child.stderr.take();

        let (out_result, err_result) =
            tokio::join!(forward(out_pipe, stdout), forward(err_pipe, stderr));

        let status = child
            .wait()
            .await
            .map_err(|e| RunError::ExitFailed(e.to_string()))?;

        let out_bytes = out_result.map_err(|e| RunError::ExitFailed(format!("stdout: {}", e)))?;
        let err_bytes = err_result.map_err(|e| RunError::ExitFailed(format!("stderr: {}", e)))?;

        tracing::debug!(
            script = %script.display(),
            exit_code = ?status.code(),
            out_bytes,
            err_bytes,
            "Script exited"
        );

        if status.success() {
            Ok(())
        } else {
            Err(RunError::ExitFailed(status.to_string()))
        }
    }
}

/// Copy a pipe into a sink chunk by chunk. Returns the byte count.
async fn forward<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    sink: &dyn OutputSink,
) -> std::io::Result<usize> {
    let Some(mut pipe) = pipe else {
        return Ok(0);
    };

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0;
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        total += n;
        sink.write(&buf[..n]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_error_messages() {
        let err = RunError::StartFailed(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        assert_eq!(err.to_string(), "failed to start script: no such file");

        let err = RunError::ExitFailed("exit status: 3".to_string());
        assert_eq!(err.to_string(), "script failed: exit status: 3");
    }

    #[test]
    fn default_shell() {
        assert_eq!(ScriptExecutor::default().shell(), Path::new("/bin/sh"));
    }
}
