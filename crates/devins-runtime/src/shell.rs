//! Shell command execution with per-command timeouts

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

use devins_compiler::{
    CancellationToken, CapabilityError, CapabilityResult, ShellExecutor, ShellOutput,
    ShellRequest,
};

/// Runs commands through `sh -c` in a working directory
#[derive(Debug, Clone)]
pub struct ProcessShellExecutor {
    shell: String,
    working_dir: PathBuf,
}

impl ProcessShellExecutor {
    /// Executor running commands in `working_dir`
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            shell: "sh".to_string(),
            working_dir: working_dir.into(),
        }
    }

    /// Use another POSIX shell
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl ShellExecutor for ProcessShellExecutor {
    async fn execute(
        &self,
        request: ShellRequest,
        cancel: &CancellationToken,
    ) -> CapabilityResult<ShellOutput> {
        tracing::info!(command = %request.command, "running shell command");

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&request.command)
            .current_dir(&self.working_dir)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);

        // Dropping the output future kills the child.
        let output = tokio::select! {
            output = command.output() => output.map_err(|e| CapabilityError::CommandFailed {
                message: format!("failed to start '{}': {e}", request.command),
            })?,
            _ = tokio::time::sleep(request.timeout) => {
                tracing::warn!(command = %request.command, "shell command timed out");
                return Err(CapabilityError::Timeout {
                    operation: request.command.clone(),
                    seconds: request.timeout.as_secs(),
                });
            }
            _ = cancel.cancelled() => return Err(CapabilityError::Cancelled),
        };

        let result = ShellOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(exit_code = ?result.exit_code, "shell command finished");
        Ok(result)
    }
}
