//! Runs a prepared command as an external process.
//!
//! No timeout is applied; a request runs for as long as the job it dispatches.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info};

use crate::error::RunbotError;

/// Outcome of one execution. `exit_code` is `None` when the process was
/// killed by a signal and never produced one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub combined_output: String,
}

impl ExecutionResult {
    pub fn from_exit_code(code: i32, combined_output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            combined_output: combined_output.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<ExecutionResult, RunbotError>;
}

/// Executes through a POSIX shell with stderr folded into stdout, so the
/// captured text keeps the order the job printed it in.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> Result<ExecutionResult, RunbotError> {
        info!(command, "executing");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(format!("exec 2>&1\n{command}"))
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(RunbotError::Spawn)?;

        let mut combined_output = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            combined_output.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        let result = ExecutionResult {
            exit_code: output.status.code(),
            combined_output,
        };

        if result.succeeded() {
            info!(command, "completed execution");
        } else {
            error!(command, exit_code = ?result.exit_code, "execution failed");
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_zero_is_success() {
        assert!(ExecutionResult::from_exit_code(0, "").succeeded());
        for code in [1, 2, 127, 255, -1] {
            assert!(!ExecutionResult::from_exit_code(code, "").succeeded(), "{code}");
        }
        let killed = ExecutionResult {
            exit_code: None,
            combined_output: String::new(),
        };
        assert!(!killed.succeeded());
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr_together() {
        let exec = ShellExecutor::default();
        let res = exec
            .execute("echo out; echo err 1>&2; echo done")
            .await
            .unwrap();
        assert!(res.succeeded());
        assert_eq!(res.combined_output, "out\nerr\ndone\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let exec = ShellExecutor::default();
        let res = exec.execute("echo boom; exit 3").await.unwrap();
        assert_eq!(res.exit_code, Some(3));
        assert!(!res.succeeded());
        assert_eq!(res.combined_output, "boom\n");
    }

    #[tokio::test]
    async fn unknown_command_reports_127() {
        let exec = ShellExecutor::default();
        let res = exec
            .execute("definitely_not_a_real_command_runbot")
            .await
            .unwrap();
        assert_eq!(res.exit_code, Some(127));
        assert!(res.combined_output.contains("not found"));
    }

    #[tokio::test]
    async fn missing_shell_is_spawn_error() {
        let exec = ShellExecutor::new("/nonexistent/shell");
        let err = exec.execute("true").await.unwrap_err();
        assert!(matches!(err, RunbotError::Spawn(_)));
    }

    #[tokio::test]
    async fn runs_executable_script_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("scrubbed_x.ctl");
        std::fs::write(&script, "#!/bin/sh\necho from-script\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let res = ShellExecutor::default()
            .execute(&script.display().to_string())
            .await
            .unwrap();
        assert!(res.succeeded());
        assert_eq!(res.combined_output, "from-script\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_quoted_script_path_containing_spaces() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch dir");
        std::fs::create_dir(&scratch).unwrap();
        let script = scratch.join("scrubbed_y.ctl");
        std::fs::write(&script, "#!/bin/sh\necho spaced\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let command = crate::jobs::transform::shell_quote(&script.display().to_string());
        let res = ShellExecutor::default().execute(&command).await.unwrap();
        assert!(res.succeeded(), "{}", res.combined_output);
        assert_eq!(res.combined_output, "spaced\n");
    }
}
