//! Subprocess execution delegate.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{ExecutionOutcome, ExecutionRequest, Executor, render_prompt};
use crate::config::ExecutorConfig;
use crate::error::{Error, Result};

/// Runs an external program per task.
///
/// The prompt is written to the program's stdin. A zero exit status is a
/// success with stdout as output; anything else is a failure with stderr
/// (then stdout) as output.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
}

impl CommandExecutor {
    /// Creates a delegate running `program args...` in `workdir`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            workdir: workdir.into(),
        }
    }

    /// Creates a delegate from configuration.
    #[must_use]
    pub fn from_config(config: &ExecutorConfig, workdir: &Path) -> Self {
        Self::new(config.program.clone(), config.args.clone(), workdir)
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        let prompt = render_prompt(request);
        debug!(
            task_id = %request.task_id,
            mode = ?request.mode,
            program = %self.program,
            "starting delegate"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Execution(format!("cannot start '{}': {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| Error::Execution(format!("cannot write prompt: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Execution(format!("delegate did not finish: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(task_id = %request.task_id, status = %output.status, "delegate finished");
        if output.status.success() {
            return Ok(ExecutionOutcome::success(stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut text = format!("delegate exited with {}\n", output.status);
        for part in [stderr.trim(), stdout.trim()] {
            if !part.is_empty() {
                text.push_str(part);
                text.push('\n');
            }
        }
        Ok(ExecutionOutcome::failure(text))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use crate::exec::ExecutionMode;

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            task_id: TaskId::new(1).unwrap(),
            mode: ExecutionMode::Run,
            title: "Echo".to_string(),
            requirement: String::new(),
            plan: Some("say hi".to_string()),
            related: Vec::new(),
            context_map: String::new(),
            at_max_depth: false,
        }
    }

    #[tokio::test]
    async fn prompt_arrives_on_stdin() {
        let dir = tempfile::tempdir().expect("should create temp directory");
        let executor = CommandExecutor::new("cat", Vec::new(), dir.path());

        let outcome = executor.execute(&request()).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.output.contains("# Task #1: Echo"));
        assert!(outcome.output.contains("say hi"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let dir = tempfile::tempdir().expect("should create temp directory");
        let executor = CommandExecutor::new(
            "sh",
            vec!["-c".to_string(), "cat >/dev/null; echo broken >&2; exit 3".to_string()],
            dir.path(),
        );

        let outcome = executor.execute(&request()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.output.contains("broken"));
    }

    #[tokio::test]
    async fn missing_program_is_error() {
        let dir = tempfile::tempdir().expect("should create temp directory");
        let executor = CommandExecutor::new("arbor-no-such-program", Vec::new(), dir.path());

        let err = executor.execute(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }
}
