use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use reflow_core::config::CommandExecutorConfig;
use reflow_core::error::ExecutionError;
use reflow_core::executor::traits::TaskExecutor;
use reflow_core::executor::types::{ExecutionRequest, ExecutorOutput};

const STDERR_TAIL_BYTES: usize = 2048;

/// Runs an external program per task.
///
/// The [`ExecutionRequest`] is written to the child's stdin as JSON and an
/// [`ExecutorOutput`] is read back as JSON from its stdout. A non-zero exit
/// status fails the task. The child is killed if the engine's timeout fires.
pub struct CommandTaskExecutor {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl CommandTaskExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn from_config(cfg: &CommandExecutorConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            env: cfg.env.clone(),
            working_dir: cfg.working_dir.as_ref().map(PathBuf::from),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl TaskExecutor for CommandTaskExecutor {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorOutput, ExecutionError> {
        let task_id = request.task.id.as_str();
        let input = serde_json::to_vec(request)
            .map_err(|e| ExecutionError::failed(task_id, format!("encode request: {e}")))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .env("REFLOW_TASK_ID", task_id)
            .env("REFLOW_ATTEMPT", request.attempt.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| ExecutionError::Spawn {
            task_id: task_id.to_string(),
            message: format!("{}: {e}", self.program),
        })?;

        // Feed stdin while stdout and stderr are drained; a child that writes
        // before it finishes reading would otherwise block on a full pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&input).await {
                // The program may legitimately ignore stdin and exit early.
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| ExecutionError::failed(task_id, format!("wait: {e}")))?;
        fed.map_err(|e| ExecutionError::failed(task_id, format!("write stdin: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = tail(stderr.trim(), STDERR_TAIL_BYTES);
            return Err(ExecutionError::failed(
                task_id,
                format!("{} exited with {}: {}", self.program, output.status, tail),
            ));
        }

        tracing::debug!(
            task_id,
            program = %self.program,
            stdout_bytes = output.stdout.len(),
            "executor command finished"
        );

        serde_json::from_slice::<ExecutorOutput>(&output.stdout).map_err(|e| {
            ExecutionError::InvalidOutput {
                task_id: task_id.to_string(),
                message: format!("stdout is not an executor output document: {e}"),
            }
        })
    }
}

fn tail(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use reflow_core::executor::types::TaskDefinition;

    fn request(id: &str) -> ExecutionRequest {
        ExecutionRequest {
            task: TaskDefinition::new(id),
            dependencies: BTreeMap::new(),
            human_input: None,
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn test_reads_output_document_from_stdout() {
        let executor = CommandTaskExecutor::new("sh").args([
            "-c",
            r#"cat > /dev/null; printf '{"content": {"task": "%s"}, "quality": 0.75}' "$REFLOW_TASK_ID""#,
        ]);

        let out = executor.execute(&request("summary")).await.unwrap();
        assert_eq!(out.content["task"], "summary");
        assert_eq!(out.quality, 0.75);
    }

    #[tokio::test]
    async fn test_large_request_while_child_writes_stderr() {
        use reflow_core::executor::types::ResolvedDependency;

        let mut req = request("summary");
        req.dependencies.insert(
            "research".to_string(),
            ResolvedDependency {
                task_id: "research".to_string(),
                version: 1,
                quality: 1.0,
                is_placeholder: false,
                content: serde_json::json!({ "text": "r".repeat(200_000) }),
            },
        );
        // Fills the stderr pipe before reading any of stdin.
        let executor = CommandTaskExecutor::new("sh").args([
            "-c",
            r#"head -c 100000 /dev/zero | tr '\0' x >&2; cat > /dev/null; echo '{"content": 1}'"#,
        ]);

        let out = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            executor.execute(&req),
        )
        .await
        .expect("executor finished")
        .unwrap();
        assert_eq!(out.content, serde_json::json!(1));
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_task() {
        let executor = CommandTaskExecutor::new("sh").args(["-c", "echo boom >&2; exit 3"]);

        let err = executor.execute(&request("summary")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Failed { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_garbage_stdout_is_invalid_output() {
        let executor = CommandTaskExecutor::new("sh").args(["-c", "echo not-json"]);

        let err = executor.execute(&request("summary")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let executor = CommandTaskExecutor::new("/nonexistent/reflow-generator");

        let err = executor.execute(&request("summary")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }
}
