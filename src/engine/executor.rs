use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::engine::invocation::InvocationDescriptor;
use crate::utils::{
    config::DEFAULT_CAPTURE_LIMIT,
    types::{StepOutcome, StepStatus},
};

/// Output bytes kept per stream for `stdout_matches`/`stderr_matches`
pub const MATCH_WINDOW: usize = 1024 * 1024;

/// Trait for running one invocation to completion
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run the descriptor and report how it ended. Never returns early.
    async fn execute(&self, descriptor: &InvocationDescriptor) -> StepOutcome;
}

/// Runs invocations as child processes
pub struct ProcessExecutor {
    capture_limit: usize,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self {
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Keep at most `bytes` of each output stream
    pub fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }

    fn build_command(&self, descriptor: &InvocationDescriptor) -> Command {
        let mut cmd = Command::new(&descriptor.program);
        cmd.args(&descriptor.args)
            .current_dir(&descriptor.working_dir)
            .envs(descriptor.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for ProcessExecutor {
    async fn execute(&self, descriptor: &InvocationDescriptor) -> StepOutcome {
        let command_line = descriptor.command_line();
        let started = Instant::now();
        let mut outcome = StepOutcome {
            name: descriptor.name.clone(),
            command_line,
            status: StepStatus::Failed,
            exit_code: None,
            duration_ms: 0,
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            reason: None,
        };

        let mut child = match self.build_command(descriptor).spawn() {
            Ok(child) => child,
            Err(e) => {
                outcome.status = StepStatus::SpawnError;
                outcome.reason = Some(format!("failed to spawn '{}': {}", descriptor.program, e));
                return outcome;
            }
        };

        let keep = self.capture_limit.max(MATCH_WINDOW);
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let collect = async {
            let (stdout, stderr, status) = tokio::join!(
                read_tail(stdout_pipe, keep),
                read_tail(stderr_pipe, keep),
                child.wait()
            );
            Ok::<_, std::io::Error>((stdout?, stderr?, status?))
        };

        let waited = match descriptor.timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.ok(),
            None => Some(collect.await),
        };
        outcome.duration_ms = started.elapsed().as_millis() as u64;

        let (stdout, stderr, status) = match waited {
            None => {
                let _ = child.kill().await;
                outcome.status = StepStatus::TimedOut;
                outcome.reason = descriptor
                    .timeout
                    .map(|limit| format!("timed out after {:?}", limit));
                return outcome;
            }
            Some(Err(e)) => {
                outcome.status = StepStatus::SpawnError;
                outcome.reason = Some(format!("failed to wait for process: {}", e));
                return outcome;
            }
            Some(Ok(collected)) => collected,
        };

        outcome.exit_code = status.code();
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();
        outcome.stdout_tail = tail(&stdout, self.capture_limit);
        outcome.stderr_tail = tail(&stderr, self.capture_limit);

        let (status, reason) = evaluate(descriptor, outcome.exit_code, &stdout, &stderr);
        outcome.status = status;
        outcome.reason = reason;
        outcome
    }
}

/// Decide pass/fail from the exit code and output expectations
pub fn evaluate(
    descriptor: &InvocationDescriptor,
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> (StepStatus, Option<String>) {
    if !descriptor.expect.is_met_by(exit_code) {
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none (terminated by signal)".to_string());
        return (
            StepStatus::Failed,
            Some(format!("expected {}, exit code {}", descriptor.expect, code)),
        );
    }

    if let Some(pattern) = &descriptor.stdout_matches {
        if !pattern.is_match(stdout) {
            return (
                StepStatus::Failed,
                Some(format!("stdout did not match /{}/", pattern.as_str())),
            );
        }
    }
    if let Some(pattern) = &descriptor.stderr_matches {
        if !pattern.is_match(stderr) {
            return (
                StepStatus::Failed,
                Some(format!("stderr did not match /{}/", pattern.as_str())),
            );
        }
    }

    (StepStatus::Passed, None)
}

/// Read a pipe to the end, keeping only its last `keep` bytes
pub async fn read_tail<R>(pipe: Option<R>, keep: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let Some(mut pipe) = pipe else {
        return Ok(kept);
    };

    let mut buf = [0u8; 8 * 1024];
    loop {
        let read = pipe.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        kept.extend_from_slice(&buf[..read]);
        if kept.len() > keep.saturating_mul(2) {
            kept.drain(..kept.len() - keep);
        }
    }
    if kept.len() > keep {
        kept.drain(..kept.len() - keep);
    }
    Ok(kept)
}

/// Last `limit` bytes of `text`, aligned to a character boundary
pub fn tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
