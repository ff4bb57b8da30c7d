use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where an unpacked corpus lives and how it got there
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusLocation {
    pub root: PathBuf,
    pub source: String,
    pub freshly_fetched: bool,
    pub file_count: usize,
}

/// Expected process result for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    #[default]
    Success,
    Failure,
}

impl Expectation {
    /// Check whether a process exit code satisfies this expectation
    pub fn is_met_by(&self, exit_code: Option<i32>) -> bool {
        match self {
            Expectation::Success => exit_code == Some(0),
            // A signal-terminated process has no code and still counts as failing
            Expectation::Failure => exit_code != Some(0),
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Success => write!(f, "success"),
            Expectation::Failure => write!(f, "failure"),
        }
    }
}

/// Terminal status of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    TimedOut,
    SpawnError,
    Skipped,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Passed)
    }

    /// Skipped steps never ran, so they neither pass nor fail the gate
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StepStatus::Failed | StepStatus::TimedOut | StepStatus::SpawnError
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Passed => "PASS",
            StepStatus::Failed => "FAIL",
            StepStatus::TimedOut => "TIMEOUT",
            StepStatus::SpawnError => "ERROR",
            StepStatus::Skipped => "SKIP",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of running (or skipping) one invocation descriptor
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub command_line: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub reason: Option<String>,
}

impl StepOutcome {
    /// Outcome for a step that was never spawned
    pub fn skipped(name: &str, command_line: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            command_line: command_line.to_string(),
            status: StepStatus::Skipped,
            exit_code: None,
            duration_ms: 0,
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            reason: Some(reason.to_string()),
        }
    }

    /// Outcome for a step that could not be started
    pub fn spawn_error(name: &str, command_line: &str, reason: &str) -> Self {
        Self {
            status: StepStatus::SpawnError,
            ..Self::skipped(name, command_line, reason)
        }
    }
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    /// Process exit code reported to the CI platform
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Passed => 0,
            Verdict::Failed => 1,
        }
    }
}

/// Summary counts over a run's outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration_ms: u64,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[StepOutcome]) -> Self {
        let mut summary = RunSummary::default();
        for outcome in outcomes {
            summary.total += 1;
            summary.total_duration_ms += outcome.duration_ms;
            match outcome.status {
                StepStatus::Passed => summary.passed += 1,
                StepStatus::Skipped => summary.skipped += 1,
                _ => summary.failed += 1,
            }
        }
        summary
    }
}
