#![cfg(unix)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use smokegate::{
    GateError, InvocationDescriptor, InvocationError, InvocationMatrix, MatrixEngine, RunnerConfig,
    StepEvent, StepExecutor, StepOutcome, StepStatus, Verdict,
};

/// Executor that fails the named steps and records every call
struct ScriptedExecutor {
    failing: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    fn new(failing: &[&str]) -> (Self, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let executor = Self {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            calls: calls.clone(),
        };
        (executor, calls)
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, descriptor: &InvocationDescriptor) -> StepOutcome {
        self.calls.lock().unwrap().push(descriptor.name.clone());
        let failed = self.failing.contains(&descriptor.name);
        StepOutcome {
            name: descriptor.name.clone(),
            command_line: descriptor.command_line(),
            status: if failed { StepStatus::Failed } else { StepStatus::Passed },
            exit_code: Some(if failed { 1 } else { 0 }),
            duration_ms: 5,
            stdout_tail: String::new(),
            stderr_tail: if failed { "boom".to_string() } else { String::new() },
            reason: failed.then(|| "expected success, exit code 1".to_string()),
        }
    }
}

const FOUR_STEPS: &str = r#"
[defaults]
program = "sh"

[[step]]
name = "first"
args = ["-c", "true"]

[[step]]
name = "second"
args = ["-c", "true"]

[[step]]
name = "third"
args = ["-c", "true"]

[[step]]
name = "fourth"
args = ["-c", "true"]
"#;

fn corpus_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("data/modules/fastqc")).unwrap();
    std::fs::write(dir.path().join("data/modules/fastqc/sample_fastqc.zip"), b"zip").unwrap();
    std::fs::write(dir.path().join("data/README.md"), b"corpus").unwrap();
    dir
}

fn engine_for(matrix: &str, config: RunnerConfig) -> MatrixEngine {
    MatrixEngine::new(config, InvocationMatrix::from_toml_str(matrix).unwrap())
}

#[tokio::test]
async fn test_all_steps_pass() {
    let corpus = corpus_dir();
    let (executor, calls) = ScriptedExecutor::new(&[]);
    let engine = engine_for(FOUR_STEPS, RunnerConfig::new().with_corpus_dir(corpus.path()))
        .with_executor(Box::new(executor));

    let report = engine.run().await.unwrap();

    assert_eq!(report.verdict, Verdict::Passed);
    assert_eq!(report.summary.passed, 4);
    assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third", "fourth"]);
    assert!(!report.workdir_retained);
    assert!(!report.workdir.exists(), "temporary workdir should be removed");
}

#[tokio::test]
async fn test_fail_fast_skips_remaining_steps() {
    let corpus = corpus_dir();
    let (executor, calls) = ScriptedExecutor::new(&["second"]);
    let engine = engine_for(FOUR_STEPS, RunnerConfig::new().with_corpus_dir(corpus.path()))
        .with_executor(Box::new(executor));

    let report = engine.run().await.unwrap();

    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    let statuses: Vec<StepStatus> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Passed, StepStatus::Failed, StepStatus::Skipped, StepStatus::Skipped]
    );
    assert_eq!(report.summary.skipped, 2);
    assert_eq!(
        report.outcomes[2].reason.as_deref(),
        Some("not run: step 'second' failed")
    );
    assert_eq!(report.failures().len(), 1);
}

#[tokio::test]
async fn test_keep_going_runs_everything() {
    let corpus = corpus_dir();
    let (executor, calls) = ScriptedExecutor::new(&["first", "third"]);
    let config = RunnerConfig::new().with_corpus_dir(corpus.path()).keep_going();
    let engine = engine_for(FOUR_STEPS, config).with_executor(Box::new(executor));

    let report = engine.run().await.unwrap();

    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(calls.lock().unwrap().len(), 4);
    assert_eq!(report.summary.failed, 2);
    assert_eq!(report.summary.skipped, 0);
    assert!(!report.fail_fast);
}

#[tokio::test]
async fn test_selection_filters_steps() {
    let corpus = corpus_dir();
    let (executor, calls) = ScriptedExecutor::new(&[]);
    let mut config = RunnerConfig::new().with_corpus_dir(corpus.path());
    config.only = vec!["*th*".to_string()];
    config.skip = vec!["fourth".to_string()];
    let engine = engine_for(FOUR_STEPS, config).with_executor(Box::new(executor));

    let report = engine.run().await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["third"]);
    assert_eq!(report.summary.total, 1);
}

#[tokio::test]
async fn test_progress_events_in_order() {
    let corpus = corpus_dir();
    let (executor, _calls) = ScriptedExecutor::new(&["second"]);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let engine = engine_for(FOUR_STEPS, RunnerConfig::new().with_corpus_dir(corpus.path()))
        .with_executor(Box::new(executor))
        .with_progress(move |event| {
            let entry = match event {
                StepEvent::Started { index, descriptor, .. } => format!("start {} {}", index, descriptor.name),
                StepEvent::Finished { index, outcome, .. } => format!("end {} {}", index, outcome.status),
            };
            sink.lock().unwrap().push(entry);
        });

    engine.run().await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["start 0 first", "end 0 PASS", "start 1 second", "end 1 FAIL"]
    );
}

#[tokio::test]
async fn test_missing_program_is_setup_error() {
    let corpus = corpus_dir();
    let (executor, calls) = ScriptedExecutor::new(&[]);
    let config = RunnerConfig::new()
        .with_corpus_dir(corpus.path())
        .with_program("smokegate-no-such-program");
    let engine = engine_for(FOUR_STEPS, config).with_executor(Box::new(executor));

    let err = engine.run().await.unwrap_err();

    assert!(matches!(
        err,
        GateError::Invocation(InvocationError::ProgramNotFound(ref p)) if p == "smokegate-no-such-program"
    ));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_corpus_dir_is_setup_error() {
    let missing = tempfile::tempdir().unwrap().path().join("gone");
    let engine = engine_for(FOUR_STEPS, RunnerConfig::new().with_corpus_dir(missing));

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, GateError::Corpus(_)));
}

#[tokio::test]
async fn test_processes_run_against_corpus_and_workdir() {
    let corpus = corpus_dir();
    let workdir = tempfile::tempdir().unwrap();
    let matrix = r#"
[defaults]
program = "sh"
env = { SMOKEGATE_MARK = "from-defaults" }

[[step]]
name = "reads-corpus"
args = ["-c", "test -f {corpus}/data/modules/fastqc/sample_fastqc.zip"]

[[step]]
name = "empty-directory"
create_dirs = ["empty_dir"]
args = ["-c", "test -d empty_dir && test -z \"$(ls -A empty_dir)\""]

[[step]]
name = "changed-working-dir"
cwd = "{corpus}/data/modules/fastqc"
args = ["-c", "test -f sample_fastqc.zip && printf '%s' \"$SMOKEGATE_MARK\""]
stdout_matches = "^from-defaults$"

[[step]]
name = "config-file"
create_files = { "conf/config.yaml" = "title: smoke {corpus}" }
args = ["-c", "grep -q 'title: smoke' {workdir}/conf/config.yaml"]

[[step]]
name = "missing-config"
args = ["-c", "cat does_not_exist.yaml"]
expect = "failure"
"#;
    let config = RunnerConfig::new()
        .with_corpus_dir(corpus.path())
        .with_workdir(workdir.path());
    let engine = engine_for(matrix, config);

    let report = engine.run().await.unwrap();

    for outcome in &report.outcomes {
        assert_eq!(outcome.status, StepStatus::Passed, "{} failed: {:?}", outcome.name, outcome.reason);
    }
    assert_eq!(report.verdict, Verdict::Passed);
    assert!(report.workdir_retained);
    assert!(workdir.path().join("empty_dir").is_dir());
    assert!(workdir.path().join("conf/config.yaml").is_file());
}

#[tokio::test]
async fn test_real_failure_stops_gate() {
    let corpus = corpus_dir();
    let matrix = r#"
[defaults]
program = "sh"

[[step]]
name = "crashes"
args = ["-c", "echo 'Traceback (most recent call last)' >&2; exit 3"]

[[step]]
name = "never-runs"
args = ["-c", "true"]
"#;
    let engine = engine_for(matrix, RunnerConfig::new().with_corpus_dir(corpus.path()));

    let report = engine.run().await.unwrap();

    assert_eq!(report.verdict, Verdict::Failed);
    let crashed = &report.outcomes[0];
    assert_eq!(crashed.exit_code, Some(3));
    assert!(crashed.stderr_tail.contains("Traceback"));
    assert_eq!(crashed.reason.as_deref(), Some("expected success, exit code 3"));
    assert_eq!(report.outcomes[1].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_relative_paths_resolve_against_invocation_dir() {
    use std::os::unix::fs::PermissionsExt;

    let corpus = tempfile::Builder::new().prefix("sg-corpus-").tempdir_in(".").unwrap();
    std::fs::create_dir_all(corpus.path().join("data/modules/fastqc")).unwrap();
    std::fs::write(corpus.path().join("data/modules/fastqc/sample_fastqc.zip"), b"zip").unwrap();
    let scratch = tempfile::Builder::new().prefix("sg-work-").tempdir_in(".").unwrap();
    assert!(corpus.path().is_relative());
    assert!(scratch.path().is_relative());

    let script = scratch.path().join("tools/check.sh");
    std::fs::create_dir_all(script.parent().unwrap()).unwrap();
    std::fs::write(&script, "#!/bin/sh\ntest -f \"$1\"\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let matrix = format!(
        r#"
[defaults]
program = "sh"

[[step]]
name = "reads-corpus"
args = ["-c", "test -f {{corpus}}/data/modules/fastqc/sample_fastqc.zip"]

[[step]]
name = "config-file"
create_files = {{ "cfg.yaml" = "title: relative" }}
args = ["-c", "test -f {{workdir}}/cfg.yaml"]

[[step]]
name = "local-script"
program = "{}"
args = ["{{corpus}}/data/modules/fastqc/sample_fastqc.zip"]
"#,
        script.display()
    );
    let config = RunnerConfig::new()
        .with_corpus_dir(corpus.path())
        .with_workdir(scratch.path().join("out"));
    let engine = engine_for(&matrix, config);

    let report = engine.run().await.unwrap();

    for outcome in &report.outcomes {
        assert_eq!(outcome.status, StepStatus::Passed, "{} failed: {:?}", outcome.name, outcome.reason);
    }
    assert!(report.corpus.root.is_absolute());
    assert!(report.workdir.is_absolute());
    assert!(report.outcomes[2].command_line.starts_with('/'));
}
