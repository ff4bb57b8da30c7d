use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;

use crate::{
    corpus::source_for,
    engine::{
        GateDecision, InvocationDescriptor, InvocationMatrix, PassFailGate, PlaceholderContext,
        ProcessExecutor, StepExecutor,
    },
    utils::{
        config::{absolute_path, RunnerConfig},
        error::{GateError, GateResult, InvocationError},
        types::{CorpusLocation, RunSummary, StepOutcome, Verdict},
    },
};

/// Progress notifications emitted while a matrix runs
pub enum StepEvent<'a> {
    Started {
        index: usize,
        total: usize,
        descriptor: &'a InvocationDescriptor,
    },
    Finished {
        index: usize,
        total: usize,
        outcome: &'a StepOutcome,
    },
}

type ProgressFn = Box<dyn Fn(StepEvent<'_>) + Send + Sync>;

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub corpus: CorpusLocation,
    pub workdir: PathBuf,
    pub workdir_retained: bool,
    pub fail_fast: bool,
    pub outcomes: Vec<StepOutcome>,
    pub summary: RunSummary,
    pub verdict: Verdict,
    pub total_duration_ms: u64,
}

impl RunReport {
    /// Outcomes that failed the gate
    pub fn failures(&self) -> Vec<&StepOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failure()).collect()
    }
}

/// Coordinates corpus fetching, step execution and gating
pub struct MatrixEngine {
    config: RunnerConfig,
    matrix: InvocationMatrix,
    executor: Box<dyn StepExecutor>,
    progress: Option<ProgressFn>,
}

impl MatrixEngine {
    /// Create an engine that runs steps as child processes
    pub fn new(config: RunnerConfig, matrix: InvocationMatrix) -> Self {
        let executor = ProcessExecutor::new().with_capture_limit(config.capture_limit);
        Self {
            config,
            matrix,
            executor: Box::new(executor),
            progress: None,
        }
    }

    /// Replace the step executor
    pub fn with_executor(mut self, executor: Box<dyn StepExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Receive a callback before and after every step
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(StepEvent<'_>) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn matrix(&self) -> &InvocationMatrix {
        &self.matrix
    }

    /// Fetch the corpus described by the CLI flags and matrix
    pub async fn fetch_corpus(&self) -> GateResult<CorpusLocation> {
        let spec = self.config.resolve_corpus(&self.matrix.corpus)?;
        let source = source_for(&spec)?;
        tracing::info!(source = %source.describe(), "fetching corpus");
        source.fetch().await
    }

    /// Resolve the selected steps against a corpus root and workdir
    pub fn plan(&self, corpus_root: &Path, workdir: &Path) -> GateResult<Vec<InvocationDescriptor>> {
        let ctx = PlaceholderContext::new(corpus_root, workdir);
        self.matrix
            .select(&self.config.only, &self.config.skip)?
            .into_iter()
            .map(|step| step.resolve(&ctx, &self.config, &self.matrix.defaults))
            .collect()
    }

    /// Fail early when a program cannot be found on PATH
    pub fn check_programs(&self, descriptors: &[InvocationDescriptor]) -> GateResult<()> {
        let programs: BTreeSet<&str> = descriptors.iter().map(|d| d.program.as_str()).collect();
        for program in programs {
            match which::which(program) {
                Ok(path) => tracing::debug!(program, path = %path.display(), "resolved program"),
                Err(_) => return Err(InvocationError::ProgramNotFound(program.to_string()).into()),
            }
        }
        Ok(())
    }

    /// Fetch the corpus, then run the matrix against it
    pub async fn run(&self) -> GateResult<RunReport> {
        let corpus = self.fetch_corpus().await?;
        self.run_with_corpus(corpus).await
    }

    /// Run the selected steps in order against an already available corpus
    pub async fn run_with_corpus(&self, corpus: CorpusLocation) -> GateResult<RunReport> {
        let started_at = Utc::now();
        let started = Instant::now();

        let (scratch, workdir) = self.prepare_workdir()?;
        let descriptors = self.plan(&corpus.root, &workdir)?;
        self.check_programs(&descriptors)?;

        let total = descriptors.len();
        let mut gate = PassFailGate::new(self.config.fail_fast);

        for (index, descriptor) in descriptors.iter().enumerate() {
            if gate.decision() == GateDecision::Stop {
                gate.skip(&descriptor.name, &descriptor.command_line());
                continue;
            }

            self.notify(StepEvent::Started {
                index,
                total,
                descriptor,
            });
            tracing::info!(step = %descriptor.name, command = %descriptor.command_line(), "running step");

            let outcome = match descriptor.prepare().await {
                Ok(()) => self.executor.execute(descriptor).await,
                Err(e) => StepOutcome::spawn_error(&descriptor.name, &descriptor.command_line(), &e.to_string()),
            };

            if outcome.status.is_failure() {
                tracing::warn!(
                    step = %outcome.name,
                    status = %outcome.status,
                    exit_code = ?outcome.exit_code,
                    reason = outcome.reason.as_deref().unwrap_or(""),
                    "step failed"
                );
            } else {
                tracing::info!(step = %outcome.name, duration_ms = outcome.duration_ms, "step passed");
            }

            self.notify(StepEvent::Finished {
                index,
                total,
                outcome: &outcome,
            });
            gate.record(outcome);
        }

        let verdict = gate.verdict();
        let summary = gate.summary();
        Ok(RunReport {
            started_at,
            corpus,
            workdir,
            workdir_retained: scratch.is_none(),
            fail_fast: self.config.fail_fast,
            outcomes: gate.into_outcomes(),
            summary,
            verdict,
            total_duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn notify(&self, event: StepEvent<'_>) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    /// Use the configured workdir, or a temporary one removed after the run
    fn prepare_workdir(&self) -> GateResult<(Option<TempDir>, PathBuf)> {
        match &self.config.workdir {
            Some(dir) => {
                let dir = absolute_path(dir).map_err(|e| {
                    GateError::Configuration(format!("Cannot resolve workdir {}: {}", dir.display(), e))
                })?;
                std::fs::create_dir_all(&dir).map_err(|e| {
                    GateError::Configuration(format!("Cannot create workdir {}: {}", dir.display(), e))
                })?;
                Ok((None, dir))
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("smokegate-")
                    .tempdir()
                    .map_err(|e| GateError::Internal(format!("Cannot create temporary workdir: {}", e)))?;
                let path = temp.path().to_path_buf();
                Ok((Some(temp), path))
            }
        }
    }
}
