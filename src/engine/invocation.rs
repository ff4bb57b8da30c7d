use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::{
    config::{absolute_path, RunnerConfig, StepDefaults},
    error::{GateError, GateResult, InvocationError, MatrixError},
    types::Expectation,
};

/// Placeholder replaced with the corpus root
pub const CORPUS_PLACEHOLDER: &str = "{corpus}";
/// Placeholder replaced with the run's scratch directory
pub const WORKDIR_PLACEHOLDER: &str = "{workdir}";

/// One `[[step]]` entry of a matrix file, before placeholder expansion
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefinition {
    pub name: String,
    pub description: Option<String>,
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<String>,
    #[serde(default)]
    pub expect: Expectation,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub create_dirs: Vec<String>,
    #[serde(default)]
    pub create_files: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub stdout_matches: Option<String>,
    pub stderr_matches: Option<String>,
}

impl StepDefinition {
    /// Create a step running the default program with `args`
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            program: None,
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
            expect: Expectation::Success,
            timeout_secs: None,
            create_dirs: Vec::new(),
            create_files: BTreeMap::new(),
            env: BTreeMap::new(),
            stdout_matches: None,
            stderr_matches: None,
        }
    }

    /// Check the parts of a step that do not depend on the corpus
    pub fn validate(&self) -> Result<(), MatrixError> {
        if self.name.trim().is_empty() {
            return Err(MatrixError::Validation("step name must not be empty".to_string()));
        }
        for (field, pattern) in [("stdout_matches", &self.stdout_matches), ("stderr_matches", &self.stderr_matches)] {
            if let Some(pattern) = pattern {
                Regex::new(pattern).map_err(|e| {
                    MatrixError::Validation(format!("step '{}': invalid {} regex: {}", self.name, field, e))
                })?;
            }
        }
        for path in self.create_dirs.iter().chain(self.create_files.keys()) {
            if !is_contained(path) {
                return Err(MatrixError::Validation(format!(
                    "step '{}': '{}' must be a relative path inside the workdir",
                    self.name, path
                )));
            }
        }
        Ok(())
    }

    /// Expand placeholders and apply defaults, producing a runnable descriptor
    pub fn resolve(
        &self,
        ctx: &PlaceholderContext,
        config: &RunnerConfig,
        defaults: &StepDefaults,
    ) -> GateResult<InvocationDescriptor> {
        let program = config.effective_program(self.program.as_deref(), defaults);
        let program = anchor_program(ctx.expand(&program))?;
        let args = self.args.iter().map(|arg| ctx.expand(arg)).collect();

        let working_dir = match &self.cwd {
            Some(cwd) => ctx.workdir_path(&ctx.expand(cwd)),
            None => ctx.workdir.clone(),
        };

        let mut env: Vec<(String, String)> = defaults
            .env
            .iter()
            .filter(|(key, _)| !self.env.contains_key(*key))
            .chain(self.env.iter())
            .map(|(key, value)| (key.clone(), ctx.expand(value)))
            .collect();
        env.sort();

        Ok(InvocationDescriptor {
            name: self.name.clone(),
            program,
            args,
            working_dir,
            expect: self.expect,
            timeout: config.effective_timeout(self.timeout_secs, defaults),
            create_dirs: self
                .create_dirs
                .iter()
                .map(|dir| ctx.workdir_path(&ctx.expand(dir)))
                .collect(),
            create_files: self
                .create_files
                .iter()
                .map(|(path, content)| (ctx.workdir_path(&ctx.expand(path)), ctx.expand(content)))
                .collect(),
            env,
            stdout_matches: compile(&self.name, self.stdout_matches.as_deref())?,
            stderr_matches: compile(&self.name, self.stderr_matches.as_deref())?,
        })
    }
}

/// A fully resolved command invocation
#[derive(Debug, Clone)]
pub struct InvocationDescriptor {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub expect: Expectation,
    pub timeout: Option<Duration>,
    pub create_dirs: Vec<PathBuf>,
    pub create_files: Vec<(PathBuf, String)>,
    pub env: Vec<(String, String)>,
    pub stdout_matches: Option<Regex>,
    pub stderr_matches: Option<Regex>,
}

impl InvocationDescriptor {
    /// Shell-like rendering used in logs and reports
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Create the directories and files the step expects to exist
    pub async fn prepare(&self) -> GateResult<()> {
        for dir in &self.create_dirs {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.prepare_error(format!("create {}: {}", dir.display(), e)))?;
        }
        for (path, content) in &self.create_files {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.prepare_error(format!("create {}: {}", parent.display(), e)))?;
            }
            tokio::fs::write(path, content)
                .await
                .map_err(|e| self.prepare_error(format!("write {}: {}", path.display(), e)))?;
        }
        if !self.working_dir.is_dir() {
            return Err(self.prepare_error(format!(
                "working directory {} does not exist",
                self.working_dir.display()
            )));
        }
        Ok(())
    }

    fn prepare_error(&self, reason: String) -> GateError {
        InvocationError::Prepare {
            step: self.name.clone(),
            reason,
        }
        .into()
    }
}

/// Values substituted into step fields
#[derive(Debug, Clone)]
pub struct PlaceholderContext {
    pub corpus: PathBuf,
    pub workdir: PathBuf,
}

impl PlaceholderContext {
    pub fn new(corpus: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            corpus: corpus.into(),
            workdir: workdir.into(),
        }
    }

    /// Replace `{corpus}` and `{workdir}`; any other braces are left alone
    pub fn expand(&self, value: &str) -> String {
        value
            .replace(CORPUS_PLACEHOLDER, &self.corpus.to_string_lossy())
            .replace(WORKDIR_PLACEHOLDER, &self.workdir.to_string_lossy())
    }

    /// Interpret `path` relative to the workdir unless it is absolute
    pub fn workdir_path(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workdir.join(candidate)
        }
    }
}

/// Relative program paths such as `./venv/bin/multiqc` are resolved against
/// the caller's directory, not the step's working directory. Bare names are
/// left for PATH lookup.
fn anchor_program(program: String) -> GateResult<String> {
    let path = Path::new(&program);
    if path.is_absolute() || path.components().count() < 2 {
        return Ok(program);
    }
    let anchored = absolute_path(path)
        .map_err(|e| GateError::Configuration(format!("Cannot resolve program {}: {}", program, e)))?;
    Ok(anchored.to_string_lossy().to_string())
}

fn compile(step: &str, pattern: Option<&str>) -> GateResult<Option<Regex>> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|e| {
                GateError::from(MatrixError::Validation(format!(
                    "step '{}': invalid regex '{}': {}",
                    step, p, e
                )))
            })
        })
        .transpose()
}

/// Relative, non-empty, and free of `..` components
fn is_contained(path: &str) -> bool {
    if path.starts_with(WORKDIR_PLACEHOLDER) {
        return !path.contains("..");
    }
    let candidate = Path::new(path);
    !path.is_empty()
        && candidate.is_relative()
        && candidate
            .components()
            .all(|c| !matches!(c, std::path::Component::ParentDir))
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}
