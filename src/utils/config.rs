use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::error::{GateError, GateResult};

/// Program invoked when neither the matrix nor the CLI names one
pub const DEFAULT_PROGRAM: &str = "multiqc";

/// Bytes of stdout/stderr kept per step for reporting
pub const DEFAULT_CAPTURE_LIMIT: usize = 8 * 1024;

/// Directory name under the system temp dir used to cache fetched corpora
pub const DEFAULT_CACHE_DIR_NAME: &str = "smokegate-corpus";

/// `[corpus]` table of a matrix file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CorpusSection {
    pub url: Option<String>,
    pub subdir: Option<String>,
}

/// `[defaults]` table of a matrix file, inherited by every step
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefaults {
    pub program: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Where the corpus comes from once CLI flags and the matrix are combined
#[derive(Debug, Clone, PartialEq)]
pub enum CorpusSpec {
    Archive {
        url: String,
        subdir: Option<String>,
        cache_dir: PathBuf,
        refresh: bool,
    },
    Local {
        path: PathBuf,
        subdir: Option<String>,
    },
}

/// Runner configuration assembled from command-line flags
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub corpus_url: Option<String>,
    pub corpus_dir: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub refresh: bool,
    pub workdir: Option<PathBuf>,
    pub program: Option<String>,
    pub timeout_secs: Option<u64>,
    pub fail_fast: bool,
    pub only: Vec<String>,
    pub skip: Vec<String>,
    pub capture_limit: usize,
}

impl RunnerConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            corpus_url: None,
            corpus_dir: None,
            cache_dir: std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME),
            refresh: false,
            workdir: None,
            program: None,
            timeout_secs: None,
            fail_fast: true,
            only: Vec::new(),
            skip: Vec::new(),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Use a remote or `file://` archive as the corpus
    pub fn with_corpus_url(mut self, url: &str) -> Self {
        self.corpus_url = Some(url.to_string());
        self
    }

    /// Use an existing directory as the corpus
    pub fn with_corpus_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.corpus_dir = Some(dir.into());
        self
    }

    /// Set the directory fetched archives are unpacked into
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the scratch directory steps run in
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Override the program for every step
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = Some(program.to_string());
        self
    }

    /// Set a per-step timeout in seconds
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = Some(seconds);
        self
    }

    /// Keep running after the first failure
    pub fn keep_going(mut self) -> Self {
        self.fail_fast = false;
        self
    }

    /// Combine CLI flags with the matrix `[corpus]` table
    ///
    /// A local directory wins over any URL, and a CLI URL wins over the
    /// matrix URL. The matrix `subdir` applies in every case.
    pub fn resolve_corpus(&self, section: &CorpusSection) -> GateResult<CorpusSpec> {
        let subdir = section.subdir.clone().filter(|s| !s.is_empty());

        if let Some(path) = &self.corpus_dir {
            return Ok(CorpusSpec::Local {
                path: path.clone(),
                subdir,
            });
        }

        let url = self
            .corpus_url
            .clone()
            .or_else(|| section.url.clone())
            .ok_or_else(|| {
                GateError::Configuration(
                    "No corpus configured: pass --corpus-url or --corpus-dir, or set [corpus].url in the matrix".to_string(),
                )
            })?;

        Ok(CorpusSpec::Archive {
            url,
            subdir,
            cache_dir: self.cache_dir.clone(),
            refresh: self.refresh,
        })
    }

    /// Per-step timeout, CLI first then matrix defaults
    pub fn effective_timeout(&self, step_timeout: Option<u64>, defaults: &StepDefaults) -> Option<Duration> {
        self.timeout_secs
            .or(step_timeout)
            .or(defaults.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Program for a step, CLI first then step then matrix defaults
    pub fn effective_program(&self, step_program: Option<&str>, defaults: &StepDefaults) -> String {
        self.program
            .as_deref()
            .or(step_program)
            .or(defaults.program.as_deref())
            .unwrap_or(DEFAULT_PROGRAM)
            .to_string()
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Anchor a relative path at the current directory
///
/// Steps run with their own working directory, so every path handed to a
/// child process must be absolute. The filesystem is not consulted.
pub fn absolute_path(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
