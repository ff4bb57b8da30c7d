use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::utils::config::RunnerConfig;

/// smokegate CLI - run a smoke-test matrix against a sample corpus
#[derive(Parser, Debug)]
#[command(name = "smokegate")]
#[command(about = "Corpus-driven smoke-test matrix runner with a fail-fast CI gate")]
#[command(version)]
pub struct CliArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the corpus and run every selected step in order
    Run(RunArgs),

    /// Fetch (or refresh) the corpus without running anything
    Fetch(FetchArgs),

    /// Print the steps of a matrix
    List(ListArgs),
}

/// Options shared by every command that reads a matrix
#[derive(Args, Debug, Clone, Default)]
pub struct MatrixArgs {
    /// Matrix file (TOML); the built-in matrix is used when omitted
    #[arg(short, long, value_name = "FILE")]
    pub matrix: Option<PathBuf>,
}

/// Options selecting where the corpus comes from
#[derive(Args, Debug, Clone, Default)]
pub struct CorpusArgs {
    /// Corpus archive URL (http, https or file), overriding the matrix
    #[arg(long, value_name = "URL", conflicts_with = "corpus_dir")]
    pub corpus_url: Option<String>,

    /// Use an already unpacked corpus directory
    #[arg(long, value_name = "DIR")]
    pub corpus_dir: Option<PathBuf>,

    /// Directory fetched archives are unpacked into
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Ignore any cached extraction and fetch again
    #[arg(long)]
    pub refresh: bool,
}

/// Step selection filters
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Only run steps whose name matches this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub only: Vec<String>,

    /// Skip steps whose name matches this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub skip: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub matrix: MatrixArgs,

    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Scratch directory steps run in; a temporary one is used when omitted
    #[arg(short, long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Program to invoke for every step, overriding the matrix
    #[arg(short, long, value_name = "EXE")]
    pub program: Option<String>,

    /// Per-step timeout in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run every step even after a failure
    #[arg(long)]
    pub keep_going: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Also write the report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub matrix: MatrixArgs,

    #[command(flatten)]
    pub corpus: CorpusArgs,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub matrix: MatrixArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colored human-readable summary
    Text,
    /// JSON report
    Json,
    /// JUnit XML report
    Junit,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Junit => write!(f, "junit"),
        }
    }
}

impl CorpusArgs {
    /// Apply corpus flags onto a runner configuration
    pub fn apply(&self, mut config: RunnerConfig) -> RunnerConfig {
        if let Some(url) = &self.corpus_url {
            config = config.with_corpus_url(url);
        }
        if let Some(dir) = &self.corpus_dir {
            config = config.with_corpus_dir(dir.clone());
        }
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir.clone());
        }
        config.refresh = self.refresh;
        config
    }
}

impl RunArgs {
    /// Build the runner configuration these flags describe
    pub fn to_config(&self) -> RunnerConfig {
        let mut config = self.corpus.apply(RunnerConfig::new());
        if let Some(dir) = &self.workdir {
            config = config.with_workdir(dir.clone());
        }
        if let Some(program) = &self.program {
            config = config.with_program(program);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        if self.keep_going {
            config = config.keep_going();
        }
        config.only = self.selection.only.clone();
        config.skip = self.selection.skip.clone();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_options() {
        let args = CliArgs::try_parse_from([
            "smokegate",
            "-vv",
            "run",
            "--corpus-dir",
            "/data/test-data",
            "--only",
            "lint*",
            "--skip",
            "lint-flat",
            "--keep-going",
            "--timeout",
            "60",
            "-f",
            "junit",
        ])
        .unwrap();

        assert_eq!(args.verbose, 2);
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.format, OutputFormat::Junit);
                let config = run.to_config();
                assert!(!config.fail_fast);
                assert_eq!(config.timeout_secs, Some(60));
                assert_eq!(config.corpus_dir, Some(PathBuf::from("/data/test-data")));
                assert_eq!(config.only, vec!["lint*".to_string()]);
                assert_eq!(config.skip, vec!["lint-flat".to_string()]);
            }
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_corpus_url_conflicts_with_corpus_dir() {
        let result = CliArgs::try_parse_from([
            "smokegate",
            "fetch",
            "--corpus-url",
            "https://example.org/a.zip",
            "--corpus-dir",
            "/data",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_defaults() {
        let args = CliArgs::try_parse_from(["smokegate", "run"]).unwrap();
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.format, OutputFormat::Text);
                let config = run.to_config();
                assert!(config.fail_fast);
                assert!(config.program.is_none());
                assert!(run.matrix.matrix.is_none());
            }
            other => panic!("Expected run command, got {:?}", other),
        }
    }
}
