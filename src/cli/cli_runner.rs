use clap::Parser;
use std::io::Write;

use crate::cli::{CliArgs, Commands, FetchArgs, ListArgs, MatrixArgs, OutputFormat, OutputFormatter, RunArgs};
use crate::corpus::source_for;
use crate::engine::{InvocationMatrix, MatrixEngine, RunReport, StepEvent};
use crate::utils::{
    config::RunnerConfig,
    error::{GateError, GateResult},
    logging,
};

/// Exit code when every step passed
pub const EXIT_PASSED: i32 = 0;
/// Exit code when the gate failed
pub const EXIT_FAILED: i32 = 1;
/// Exit code when the run could not start (config, matrix, corpus, program)
pub const EXIT_SETUP_ERROR: i32 = 2;

/// Executes parsed CLI commands
pub struct CliRunner;

impl CliRunner {
    /// Load the matrix named on the command line, or the built-in one
    pub fn load_matrix(args: &MatrixArgs) -> GateResult<InvocationMatrix> {
        match &args.matrix {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading matrix file");
                InvocationMatrix::load(path)
            }
            None => InvocationMatrix::builtin(),
        }
    }

    /// Run a command and return the process exit code
    pub async fn execute(command: Commands) -> GateResult<i32> {
        match command {
            Commands::Run(args) => Self::run(args).await,
            Commands::Fetch(args) => Self::fetch(args).await,
            Commands::List(args) => Self::list(args),
        }
    }

    async fn run(args: RunArgs) -> GateResult<i32> {
        let matrix = Self::load_matrix(&args.matrix)?;
        let config = args.to_config();
        let format = args.format;

        let mut engine = MatrixEngine::new(config, matrix);
        let corpus = engine.fetch_corpus().await?;

        if format == OutputFormat::Text {
            println!("{}", OutputFormatter::format_header(&corpus));
            engine = engine.with_progress(|event| match event {
                StepEvent::Started { index, total, descriptor } => {
                    tracing::debug!(index, total, step = %descriptor.name, "step started");
                }
                StepEvent::Finished { index, total, outcome } => {
                    print!("{}", OutputFormatter::format_step_block(index, total, outcome));
                    let _ = std::io::stdout().flush();
                }
            });
        }

        let report = engine.run_with_corpus(corpus).await?;

        match format {
            OutputFormat::Text => println!("\n{}", OutputFormatter::format_summary(&report)),
            other => println!("{}", OutputFormatter::format_report(&report, other)?),
        }

        if let Some(path) = &args.report {
            Self::write_report(&report, format, path)?;
        }

        Ok(report.verdict.exit_code())
    }

    async fn fetch(args: FetchArgs) -> GateResult<i32> {
        let matrix = Self::load_matrix(&args.matrix)?;
        let config = args.corpus.apply(RunnerConfig::new());
        let spec = config.resolve_corpus(&matrix.corpus)?;
        let source = source_for(&spec)?;

        eprintln!("{}", OutputFormatter::format_info(&format!("Fetching {}", source.describe())));
        let location = source.fetch().await?;
        println!("{}", OutputFormatter::format_corpus(&location));
        Ok(EXIT_PASSED)
    }

    fn list(args: ListArgs) -> GateResult<i32> {
        let matrix = Self::load_matrix(&args.matrix)?;
        let steps = matrix.select(&args.selection.only, &args.selection.skip)?;
        println!("{}", OutputFormatter::format_matrix(&matrix, &steps));
        Ok(EXIT_PASSED)
    }

    fn write_report(report: &RunReport, format: OutputFormat, path: &std::path::Path) -> GateResult<()> {
        // Report files never carry terminal color codes
        colored::control::set_override(false);
        let content = OutputFormatter::format_report(report, format);
        colored::control::unset_override();

        std::fs::write(path, content?)
            .map_err(|e| GateError::Report(format!("Failed to write report {}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "report written");
        Ok(())
    }
}

/// Main entry point for CLI execution
pub async fn run_cli() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if let Err(e) = logging::init(args.verbose) {
        eprintln!("{}", OutputFormatter::format_error(&e));
    }

    let code = match CliRunner::execute(args.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", OutputFormatter::format_error(&e));
            EXIT_SETUP_ERROR
        }
    };

    std::process::exit(code)
}
