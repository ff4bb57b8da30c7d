use colored::*;

use crate::cli::cli_args::OutputFormat;
use crate::engine::{InvocationMatrix, RunReport, StepDefinition};
use crate::utils::error::{GateError, GateResult};
use crate::utils::types::{CorpusLocation, StepOutcome, StepStatus, Verdict};

/// Formats run reports and progress for CLI output
pub struct OutputFormatter;

impl OutputFormatter {
    /// Format a finished run according to the requested format
    pub fn format_report(report: &RunReport, format: OutputFormat) -> GateResult<String> {
        match format {
            OutputFormat::Text => Ok(Self::format_text(report)),
            OutputFormat::Json => Self::format_json(report),
            OutputFormat::Junit => Ok(Self::format_junit(report)),
        }
    }

    /// One line per finished step, printed while the run progresses
    pub fn format_step_line(index: usize, total: usize, outcome: &StepOutcome) -> String {
        let counter = format!("[{}/{}]", index + 1, total).dimmed();
        let status = Self::format_status(outcome.status);
        let mut line = format!(
            "{} {} {} {}",
            counter,
            status,
            outcome.name.bold(),
            format!("({:.2}s)", outcome.duration_ms as f64 / 1000.0).dimmed()
        );
        if let Some(reason) = &outcome.reason {
            if outcome.status.is_failure() {
                line.push_str(&format!("\n      {}", reason.red()));
            }
        }
        line
    }

    fn format_status(status: StepStatus) -> ColoredString {
        let label = format!("{:<7}", status.to_string());
        match status {
            StepStatus::Passed => label.green().bold(),
            StepStatus::Skipped => label.yellow(),
            StepStatus::Failed | StepStatus::TimedOut | StepStatus::SpawnError => label.red().bold(),
        }
    }

    /// Step line plus, for failures, the command and the end of stderr
    pub fn format_step_block(index: usize, total: usize, outcome: &StepOutcome) -> String {
        let mut output = Self::format_step_line(index, total, outcome);
        output.push('\n');
        if outcome.status.is_failure() {
            output.push_str(&format!("      {} {}\n", "$".dimmed(), outcome.command_line));
            let lines: Vec<&str> = outcome.stderr_tail.trim_end().lines().collect();
            for line in &lines[lines.len().saturating_sub(10)..] {
                output.push_str(&format!("      {} {}\n", "|".dimmed(), line));
            }
        }
        output
    }

    /// Corpus lines shown before the steps
    pub fn format_header(corpus: &CorpusLocation) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", "Smoke test matrix".bold()));
        output.push_str(&format!(
            "  Corpus: {} ({} files)\n",
            corpus.root.display().to_string().cyan(),
            corpus.file_count
        ));
        output.push_str(&format!("  Source: {}\n", corpus.source));
        output
    }

    /// Counts and verdict shown after the steps
    pub fn format_summary(report: &RunReport) -> String {
        let summary = &report.summary;
        let mut output = format!(
            "{} passed, {} failed, {} skipped in {:.2}s\n",
            summary.passed.to_string().green().bold(),
            summary.failed.to_string().red().bold(),
            summary.skipped.to_string().yellow(),
            report.total_duration_ms as f64 / 1000.0
        );
        output.push_str(&match report.verdict {
            Verdict::Passed => Self::format_success("all steps passed"),
            Verdict::Failed => format!("{} {}", "Failed:".red().bold(), Self::failure_headline(report)),
        });
        output
    }

    /// Human-readable report of a whole run
    fn format_text(report: &RunReport) -> String {
        let mut output = Self::format_header(&report.corpus);
        output.push_str(&format!(
            "  Workdir: {}{}\n\n",
            report.workdir.display(),
            if report.workdir_retained { "" } else { " (removed after the run)" }
        ));
        let total = report.outcomes.len();
        for (index, outcome) in report.outcomes.iter().enumerate() {
            output.push_str(&Self::format_step_block(index, total, outcome));
        }
        output.push('\n');
        output.push_str(&Self::format_summary(report));
        output
    }

    fn failure_headline(report: &RunReport) -> String {
        match report.failures().first() {
            Some(first) => format!(
                "step '{}' {}",
                first.name,
                first.reason.as_deref().unwrap_or("failed")
            ),
            None => "gate failed".to_string(),
        }
    }

    /// JSON report
    fn format_json(report: &RunReport) -> GateResult<String> {
        serde_json::to_string_pretty(report)
            .map_err(|e| GateError::Report(format!("Failed to serialize report: {}", e)))
    }

    /// JUnit XML report with one testcase per step
    fn format_junit(report: &RunReport) -> String {
        let summary = &report.summary;
        let errors = report
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, StepStatus::SpawnError))
            .count();
        let failures = summary.failed - errors;

        let mut output = String::new();
        output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        output.push_str(&format!(
            "<testsuites tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{:.3}\">\n",
            summary.total,
            failures,
            errors,
            summary.skipped,
            report.total_duration_ms as f64 / 1000.0
        ));
        output.push_str(&format!(
            "  <testsuite name=\"smokegate\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{:.3}\" timestamp=\"{}\">\n",
            summary.total,
            failures,
            errors,
            summary.skipped,
            report.total_duration_ms as f64 / 1000.0,
            report.started_at.to_rfc3339()
        ));

        for outcome in &report.outcomes {
            output.push_str(&format!(
                "    <testcase name=\"{}\" classname=\"smokegate.matrix\" time=\"{:.3}\">\n",
                Self::escape_xml(&outcome.name),
                outcome.duration_ms as f64 / 1000.0
            ));
            let reason = outcome.reason.as_deref().unwrap_or("");
            match outcome.status {
                StepStatus::Passed => {}
                StepStatus::Skipped => {
                    output.push_str(&format!("      <skipped message=\"{}\" />\n", Self::escape_xml(reason)));
                }
                StepStatus::SpawnError => {
                    output.push_str(&format!(
                        "      <error message=\"{}\">{}</error>\n",
                        Self::escape_xml(reason),
                        Self::escape_xml(&outcome.command_line)
                    ));
                }
                StepStatus::Failed | StepStatus::TimedOut => {
                    output.push_str(&format!(
                        "      <failure message=\"{}\">{}</failure>\n",
                        Self::escape_xml(reason),
                        Self::escape_xml(&outcome.command_line)
                    ));
                }
            }
            if !outcome.stdout_tail.is_empty() {
                output.push_str(&format!(
                    "      <system-out>{}</system-out>\n",
                    Self::escape_xml(&outcome.stdout_tail)
                ));
            }
            if !outcome.stderr_tail.is_empty() {
                output.push_str(&format!(
                    "      <system-err>{}</system-err>\n",
                    Self::escape_xml(&outcome.stderr_tail)
                ));
            }
            output.push_str("    </testcase>\n");
        }

        output.push_str("  </testsuite>\n");
        output.push_str("</testsuites>\n");
        output
    }

    fn escape_xml(s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '&' => result.push_str("&amp;"),
                '<' => result.push_str("&lt;"),
                '>' => result.push_str("&gt;"),
                '"' => result.push_str("&quot;"),
                '\'' => result.push_str("&apos;"),
                // XML 1.0 forbids most control characters, even escaped
                c if c.is_control() && c != '\n' && c != '\t' && c != '\r' => {}
                c => result.push(c),
            }
        }
        result
    }

    /// Listing of the steps a matrix would run
    pub fn format_matrix(matrix: &InvocationMatrix, steps: &[&StepDefinition]) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", "Matrix steps:".bold()));
        if let Some(url) = &matrix.corpus.url {
            output.push_str(&format!("  Corpus: {}\n", url.cyan()));
        }
        let default_program = matrix.defaults.program.as_deref().unwrap_or(crate::utils::config::DEFAULT_PROGRAM);

        for (index, step) in steps.iter().enumerate() {
            let program = step.program.as_deref().unwrap_or(default_program);
            output.push_str(&format!(
                "  {} {} {}\n",
                format!("{:>2}.", index + 1).dimmed(),
                step.name.cyan().bold(),
                if step.expect == crate::utils::types::Expectation::Failure {
                    "(expects failure)".yellow().to_string()
                } else {
                    String::new()
                }
            ));
            if let Some(description) = &step.description {
                output.push_str(&format!("      {}\n", description.dimmed()));
            }
            output.push_str(&format!("      {} {}\n", program, step.args.join(" ")));
            if let Some(cwd) = &step.cwd {
                output.push_str(&format!("      cwd: {}\n", cwd));
            }
        }

        if steps.is_empty() {
            output.push_str(&format!("  {}\n", "No steps selected.".dimmed()));
        }
        output
    }

    /// Summary printed after `fetch`
    pub fn format_corpus(location: &CorpusLocation) -> String {
        format!(
            "{} {} ({} files{})",
            "Corpus ready:".green().bold(),
            location.root.display().to_string().cyan(),
            location.file_count,
            if location.freshly_fetched { ", freshly fetched" } else { ", cached" }
        )
    }

    /// Format error message for CLI display
    pub fn format_error(error: &GateError) -> String {
        format!("{} {}", "Error:".red().bold(), error.to_string().red())
    }

    /// Format success message for CLI display
    pub fn format_success(message: &str) -> String {
        format!("{} {}", "Success:".green().bold(), message)
    }

    /// Format info message for CLI display
    pub fn format_info(message: &str) -> String {
        format!("{} {}", "Info:".blue().bold(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::RunSummary;
    use chrono::Utc;
    use std::path::PathBuf;

    fn outcome(name: &str, status: StepStatus, reason: Option<&str>) -> StepOutcome {
        StepOutcome {
            name: name.to_string(),
            command_line: format!("multiqc --lint {}", name),
            status,
            exit_code: match status {
                StepStatus::Passed => Some(0),
                StepStatus::Failed => Some(1),
                _ => None,
            },
            duration_ms: 1500,
            stdout_tail: String::new(),
            stderr_tail: if status == StepStatus::Failed { "Traceback <module>".to_string() } else { String::new() },
            reason: reason.map(|r| r.to_string()),
        }
    }

    fn report(outcomes: Vec<StepOutcome>, verdict: Verdict) -> RunReport {
        RunReport {
            started_at: Utc::now(),
            corpus: CorpusLocation {
                root: PathBuf::from("/cache/test-data-main"),
                source: "archive https://example.org/test-data.zip".to_string(),
                freshly_fetched: true,
                file_count: 42,
            },
            workdir: PathBuf::from("/tmp/smokegate-x"),
            workdir_retained: false,
            fail_fast: true,
            summary: RunSummary::from_outcomes(&outcomes),
            outcomes,
            verdict,
            total_duration_ms: 4500,
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            OutputFormatter::escape_xml("<a href=\"x\">&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&apos;&lt;/a&gt;"
        );
        assert_eq!(OutputFormatter::escape_xml("bell\u{7}line\n"), "bellline\n");
    }

    #[test]
    fn test_junit_report_counts() {
        let report = report(
            vec![
                outcome("version", StepStatus::Passed, None),
                outcome("lint", StepStatus::Failed, Some("expected success, exit code 1")),
                outcome("flat", StepStatus::Skipped, Some("not run: step 'lint' failed")),
            ],
            Verdict::Failed,
        );

        let xml = OutputFormatter::format_report(&report, OutputFormat::Junit).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("tests=\"3\" failures=\"1\" errors=\"0\" skipped=\"1\""));
        assert!(xml.contains("<testcase name=\"lint\""));
        assert!(xml.contains("<failure message=\"expected success, exit code 1\">"));
        assert!(xml.contains("<skipped message=\"not run: step &apos;lint&apos; failed\" />"));
        assert!(xml.contains("Traceback &lt;module&gt;"));
    }

    #[test]
    fn test_junit_spawn_error_is_error_element() {
        let report = report(
            vec![outcome("ghost", StepStatus::SpawnError, Some("failed to spawn 'ghost'"))],
            Verdict::Failed,
        );
        let xml = OutputFormatter::format_report(&report, OutputFormat::Junit).unwrap();
        assert!(xml.contains("failures=\"0\" errors=\"1\""));
        assert!(xml.contains("<error message=\"failed to spawn &apos;ghost&apos;\">"));
    }

    #[test]
    fn test_json_report_structure() {
        let report = report(vec![outcome("version", StepStatus::Passed, None)], Verdict::Passed);
        let json = OutputFormatter::format_report(&report, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["verdict"], "passed");
        assert_eq!(value["summary"]["passed"], 1);
        assert_eq!(value["outcomes"][0]["status"], "passed");
        assert_eq!(value["corpus"]["file_count"], 42);
    }

    #[test]
    fn test_text_report_mentions_first_failure() {
        colored::control::set_override(false);
        let report = report(
            vec![
                outcome("version", StepStatus::Passed, None),
                outcome("lint", StepStatus::Failed, Some("expected success, exit code 1")),
            ],
            Verdict::Failed,
        );
        let text = OutputFormatter::format_report(&report, OutputFormat::Text).unwrap();

        assert!(text.contains("[1/2] PASS"));
        assert!(text.contains("[2/2] FAIL"));
        assert!(text.contains("$ multiqc --lint lint"));
        assert!(text.contains("| Traceback <module>"));
        assert!(text.contains("1 passed, 1 failed, 0 skipped"));
        assert!(text.contains("Failed: step 'lint' expected success, exit code 1"));
    }
}
