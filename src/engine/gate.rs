use crate::utils::types::{RunSummary, StepOutcome, Verdict};

/// What the runner should do after a step has been recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    Stop,
}

/// Folds step outcomes into a job verdict
///
/// The verdict is the logical AND of every recorded step. In fail-fast mode
/// the first failure yields `GateDecision::Stop`; callers then record the
/// remaining steps through `skip`.
#[derive(Debug)]
pub struct PassFailGate {
    fail_fast: bool,
    outcomes: Vec<StepOutcome>,
    first_failure: Option<usize>,
}

impl PassFailGate {
    pub fn new(fail_fast: bool) -> Self {
        Self {
            fail_fast,
            outcomes: Vec::new(),
            first_failure: None,
        }
    }

    /// Record a finished step
    pub fn record(&mut self, outcome: StepOutcome) -> GateDecision {
        if outcome.status.is_failure() && self.first_failure.is_none() {
            self.first_failure = Some(self.outcomes.len());
        }
        self.outcomes.push(outcome);
        self.decision()
    }

    /// Record a step that was never run
    pub fn skip(&mut self, name: &str, command_line: &str) {
        let reason = match self.first_failure_name() {
            Some(failed) => format!("not run: step '{}' failed", failed),
            None => "not run".to_string(),
        };
        self.outcomes.push(StepOutcome::skipped(name, command_line, &reason));
    }

    /// Whether the next step should run
    pub fn decision(&self) -> GateDecision {
        if self.fail_fast && self.first_failure.is_some() {
            GateDecision::Stop
        } else {
            GateDecision::Continue
        }
    }

    pub fn verdict(&self) -> Verdict {
        if self.first_failure.is_some() {
            Verdict::Failed
        } else {
            Verdict::Passed
        }
    }

    pub fn first_failure_name(&self) -> Option<&str> {
        self.first_failure.map(|i| self.outcomes[i].name.as_str())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_outcomes(&self.outcomes)
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<StepOutcome> {
        self.outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::StepStatus;

    fn outcome(name: &str, status: StepStatus) -> StepOutcome {
        StepOutcome {
            name: name.to_string(),
            command_line: format!("multiqc {}", name),
            status,
            exit_code: if status == StepStatus::Passed { Some(0) } else { Some(1) },
            duration_ms: 1,
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            reason: None,
        }
    }

    #[test]
    fn test_empty_gate_passes() {
        let gate = PassFailGate::new(true);
        assert_eq!(gate.verdict(), Verdict::Passed);
        assert_eq!(gate.decision(), GateDecision::Continue);
        assert!(gate.outcomes().is_empty());
    }

    #[test]
    fn test_all_passing_steps_pass() {
        let mut gate = PassFailGate::new(true);
        assert_eq!(gate.record(outcome("a", StepStatus::Passed)), GateDecision::Continue);
        assert_eq!(gate.record(outcome("b", StepStatus::Passed)), GateDecision::Continue);
        assert_eq!(gate.verdict(), Verdict::Passed);
    }

    #[test]
    fn test_fail_fast_stops_on_first_failure() {
        let mut gate = PassFailGate::new(true);
        gate.record(outcome("a", StepStatus::Passed));
        assert_eq!(gate.record(outcome("b", StepStatus::TimedOut)), GateDecision::Stop);
        gate.skip("c", "multiqc c");

        assert_eq!(gate.verdict(), Verdict::Failed);
        assert_eq!(gate.first_failure_name(), Some("b"));
        let skipped = &gate.outcomes()[2];
        assert_eq!(skipped.status, StepStatus::Skipped);
        assert_eq!(skipped.reason.as_deref(), Some("not run: step 'b' failed"));

        let summary = gate.summary();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_keep_going_continues_but_still_fails() {
        let mut gate = PassFailGate::new(false);
        assert_eq!(gate.record(outcome("a", StepStatus::Failed)), GateDecision::Continue);
        assert_eq!(gate.record(outcome("b", StepStatus::Passed)), GateDecision::Continue);
        assert_eq!(gate.record(outcome("c", StepStatus::SpawnError)), GateDecision::Continue);

        assert_eq!(gate.verdict(), Verdict::Failed);
        assert_eq!(gate.first_failure_name(), Some("a"));
        assert_eq!(gate.into_outcomes().len(), 3);
    }

    #[test]
    fn test_skipped_steps_do_not_fail_gate() {
        let mut gate = PassFailGate::new(true);
        gate.skip("filtered", "multiqc filtered");
        assert_eq!(gate.verdict(), Verdict::Passed);
    }
}
