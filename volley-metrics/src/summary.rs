use std::time::Duration;

use crate::histogram::HistogramSummary;
use crate::outcome::FailureKind;

/// Final, immutable result of a run. Scenarios and steps are sorted by name.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub scenarios: Vec<ScenarioSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioSummary {
    pub scenario: String,
    pub users: UserSummary,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserSummary {
    /// Users the injection profile asked for.
    pub scheduled: u64,
    pub admitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    pub cancelled: u64,
}

impl UserSummary {
    #[must_use]
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.aborted + self.cancelled
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepSummary {
    pub step: String,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    /// Non-zero failure counts only.
    pub failures: Vec<(FailureKind, u64)>,
    /// Count per observed status code, ascending.
    pub status_codes: Vec<(u16, u64)>,
    pub bytes_received: u64,
    pub latency_ms: Option<HistogramSummary>,
}

impl StepSummary {
    #[must_use]
    pub fn failures_of(&self, kind: FailureKind) -> u64 {
        self.failures
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, n)| *n)
    }
}

impl ScenarioSummary {
    pub fn step(&self, name: &str) -> Option<&StepSummary> {
        self.steps.iter().find(|s| s.step == name)
    }

    #[must_use]
    pub fn requests_total(&self) -> u64 {
        self.steps.iter().map(|s| s.total).sum()
    }

    #[must_use]
    pub fn requests_failed(&self) -> u64 {
        self.steps.iter().map(|s| s.failed).sum()
    }
}

impl RunSummary {
    pub fn scenario(&self, name: &str) -> Option<&ScenarioSummary> {
        self.scenarios.iter().find(|s| s.scenario == name)
    }

    #[must_use]
    pub fn requests_total(&self) -> u64 {
        self.scenarios.iter().map(ScenarioSummary::requests_total).sum()
    }

    #[must_use]
    pub fn requests_failed(&self) -> u64 {
        self.scenarios.iter().map(ScenarioSummary::requests_failed).sum()
    }

    #[must_use]
    pub fn users_admitted(&self) -> u64 {
        self.scenarios.iter().map(|s| s.users.admitted).sum()
    }
}
