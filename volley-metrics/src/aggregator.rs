use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::histogram::{new_latency_histogram, summarize_latency};
use crate::outcome::{FailureKind, RequestOutcome, UserOutcome};
use crate::summary::{RunSummary, ScenarioSummary, StepSummary, UserSummary};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StepKey {
    scenario: Arc<str>,
    step: Arc<str>,
}

#[derive(Debug)]
struct StepAccumulator {
    total: AtomicU64,
    passed: AtomicU64,
    failures: [AtomicU64; FailureKind::ALL.len()],
    bytes_received: AtomicU64,
    status_codes: Mutex<BTreeMap<u16, u64>>,
    latency_us: Mutex<Histogram<u64>>,
}

impl StepAccumulator {
    fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            passed: AtomicU64::new(0),
            failures: std::array::from_fn(|_| AtomicU64::new(0)),
            bytes_received: AtomicU64::new(0),
            status_codes: Mutex::new(BTreeMap::new()),
            latency_us: Mutex::new(new_latency_histogram()),
        }
    }

    fn record(&self, outcome: &RequestOutcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match outcome.failure {
            None => self.passed.fetch_add(1, Ordering::Relaxed),
            Some(kind) => self.failures[kind.index()].fetch_add(1, Ordering::Relaxed),
        };
        self.bytes_received
            .fetch_add(outcome.bytes_received, Ordering::Relaxed);

        if let Some(status) = outcome.status {
            *self.status_codes.lock().entry(status).or_insert(0) += 1;
        }

        let latency_us: u64 = outcome.latency.as_micros().try_into().unwrap_or(u64::MAX);
        let _ = self.latency_us.lock().saturating_record(latency_us.max(1));
    }

    fn summarize(&self, step: &str) -> StepSummary {
        let failures: Vec<(FailureKind, u64)> = FailureKind::ALL
            .iter()
            .map(|kind| (*kind, self.failures[kind.index()].load(Ordering::Relaxed)))
            .filter(|(_, n)| *n > 0)
            .collect();

        StepSummary {
            step: step.to_string(),
            total: self.total.load(Ordering::Relaxed),
            passed: self.passed.load(Ordering::Relaxed),
            failed: failures.iter().map(|(_, n)| n).sum(),
            failures,
            status_codes: self
                .status_codes
                .lock()
                .iter()
                .map(|(k, v)| (*k, *v))
                .collect(),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            latency_ms: summarize_latency(&self.latency_us.lock()),
        }
    }
}

#[derive(Debug, Default)]
struct UserCounters {
    scheduled: AtomicU64,
    admitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
    cancelled: AtomicU64,
}

impl UserCounters {
    fn snapshot(&self) -> UserSummary {
        UserSummary {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Run-wide sink for request and user outcomes.
///
/// Safe to share between any number of concurrent producers: each (scenario, step) pair owns an
/// independent accumulator, so producers on different steps never contend.
#[derive(Debug, Default)]
pub struct Aggregator {
    steps: DashMap<StepKey, Arc<StepAccumulator>>,
    users: DashMap<Arc<str>, Arc<UserCounters>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a scenario visible in the summary even if it never produces an outcome.
    pub fn register_scenario(&self, scenario: &str, scheduled_users: u64) {
        self.users_of(scenario)
            .scheduled
            .fetch_add(scheduled_users, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: RequestOutcome) {
        self.step_of(&outcome.scenario, &outcome.step)
            .record(&outcome);
    }

    pub fn user_admitted(&self, scenario: &str) {
        self.users_of(scenario)
            .admitted
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn user_finished(&self, scenario: &str, outcome: UserOutcome) {
        let users = self.users_of(scenario);
        let counter = match outcome {
            UserOutcome::Completed => &users.completed,
            UserOutcome::Failed => &users.failed,
            UserOutcome::Aborted => &users.aborted,
            UserOutcome::Cancelled => &users.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Build the final summary. Call once every producer is done.
    pub fn summary(&self, elapsed: Duration) -> RunSummary {
        let mut names: BTreeSet<Arc<str>> = self.users.iter().map(|e| e.key().clone()).collect();
        names.extend(self.steps.iter().map(|e| e.key().scenario.clone()));

        let mut steps_by_scenario: BTreeMap<Arc<str>, Vec<StepSummary>> = BTreeMap::new();
        for entry in self.steps.iter() {
            let key = entry.key();
            steps_by_scenario
                .entry(key.scenario.clone())
                .or_default()
                .push(entry.value().summarize(&key.step));
        }

        let scenarios = names
            .into_iter()
            .map(|name| {
                let mut steps = steps_by_scenario.remove(&name).unwrap_or_default();
                steps.sort_by(|a, b| a.step.cmp(&b.step));

                let users = self
                    .users
                    .get(&name)
                    .map(|u| u.snapshot())
                    .unwrap_or_default();

                ScenarioSummary {
                    scenario: name.to_string(),
                    users,
                    steps,
                }
            })
            .collect();

        RunSummary { elapsed, scenarios }
    }

    fn step_of(&self, scenario: &Arc<str>, step: &Arc<str>) -> Arc<StepAccumulator> {
        let key = StepKey {
            scenario: scenario.clone(),
            step: step.clone(),
        };

        if let Some(acc) = self.steps.get(&key) {
            return acc.value().clone();
        }

        self.steps
            .entry(key)
            .or_insert_with(|| Arc::new(StepAccumulator::new()))
            .value()
            .clone()
    }

    fn users_of(&self, scenario: &str) -> Arc<UserCounters> {
        if let Some(users) = self.users.get(scenario) {
            return users.value().clone();
        }

        self.users
            .entry(Arc::from(scenario))
            .or_default()
            .value()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(step: &str, status: Option<u16>, failure: Option<FailureKind>) -> RequestOutcome {
        RequestOutcome {
            scenario: Arc::from("links"),
            step: Arc::from(step),
            status,
            latency: Duration::from_millis(3),
            failure,
            bytes_received: 10,
        }
    }

    #[test]
    fn counts_passed_and_failed_by_kind() {
        let agg = Aggregator::new();
        agg.record(outcome("create", Some(201), None));
        agg.record(outcome("create", Some(500), Some(FailureKind::Check)));
        agg.record(outcome("create", None, Some(FailureKind::Timeout)));

        let summary = agg.summary(Duration::from_secs(1));
        let Some(step) = summary.scenario("links").and_then(|s| s.step("create")) else {
            panic!("missing step summary");
        };

        assert_eq!(step.total, 3);
        assert_eq!(step.passed, 1);
        assert_eq!(step.failed, 2);
        assert_eq!(step.failures_of(FailureKind::Check), 1);
        assert_eq!(step.failures_of(FailureKind::Timeout), 1);
        assert_eq!(step.failures_of(FailureKind::Transport), 0);
        assert_eq!(step.status_codes, vec![(201, 1), (500, 1)]);
        assert_eq!(step.bytes_received, 30);
        assert_eq!(step.latency_ms.as_ref().map(|l| l.count), Some(3));
    }

    #[test]
    fn registered_scenarios_appear_without_outcomes() {
        let agg = Aggregator::new();
        agg.register_scenario("idle", 7);

        let summary = agg.summary(Duration::ZERO);
        let Some(idle) = summary.scenario("idle") else {
            panic!("expected idle scenario");
        };
        assert_eq!(idle.users.scheduled, 7);
        assert!(idle.steps.is_empty());
        assert_eq!(summary.requests_total(), 0);
    }

    #[test]
    fn user_outcomes_are_tallied() {
        let agg = Aggregator::new();
        for _ in 0..3 {
            agg.user_admitted("links");
        }
        agg.user_finished("links", UserOutcome::Completed);
        agg.user_finished("links", UserOutcome::Aborted);
        agg.user_finished("links", UserOutcome::Cancelled);

        let summary = agg.summary(Duration::ZERO);
        let Some(links) = summary.scenario("links") else {
            panic!("expected links scenario");
        };
        assert_eq!(links.users.admitted, 3);
        assert_eq!(links.users.finished(), 3);
        assert_eq!(links.users.aborted, 1);
    }

    #[test]
    fn steps_are_sorted_by_name() {
        let agg = Aggregator::new();
        agg.record(outcome("redirect", Some(302), None));
        agg.record(outcome("create", Some(201), None));

        let summary = agg.summary(Duration::ZERO);
        let names: Vec<&str> = summary.scenarios[0]
            .steps
            .iter()
            .map(|s| s.step.as_str())
            .collect();
        assert_eq!(names, vec!["create", "redirect"]);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let agg = Arc::new(Aggregator::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let agg = agg.clone();
                std::thread::spawn(move || {
                    let step = if t % 2 == 0 { "even" } else { "odd" };
                    for _ in 0..1_000 {
                        agg.record(outcome(step, Some(200), None));
                    }
                })
            })
            .collect();

        for t in threads {
            if t.join().is_err() {
                panic!("producer thread panicked");
            }
        }

        let summary = agg.summary(Duration::ZERO);
        assert_eq!(summary.requests_total(), 8_000);
        let Some(even) = summary.scenario("links").and_then(|s| s.step("even")) else {
            panic!("missing even step");
        };
        assert_eq!(even.total, 4_000);
        assert_eq!(even.passed, 4_000);
    }
}
