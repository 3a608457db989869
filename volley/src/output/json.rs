use std::collections::BTreeMap;
use std::io::Write as _;

use serde::Serialize;
use volley_core::runner::Population;
use volley_core::{HistogramSummary, RunSummary};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _base_url: &str, _populations: &[Population]) {}

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let line = build_summary_line(summary);
        let mut out = std::io::stdout().lock();
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub elapsed_secs: f64,
    pub scenarios: Vec<JsonScenarioSummary>,
    pub totals: JsonTotals,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonScenarioSummary {
    pub scenario: String,
    pub users: JsonUsers,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub steps: Vec<JsonStepSummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonUsers {
    pub scheduled: u64,
    pub admitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    pub cancelled: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStepSummary {
    pub step: String,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub failures: BTreeMap<String, u64>,
    pub status_codes: BTreeMap<u16, u64>,
    pub bytes_received_total: u64,
    pub latency_ms: Option<JsonLatencySummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
    pub count: u64,
}

impl From<&HistogramSummary> for JsonLatencySummary {
    fn from(h: &HistogramSummary) -> Self {
        Self {
            p50: h.p50,
            p75: h.p75,
            p90: h.p90,
            p95: h.p95,
            p99: h.p99,
            min: h.min,
            max: h.max,
            mean: h.mean,
            stdev: h.stdev,
            count: h.count,
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub(crate) struct JsonTotals {
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub bytes_received_total: u64,
    pub users_admitted: u64,
}

fn build_summary_line(summary: &RunSummary) -> JsonSummaryLine {
    let mut totals = JsonTotals::default();

    let scenarios = summary
        .scenarios
        .iter()
        .map(|s| {
            let steps = s
                .steps
                .iter()
                .map(|st| {
                    totals.bytes_received_total =
                        totals.bytes_received_total.saturating_add(st.bytes_received);

                    JsonStepSummary {
                        step: st.step.clone(),
                        total: st.total,
                        passed: st.passed,
                        failed: st.failed,
                        failures: st
                            .failures
                            .iter()
                            .map(|(kind, n)| (kind.to_string(), *n))
                            .collect(),
                        status_codes: st.status_codes.iter().copied().collect(),
                        bytes_received_total: st.bytes_received,
                        latency_ms: st.latency_ms.as_ref().map(JsonLatencySummary::from),
                    }
                })
                .collect::<Vec<_>>();

            let u = &s.users;
            JsonScenarioSummary {
                scenario: s.scenario.clone(),
                users: JsonUsers {
                    scheduled: u.scheduled,
                    admitted: u.admitted,
                    completed: u.completed,
                    failed: u.failed,
                    aborted: u.aborted,
                    cancelled: u.cancelled,
                },
                requests_total: s.requests_total(),
                failed_requests_total: s.requests_failed(),
                steps,
            }
        })
        .collect::<Vec<_>>();

    totals.requests_total = summary.requests_total();
    totals.failed_requests_total = summary.requests_failed();
    totals.users_admitted = summary.users_admitted();

    JsonSummaryLine {
        kind: "summary",
        elapsed_secs: summary.elapsed.as_secs_f64(),
        scenarios,
        totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;
    use volley_core::{FailureKind, ScenarioSummary, StepSummary, UserSummary};

    #[test]
    fn summary_line_has_totals_and_step_breakdown() {
        let summary = RunSummary {
            elapsed: Duration::from_millis(1500),
            scenarios: vec![ScenarioSummary {
                scenario: "Mixed traffic".to_string(),
                users: UserSummary {
                    scheduled: 1,
                    admitted: 1,
                    completed: 1,
                    ..UserSummary::default()
                },
                steps: vec![StepSummary {
                    step: "redirect existing".to_string(),
                    total: 3,
                    passed: 2,
                    failed: 1,
                    failures: vec![(FailureKind::Timeout, 1)],
                    status_codes: vec![(302, 2)],
                    bytes_received: 10,
                    latency_ms: None,
                }],
            }],
        };

        let line = build_summary_line(&summary);
        let v: Value = match serde_json::to_value(&line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.get("elapsed_secs").and_then(Value::as_f64), Some(1.5));
        assert_eq!(
            v.pointer("/totals/requests_total").and_then(Value::as_u64),
            Some(3)
        );
        assert_eq!(
            v.pointer("/totals/failed_requests_total")
                .and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/scenarios/0/steps/0/failures/timeout")
                .and_then(Value::as_u64),
            Some(1)
        );
        assert_eq!(
            v.pointer("/scenarios/0/steps/0/status_codes/302")
                .and_then(Value::as_u64),
            Some(2)
        );
        assert_eq!(
            v.pointer("/scenarios/0/users/completed")
                .and_then(Value::as_u64),
            Some(1)
        );
        assert!(
            v.pointer("/scenarios/0/steps/0/latency_ms")
                .is_some_and(Value::is_null)
        );
    }
}
