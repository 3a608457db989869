use std::fmt::Write as _;
use std::io::Write as _;
use std::time::Duration;

use volley_core::runner::Population;
use volley_core::{HistogramSummary, RunSummary, ScenarioSummary, StepSummary};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, base_url: &str, populations: &[Population]) {
        eprint!("{}", render_header(base_url, populations));
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let mut out = std::io::stdout().lock();
        out.write_all(render_summary(summary).as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

fn render_header(base_url: &str, populations: &[Population]) -> String {
    let mut out = String::new();
    writeln!(out, "target: {base_url}").ok();
    for p in populations {
        writeln!(
            out,
            "  {}: {} users over {}",
            p.scenario.name(),
            p.profile.total_users(),
            format_duration(p.profile.duration())
        )
        .ok();
    }
    out.push('\n');
    out
}

const NAME_WIDTH: usize = 32;

pub(crate) fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    if summary.scenarios.is_empty() {
        out.push_str("summary: no scenarios\n");
        return out;
    }

    writeln!(out, "summary ({})", format_duration(summary.elapsed)).ok();

    for s in &summary.scenarios {
        render_scenario(s, &mut out);
    }

    let total = summary.requests_total();
    let failed = summary.requests_failed();
    let secs = summary.elapsed.as_secs_f64().max(1e-9);

    out.push_str("totals\n");
    writeln!(out, "  requests: {total} (failed {failed})").ok();
    writeln!(out, "  users admitted: {}", summary.users_admitted()).ok();
    writeln!(out, "  rate: {} req/s", format_rate(total as f64 / secs)).ok();

    out
}

fn render_scenario(s: &ScenarioSummary, out: &mut String) {
    let u = &s.users;
    writeln!(out, "\nscenario: {}", s.scenario).ok();
    writeln!(
        out,
        "  users: scheduled {} admitted {} completed {} failed {} aborted {} cancelled {}",
        u.scheduled, u.admitted, u.completed, u.failed, u.aborted, u.cancelled
    )
    .ok();

    if s.steps.is_empty() {
        out.push_str("  requests: none\n\n");
        return;
    }

    writeln!(
        out,
        "  {:<NAME_WIDTH$} {:>7} {:>7} {:>8} {:>8} {:>8} {:>8}",
        "request", "total", "failed", "p50", "p95", "p99", "max"
    )
    .ok();
    for step in &s.steps {
        render_step(step, out);
    }
    out.push('\n');
}

fn render_step(step: &StepSummary, out: &mut String) {
    let [p50, p95, p99, max] = match &step.latency_ms {
        Some(HistogramSummary {
            p50, p95, p99, max, ..
        }) => [*p50, *p95, *p99, *max].map(format_ms),
        None => std::array::from_fn(|_| "-".to_string()),
    };

    writeln!(
        out,
        "  {:<NAME_WIDTH$} {:>7} {:>7} {p50:>8} {p95:>8} {p99:>8} {max:>8}",
        truncate(&step.step, NAME_WIDTH),
        step.total,
        step.failed,
    )
    .ok();

    if !step.failures.is_empty() {
        let failures = step
            .failures
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "    failures: {failures}").ok();
    }

    if !step.status_codes.is_empty() {
        let codes = step
            .status_codes
            .iter()
            .map(|(code, n)| format!("{code}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "    status: {codes}").ok();
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut t: String = s.chars().take(width.saturating_sub(1)).collect();
    t.push('~');
    t
}

fn format_ms(ms: f64) -> String {
    if !ms.is_finite() {
        return "-".to_string();
    }
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else if ms >= 1.0 {
        format!("{ms:.0}ms")
    } else {
        format!("{:.0}us", ms * 1000.0)
    }
}

fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms >= 1000 && total_ms % 1000 == 0 {
        return format!("{}s", total_ms / 1000);
    }
    if total_ms >= 1000 {
        return format!("{:.1}s", d.as_secs_f64());
    }
    format!("{total_ms}ms")
}
